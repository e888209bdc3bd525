//! Persistent connections taking over after a response.
//!
//! A response marked with an [`Upgrade`] does not end the connection. Once its
//! head has been written and acknowledged, the upgrade receives the transport
//! and the request head and turns them into a [`Session`], which gets every
//! later transport event.

use crate::protocol::RequestHead;
use crate::transport::Transport;
use bytes::Bytes;
use std::io;
use std::time::Instant;
use tracing::{trace, warn};

pub trait Upgrade: Send {
    fn upgrade(self: Box<Self>, transport: Box<dyn Transport>, head: RequestHead) -> Box<dyn Session>;
}

impl<F> Upgrade for F
where
    F: FnOnce(Box<dyn Transport>, RequestHead) -> Box<dyn Session> + Send,
{
    fn upgrade(self: Box<Self>, transport: Box<dyn Transport>, head: RequestHead) -> Box<dyn Session> {
        (*self)(transport, head)
    }
}

/// Event sink of an upgraded connection.
pub trait Session: Send {
    fn on_data(&mut self, data: Bytes) {
        trace!(len = data.len(), "session ignores incoming data");
    }

    fn on_ack(&mut self, len: usize, time: Instant);

    fn on_poll(&mut self, time: Instant);

    fn on_timeout(&mut self, time: Instant);

    fn on_error(&mut self, error: io::Error) {
        warn!(cause = %error, "session transport error");
    }

    /// The transport is gone; nothing may refer to this session afterwards.
    fn on_disconnect(&mut self);
}
