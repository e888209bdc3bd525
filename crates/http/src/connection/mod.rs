//! Connection handling module
//!
//! A [`Connection`] owns everything attached to one transport and reacts to
//! its [`TransportEvent`]s, one at a time and in arrival order:
//!
//! - while serving HTTP it wraps a [`Request`]: incoming data is parsed,
//!   routed through the [`Dispatcher`](crate::handler::Dispatcher) and
//!   answered by a handler; acks and poll ticks drive the response
//! - a response carrying an [`Upgrade`] turns the connection into a
//!   [`Session`] once the peer acknowledged the response head
//! - `Disconnect` drops all state synchronously
//!
//! Nothing here blocks or awaits; the driver (a server loop, or a test)
//! decides when events are delivered.

mod context;
mod request;
mod session;

pub use context::ConnectionContext;
pub use context::DEFAULT_RX_TIMEOUT;
pub use request::ANY_HEADER;
pub use request::Request;
pub use session::Session;
pub use session::Upgrade;

use crate::transport::{Transport, TransportEvent};
use request::Flow;
use std::fmt;
use tracing::{trace, warn};

pub enum Connection {
    Http(Box<Request>),
    Session(Box<dyn Session>),
    Closed,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, context: ConnectionContext) -> Self {
        Connection::Http(Box::new(Request::new(transport, context)))
    }

    pub fn handle(&mut self, event: TransportEvent) {
        match self {
            Connection::Http(request) => match request.on_event(event) {
                Flow::Continue => {}
                Flow::Upgrade => self.upgrade(),
                Flow::Closed => *self = Connection::Closed,
            },
            Connection::Session(session) => {
                let disconnect = event.is_disconnect();
                match event {
                    TransportEvent::Data(data) => session.on_data(data),
                    TransportEvent::Ack { len, time } => session.on_ack(len, time),
                    TransportEvent::Poll(time) => session.on_poll(time),
                    TransportEvent::Timeout(time) => session.on_timeout(time),
                    TransportEvent::Error(e) => session.on_error(e),
                    TransportEvent::Disconnect => session.on_disconnect(),
                }
                if disconnect {
                    *self = Connection::Closed;
                }
            }
            Connection::Closed => trace!(?event, "event for a closed connection"),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Connection::Closed)
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Connection::Session(_))
    }

    fn upgrade(&mut self) {
        let Connection::Http(request) = std::mem::replace(self, Connection::Closed) else {
            return;
        };

        match (*request).into_session() {
            Some(session) => *self = Connection::Session(session),
            None => warn!("upgrade requested without an upgrade, dropping connection"),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Http(request) => f.debug_tuple("Http").field(request).finish(),
            Connection::Session(_) => f.write_str("Session"),
            Connection::Closed => f.write_str("Closed"),
        }
    }
}
