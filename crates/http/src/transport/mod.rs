//! The byte transport a connection runs on.
//!
//! The engine never touches sockets. Everything it needs from the network is
//! expressed by the [`Transport`] trait (queueing bytes, free send capacity,
//! unacknowledged packet count) and by the [`TransportEvent`]s the driver
//! feeds into a [`Connection`](crate::connection::Connection).
//!
//! Flow control is ack based: bytes handed to [`Transport::add`] occupy send
//! capacity until the transport reports them acknowledged through
//! [`TransportEvent::Ack`]. The response pipeline only produces more output in
//! reaction to such an ack (or to a poll tick).

mod memory;

pub use memory::MemoryPeer;
pub use memory::MemoryTransport;

use bytes::Bytes;
use std::io;
use std::time::{Duration, Instant};

/// One non-blocking, ack driven byte stream.
pub trait Transport: Send {
    /// Free send capacity in bytes.
    fn space(&self) -> usize;

    /// Queues up to `data.len()` bytes and returns how many were accepted.
    fn add(&mut self, data: &[u8]) -> usize;

    /// Whether queued bytes may be flushed right now.
    fn can_send(&self) -> bool;

    /// Flushes queued bytes as one packet. Returns `false` when nothing was sent.
    fn send(&mut self) -> bool;

    /// Queues and immediately flushes `data`.
    fn write(&mut self, data: &[u8]) -> usize {
        let accepted = self.add(data);
        if accepted > 0 {
            self.send();
        }
        accepted
    }

    /// Requests the connection to close. The driver reports the final
    /// [`TransportEvent::Disconnect`] once it is gone.
    fn close(&mut self);

    fn connected(&self) -> bool;

    /// Number of sent packets not acknowledged yet.
    fn packets_waiting(&self) -> usize;

    /// Inactivity limit for incoming data, `None` disables it.
    fn set_rx_timeout(&mut self, timeout: Option<Duration>);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn space(&self) -> usize {
        (**self).space()
    }

    fn add(&mut self, data: &[u8]) -> usize {
        (**self).add(data)
    }

    fn can_send(&self) -> bool {
        (**self).can_send()
    }

    fn send(&mut self) -> bool {
        (**self).send()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn connected(&self) -> bool {
        (**self).connected()
    }

    fn packets_waiting(&self) -> usize {
        (**self).packets_waiting()
    }

    fn set_rx_timeout(&mut self, timeout: Option<Duration>) {
        (**self).set_rx_timeout(timeout);
    }
}

/// Everything that can happen to a connection, delivered in arrival order.
#[derive(Debug)]
pub enum TransportEvent {
    /// Newly received bytes.
    Data(Bytes),
    /// `len` previously sent bytes were acknowledged by the peer.
    Ack { len: usize, time: Instant },
    /// Periodic tick while the connection is idle.
    Poll(Instant),
    /// No data arrived within the rx timeout.
    Timeout(Instant),
    /// The transport failed; a `Disconnect` follows.
    Error(io::Error),
    /// The connection is gone. Always the last event of a connection.
    Disconnect,
}

impl TransportEvent {
    pub fn ack(len: usize) -> Self {
        Self::Ack { len, time: Instant::now() }
    }

    pub fn poll() -> Self {
        Self::Poll(Instant::now())
    }

    pub fn timeout() -> Self {
        Self::Timeout(Instant::now())
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnect)
    }
}
