//! An in-memory transport with a bounded send window.
//!
//! [`MemoryTransport`] is handed to the engine, the matching [`MemoryPeer`]
//! stays with whoever plays the remote side: it reads what the engine sent,
//! acknowledges bytes (which frees send capacity) and can drop the link.

use super::Transport;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct Link {
    capacity: usize,
    pending: BytesMut,
    delivered: BytesMut,
    in_flight: VecDeque<usize>,
    in_flight_bytes: usize,
    connected: bool,
    close_requested: bool,
    send_paused: bool,
    rx_timeout: Option<Duration>,
}

impl Link {
    fn space(&self) -> usize {
        if !self.connected {
            return 0;
        }
        self.capacity.saturating_sub(self.in_flight_bytes + self.pending.len())
    }
}

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    link: Arc<Mutex<Link>>,
}

/// Remote side of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    link: Arc<Mutex<Link>>,
}

impl MemoryTransport {
    /// Creates a connected transport whose send window holds `capacity` bytes.
    pub fn new(capacity: usize) -> (Self, MemoryPeer) {
        let link = Arc::new(Mutex::new(Link {
            capacity,
            pending: BytesMut::new(),
            delivered: BytesMut::new(),
            in_flight: VecDeque::new(),
            in_flight_bytes: 0,
            connected: true,
            close_requested: false,
            send_paused: false,
            rx_timeout: None,
        }));

        (Self { link: Arc::clone(&link) }, MemoryPeer { link })
    }
}

impl Transport for MemoryTransport {
    fn space(&self) -> usize {
        lock(&self.link).space()
    }

    fn add(&mut self, data: &[u8]) -> usize {
        let mut link = lock(&self.link);
        let accepted = data.len().min(link.space());
        link.pending.extend_from_slice(&data[..accepted]);
        accepted
    }

    fn can_send(&self) -> bool {
        let link = lock(&self.link);
        link.connected && !link.send_paused
    }

    fn send(&mut self) -> bool {
        let mut link = lock(&self.link);
        if link.pending.is_empty() || !link.connected {
            return false;
        }

        let packet = link.pending.split();
        link.in_flight.push_back(packet.len());
        link.in_flight_bytes += packet.len();
        link.delivered.extend_from_slice(&packet);
        true
    }

    fn close(&mut self) {
        let mut link = lock(&self.link);
        link.close_requested = true;
        link.connected = false;
    }

    fn connected(&self) -> bool {
        lock(&self.link).connected
    }

    fn packets_waiting(&self) -> usize {
        lock(&self.link).in_flight.len()
    }

    fn set_rx_timeout(&mut self, timeout: Option<Duration>) {
        lock(&self.link).rx_timeout = timeout;
    }
}

impl MemoryPeer {
    /// Takes every byte the engine has sent so far.
    pub fn take_sent(&self) -> Bytes {
        lock(&self.link).delivered.split().freeze()
    }

    /// Takes what was sent as (lossy) text.
    pub fn take_sent_string(&self) -> String {
        String::from_utf8_lossy(&self.take_sent()).into_owned()
    }

    /// Acknowledges up to `len` in-flight bytes and returns how many were freed.
    pub fn ack(&self, len: usize) -> usize {
        let mut link = lock(&self.link);
        let mut remaining = len.min(link.in_flight_bytes);
        let freed = remaining;

        while remaining > 0 {
            let Some(front) = link.in_flight.front_mut() else { break };
            if *front <= remaining {
                remaining -= *front;
                link.in_flight.pop_front();
            } else {
                *front -= remaining;
                remaining = 0;
            }
        }

        link.in_flight_bytes -= freed;
        freed
    }

    /// Acknowledges everything in flight.
    pub fn ack_all(&self) -> usize {
        let in_flight = lock(&self.link).in_flight_bytes;
        self.ack(in_flight)
    }

    pub fn in_flight_bytes(&self) -> usize {
        lock(&self.link).in_flight_bytes
    }

    /// Drops the link from the remote side.
    pub fn disconnect(&self) {
        lock(&self.link).connected = false;
    }

    pub fn pause_sending(&self, paused: bool) {
        lock(&self.link).send_paused = paused;
    }

    pub fn set_capacity(&self, capacity: usize) {
        lock(&self.link).capacity = capacity;
    }

    /// Whether the engine asked to close the connection.
    pub fn close_requested(&self) -> bool {
        lock(&self.link).close_requested
    }

    pub fn rx_timeout(&self) -> Option<Duration> {
        lock(&self.link).rx_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_bounded_by_window() {
        let (mut transport, peer) = MemoryTransport::new(8);

        assert_eq!(transport.add(b"0123456789"), 8);
        assert_eq!(transport.space(), 0);
        assert!(transport.send());
        assert_eq!(transport.packets_waiting(), 1);
        assert_eq!(peer.take_sent(), Bytes::from_static(b"01234567"));
    }

    #[test]
    fn test_ack_frees_capacity_packet_by_packet() {
        let (mut transport, peer) = MemoryTransport::new(16);

        transport.write(b"abcd");
        transport.write(b"efgh");
        assert_eq!(transport.packets_waiting(), 2);
        assert_eq!(transport.space(), 8);

        assert_eq!(peer.ack(6), 6);
        assert_eq!(transport.packets_waiting(), 1);
        assert_eq!(transport.space(), 14);

        assert_eq!(peer.ack_all(), 2);
        assert_eq!(transport.packets_waiting(), 0);
        assert_eq!(peer.ack(5), 0);
    }

    #[test]
    fn test_closed_transport_has_no_space() {
        let (mut transport, peer) = MemoryTransport::new(16);
        transport.close();

        assert!(peer.close_requested());
        assert!(!transport.connected());
        assert_eq!(transport.space(), 0);
        assert_eq!(transport.add(b"x"), 0);
    }
}
