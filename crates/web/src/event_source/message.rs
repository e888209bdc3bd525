use bytes::Bytes;
use ember_http::transport::Transport;

/// One queued frame and how far it got.
///
/// A message is written whole or not at all; acks are then counted against
/// it until its full length has been acknowledged.
#[derive(Debug, Clone)]
pub struct EventSourceMessage {
    data: Bytes,
    sent: usize,
    acked: usize,
}

impl EventSourceMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), sent: 0, acked: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn sent_bytes(&self) -> usize {
        self.sent
    }

    pub fn acked_bytes(&self) -> usize {
        self.acked
    }

    pub fn is_sent(&self) -> bool {
        self.sent == self.data.len()
    }

    pub fn finished(&self) -> bool {
        self.acked == self.data.len()
    }

    /// Counts `len` acknowledged bytes against this message and returns the
    /// part that belongs to the messages after it.
    pub fn ack(&mut self, len: usize) -> usize {
        let outstanding = self.data.len() - self.acked;
        let taken = len.min(outstanding);
        self.acked += taken;
        len - taken
    }

    /// Writes the unsent rest if the transport has room for all of it.
    /// Returns the number of bytes written, zero when it did not fit.
    pub fn send(&mut self, transport: &mut dyn Transport) -> usize {
        let rest = &self.data[self.sent..];
        if transport.space() < rest.len() {
            return 0;
        }

        let written = transport.add(rest);
        if transport.can_send() {
            transport.send();
        }
        self.sent += written;
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_http::transport::MemoryTransport;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        Link {}

        impl Transport for Link {
            fn space(&self) -> usize;
            fn add(&mut self, data: &[u8]) -> usize;
            fn can_send(&self) -> bool;
            fn send(&mut self) -> bool;
            fn write(&mut self, data: &[u8]) -> usize;
            fn close(&mut self);
            fn connected(&self) -> bool;
            fn packets_waiting(&self) -> usize;
            fn set_rx_timeout(&mut self, timeout: Option<Duration>);
        }
    }

    #[test]
    fn test_send_is_all_or_nothing() {
        let (mut transport, peer) = MemoryTransport::new(4);
        let mut message = EventSourceMessage::new("hello");

        assert_eq!(message.send(&mut transport), 0);
        assert_eq!(message.sent_bytes(), 0);
        assert!(peer.take_sent().is_empty());

        peer.set_capacity(16);
        assert_eq!(message.send(&mut transport), 5);
        assert!(message.is_sent());
        assert_eq!(peer.take_sent_string(), "hello");
    }

    #[test]
    fn test_send_queues_without_flushing_when_paused() {
        let mut link = MockLink::new();
        link.expect_space().return_const(5_usize);
        link.expect_add().withf(|data| data == b"hello").times(1).return_const(5_usize);
        link.expect_can_send().return_const(false);
        link.expect_send().never();

        let mut message = EventSourceMessage::new("hello");
        assert_eq!(message.send(&mut link), 5);
        assert!(message.is_sent());
        assert_eq!(message.acked_bytes(), 0);
    }

    #[test]
    fn test_ack_returns_surplus() {
        let mut message = EventSourceMessage::new("hello");
        assert_eq!(message.ack(2), 0);
        assert!(!message.finished());
        assert_eq!(message.ack(10), 7);
        assert!(message.finished());
        assert_eq!(message.acked_bytes(), 5);
        assert_eq!(message.ack(3), 3);
    }

    #[test]
    fn test_acks_summing_to_length_finish_once() {
        let mut message = EventSourceMessage::new("0123456789");
        let mut finished = 0;
        for len in [3, 3, 4] {
            let before = message.finished();
            message.ack(len);
            if !before && message.finished() {
                finished += 1;
            }
        }
        assert_eq!(finished, 1);
    }

    #[test]
    fn test_empty_message_is_done_immediately() {
        let message = EventSourceMessage::new(Bytes::new());
        assert!(message.is_sent());
        assert!(message.finished());
    }
}
