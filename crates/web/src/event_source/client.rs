use crate::event_source::format_frame;
use crate::event_source::message::EventSourceMessage;
use bytes::Bytes;
use ember_http::parse_leading_u64;
use ember_http::protocol::RequestHead;
use ember_http::transport::Transport;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace, warn};

/// Messages a client keeps queued before new ones are dropped.
pub const DEFAULT_MAX_QUEUED_MESSAGES: usize = 8;

/// One subscriber of an [`EventSource`](crate::event_source::EventSource).
///
/// The client owns the upgraded transport and a bounded queue of frames.
/// Frames leave the queue once the peer acknowledged all of their bytes.
pub struct EventSourceClient {
    transport: Box<dyn Transport>,
    queue: VecDeque<EventSourceMessage>,
    max_queued: usize,
    last_id: u32,
}

impl EventSourceClient {
    pub(crate) fn new(mut transport: Box<dyn Transport>, head: &RequestHead, max_queued: usize) -> Self {
        transport.set_rx_timeout(None);
        let last_id = head
            .header_value("Last-Event-ID")
            .map_or(0, |value| u32::try_from(parse_leading_u64(value)).unwrap_or(u32::MAX));

        Self { transport, queue: VecDeque::new(), max_queued, last_id }
    }

    /// The `Last-Event-ID` the client reconnected with, zero if none.
    pub fn last_id(&self) -> u32 {
        self.last_id
    }

    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    pub fn packets_waiting(&self) -> usize {
        self.transport.packets_waiting()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Queues an already formatted frame.
    pub fn write(&mut self, frame: &[u8]) {
        self.queue_message(EventSourceMessage::new(Bytes::copy_from_slice(frame)));
    }

    pub fn send(&mut self, message: &str, event: Option<&str>, id: u32, retry: u32) {
        self.queue_message(EventSourceMessage::new(format_frame(message, event, id, retry)));
    }

    fn queue_message(&mut self, message: EventSourceMessage) {
        if !self.connected() {
            trace!(len = message.len(), "client is gone, dropping message");
            return;
        }

        if self.queue.len() >= self.max_queued {
            warn!(max_queued = self.max_queued, "event queue is full, dropping message");
        } else {
            self.queue.push_back(message);
        }

        if self.transport.can_send() {
            self.run_queue();
        }
    }

    pub(crate) fn on_ack(&mut self, len: usize) {
        let mut len = len;
        while len > 0 {
            let Some(front) = self.queue.front_mut() else { break };
            len = front.ack(len);
            if front.finished() {
                self.queue.pop_front();
            }
        }
        self.run_queue();
    }

    pub(crate) fn on_poll(&mut self) {
        if !self.queue.is_empty() {
            self.run_queue();
        }
    }

    pub(crate) fn on_timeout(&mut self) {
        debug!("event source client timed out, closing");
        self.transport.close();
    }

    /// Drops acknowledged frames and writes every unsent one that fits.
    fn run_queue(&mut self) {
        while self.queue.front().is_some_and(EventSourceMessage::finished) {
            self.queue.pop_front();
        }

        for message in self.queue.iter_mut().filter(|message| !message.is_sent()) {
            message.send(self.transport.as_mut());
        }
    }
}

impl fmt::Debug for EventSourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceClient")
            .field("connected", &self.connected())
            .field("queued", &self.queue.len())
            .field("max_queued", &self.max_queued)
            .field("last_id", &self.last_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_http::protocol::Header;
    use ember_http::transport::{MemoryPeer, MemoryTransport};
    use std::time::Duration;

    fn client(capacity: usize, max_queued: usize) -> (EventSourceClient, MemoryPeer) {
        let (transport, peer) = MemoryTransport::new(capacity);
        (EventSourceClient::new(Box::new(transport), &RequestHead::default(), max_queued), peer)
    }

    #[test]
    fn test_send_writes_frame() {
        let (mut client, peer) = client(1024, 8);
        client.send("hi", Some("greeting"), 1, 0);
        assert_eq!(peer.take_sent_string(), "id: 1\r\nevent: greeting\r\ndata: hi\r\n\r\n");
        assert_eq!(client.queue_len(), 1);

        client.on_ack(peer.ack_all());
        assert_eq!(client.queue_len(), 0);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (mut client, peer) = client(1024, 2);
        peer.pause_sending(true);

        client.write(b"one");
        client.write(b"two");
        client.write(b"three");
        assert_eq!(client.queue_len(), 2);

        peer.pause_sending(false);
        client.on_poll();
        assert_eq!(peer.take_sent_string(), "onetwo");
    }

    #[test]
    fn test_frames_wait_for_capacity() {
        let (mut client, peer) = client(8, 8);
        client.write(b"12345");
        client.write(b"67890");
        assert_eq!(peer.take_sent_string(), "12345");

        client.on_ack(peer.ack_all());
        assert_eq!(peer.take_sent_string(), "67890");
        assert_eq!(client.queue_len(), 1);

        client.on_ack(peer.ack_all());
        assert_eq!(client.queue_len(), 0);
    }

    #[test]
    fn test_ack_spanning_messages() {
        let (mut client, peer) = client(64, 8);
        client.write(b"abc");
        client.write(b"defg");
        assert_eq!(peer.take_sent_string(), "abcdefg");

        client.on_ack(peer.ack(5));
        assert_eq!(client.queue_len(), 1);
        client.on_ack(peer.ack(2));
        assert_eq!(client.queue_len(), 0);
    }

    #[test]
    fn test_disconnected_client_drops_everything() {
        let (mut client, peer) = client(64, 8);
        peer.disconnect();
        client.write(b"lost");
        assert_eq!(client.queue_len(), 0);
        assert!(!client.connected());
    }

    #[test]
    fn test_last_event_id_and_rx_timeout() {
        let (transport, peer) = MemoryTransport::new(64);
        let mut head = RequestHead::default();
        head.push_header(Header::new("Last-Event-ID", "42abc"));

        let mut boxed: Box<dyn Transport> = Box::new(transport);
        boxed.set_rx_timeout(Some(Duration::from_secs(3)));
        let client = EventSourceClient::new(boxed, &head, 8);

        assert_eq!(client.last_id(), 42);
        assert_eq!(peer.rx_timeout(), None);
    }

    #[test]
    fn test_timeout_closes() {
        let (mut client, peer) = client(64, 8);
        client.on_timeout();
        assert!(peer.close_requested());
    }
}
