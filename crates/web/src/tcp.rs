//! [`Transport`] over a tokio TCP stream.
//!
//! Every accepted stream is split in two tasks. The reader turns received
//! bytes, the rx timeout and the end of the stream into [`TransportEvent`]s.
//! The writer writes queued packets in order and reports each one as
//! acknowledged once the kernel took it. All events go to the engine through
//! one channel, tagged with the connection id.

use bytes::{Bytes, BytesMut};
use ember_http::transport::{Transport, TransportEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

const READ_BUFFER_SIZE: usize = 4 * 1024;

pub(crate) type EventSender = mpsc::UnboundedSender<(u64, TransportEvent)>;

/// State shared between a transport and its writer task.
#[derive(Debug)]
struct Link {
    in_flight: AtomicUsize,
    packets: AtomicUsize,
    connected: AtomicBool,
}

impl Link {
    fn acknowledge(&self, len: usize) {
        self.in_flight.fetch_sub(len, Ordering::AcqRel);
        self.packets.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub(crate) struct TcpTransport {
    id: u64,
    link: Arc<Link>,
    capacity: usize,
    pending: BytesMut,
    packets: Option<mpsc::UnboundedSender<Bytes>>,
    rx_timeout: watch::Sender<Option<Duration>>,
    closed: watch::Sender<bool>,
}

impl TcpTransport {
    /// Splits `stream`, spawns its reader and writer and returns the
    /// transport driving them.
    pub(crate) fn spawn(id: u64, stream: TcpStream, capacity: usize, events: &EventSender) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(id, cause = %e, "failed to disable nagle");
        }
        let (reader, writer) = stream.into_split();

        let link = Arc::new(Link {
            in_flight: AtomicUsize::new(0),
            packets: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        });
        let (packets, packets_rx) = mpsc::unbounded_channel();
        let (rx_timeout, rx_timeout_rx) = watch::channel(None);
        let (closed, closed_rx) = watch::channel(false);

        tokio::spawn(read_loop(id, reader, events.clone(), rx_timeout_rx, closed_rx));
        tokio::spawn(write_loop(id, writer, packets_rx, Arc::clone(&link), events.clone()));

        Self { id, link, capacity, pending: BytesMut::new(), packets: Some(packets), rx_timeout, closed }
    }
}

impl Transport for TcpTransport {
    fn space(&self) -> usize {
        if !self.connected() {
            return 0;
        }
        self.capacity.saturating_sub(self.link.in_flight.load(Ordering::Acquire) + self.pending.len())
    }

    fn add(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.space());
        self.pending.extend_from_slice(&data[..accepted]);
        accepted
    }

    fn can_send(&self) -> bool {
        self.packets.is_some() && self.connected()
    }

    fn send(&mut self) -> bool {
        if self.pending.is_empty() || !self.connected() {
            return false;
        }
        let Some(packets) = &self.packets else {
            return false;
        };

        let packet = self.pending.split().freeze();
        let len = packet.len();
        self.link.in_flight.fetch_add(len, Ordering::AcqRel);
        self.link.packets.fetch_add(1, Ordering::AcqRel);
        if packets.send(packet).is_err() {
            trace!(id = self.id, "writer is gone, dropping packet");
            self.link.connected.store(false, Ordering::Release);
            return false;
        }
        true
    }

    fn close(&mut self) {
        trace!(id = self.id, "closing transport");
        self.link.connected.store(false, Ordering::Release);
        // the writer flushes what is queued and shuts the stream down
        self.packets = None;
        self.closed.send_replace(true);
    }

    fn connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }

    fn packets_waiting(&self) -> usize {
        self.link.packets.load(Ordering::Acquire)
    }

    fn set_rx_timeout(&mut self, timeout: Option<Duration>) {
        self.rx_timeout.send_replace(timeout);
    }
}

async fn read_loop(
    id: u64,
    mut reader: OwnedReadHalf,
    events: EventSender,
    mut rx_timeout: watch::Receiver<Option<Duration>>,
    mut closed: watch::Receiver<bool>,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut timeout = *rx_timeout.borrow_and_update();

    loop {
        let idle = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
            }
            changed = rx_timeout.changed() => {
                if changed.is_err() {
                    break;
                }
                timeout = *rx_timeout.borrow_and_update();
            }
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    trace!(id, "peer closed the stream");
                    break;
                }
                Ok(len) => {
                    trace!(id, len, "received data");
                    let data = buf.split().freeze();
                    buf.reserve(READ_BUFFER_SIZE);
                    if events.send((id, TransportEvent::Data(data))).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = events.send((id, TransportEvent::Error(e)));
                    break;
                }
            },
            () = idle => {
                // fires once per arming
                timeout = None;
                if events.send((id, TransportEvent::Timeout(Instant::now()))).is_err() {
                    return;
                }
            }
        }
    }

    let _ = events.send((id, TransportEvent::Disconnect));
}

async fn write_loop(
    id: u64,
    mut writer: OwnedWriteHalf,
    mut packets: mpsc::UnboundedReceiver<Bytes>,
    link: Arc<Link>,
    events: EventSender,
) {
    while let Some(packet) = packets.recv().await {
        if let Err(e) = writer.write_all(&packet).await {
            link.connected.store(false, Ordering::Release);
            let _ = events.send((id, TransportEvent::Error(e)));
            return;
        }

        link.acknowledge(packet.len());
        if events.send((id, TransportEvent::ack(packet.len()))).is_err() {
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        trace!(id, cause = %e, "failed to shut down stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::error::TryRecvError;

    async fn connected_pair(capacity: usize) -> (TcpTransport, TcpStream, mpsc::UnboundedReceiver<(u64, TransportEvent)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let (events, events_rx) = mpsc::unbounded_channel();
        (TcpTransport::spawn(7, server, capacity, &events), client, events_rx)
    }

    #[tokio::test]
    async fn test_received_data_becomes_events() {
        let (_transport, mut client, mut events) = connected_pair(64).await;
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let (id, event) = events.recv().await.unwrap();
        assert_eq!(id, 7);
        assert!(matches!(event, TransportEvent::Data(data) if &data[..] == b"GET / HTTP/1.1\r\n"));

        drop(client);
        assert!(matches!(events.recv().await.unwrap().1, TransportEvent::Disconnect));
    }

    #[tokio::test]
    async fn test_sent_packets_are_acknowledged() {
        let (mut transport, mut client, mut events) = connected_pair(8).await;

        assert_eq!(transport.add(b"0123456789"), 8);
        assert_eq!(transport.space(), 0);
        assert!(transport.send());

        let (_, event) = events.recv().await.unwrap();
        assert!(matches!(event, TransportEvent::Ack { len: 8, .. }));
        assert_eq!(transport.space(), 8);
        assert_eq!(transport.packets_waiting(), 0);

        let mut received = [0; 8];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"01234567");
    }

    #[tokio::test]
    async fn test_close_flushes_and_disconnects() {
        let (mut transport, mut client, mut events) = connected_pair(64).await;
        transport.write(b"bye");
        transport.close();
        assert!(!transport.connected());
        assert_eq!(transport.space(), 0);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");

        loop {
            if events.recv().await.unwrap().1.is_disconnect() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_rx_timeout_fires_once() {
        let (mut transport, _client, mut events) = connected_pair(64).await;
        transport.set_rx_timeout(Some(Duration::from_millis(20)));

        let (_, event) = events.recv().await.unwrap();
        assert!(matches!(event, TransportEvent::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(events.try_recv().err(), Some(TryRecvError::Empty));
    }
}
