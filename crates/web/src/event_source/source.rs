use crate::auth::{self, Credentials};
use crate::event_source::client::{DEFAULT_MAX_QUEUED_MESSAGES, EventSourceClient};
use crate::event_source::format_frame;
use bytes::Bytes;
use ember_http::connection::{Request, Session, Upgrade};
use ember_http::handler::Handler;
use ember_http::protocol::RequestHead;
use ember_http::sync::SyncLock;
use ember_http::transport::Transport;
use http::{Method, StatusCode};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

type ConnectCallback = dyn Fn(&mut EventSourceClient) + Send + Sync;

/// A client whose `on_connect` callback is running. It already counts as
/// connected, frames sent to the source meanwhile are held here.
#[derive(Debug)]
struct Joining {
    id: u64,
    frames: Vec<Bytes>,
    closed: bool,
}

/// Client registry shared by the handler, its sessions and every caller of
/// [`EventSource::send`].
///
/// Every access runs under `lock`, which callbacks re-entering the event
/// source from the same context pass through; `clients` is only ever held
/// for the duration of one operation.
struct Shared {
    lock: SyncLock,
    clients: Mutex<Vec<(u64, EventSourceClient)>>,
    joining: Mutex<Vec<Joining>>,
    next_id: AtomicU64,
}

impl Shared {
    fn clients(&self) -> MutexGuard<'_, Vec<(u64, EventSourceClient)>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn joining(&self) -> MutexGuard<'_, Vec<Joining>> {
        self.joining.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_joining(&self, id: u64) -> Option<Joining> {
        let mut joining = self.joining();
        let pos = joining.iter().position(|j| j.id == id)?;
        Some(joining.swap_remove(pos))
    }

    fn with_client<F: FnOnce(&mut EventSourceClient)>(&self, id: u64, f: F) {
        let _guard = self.lock.guard_current();
        if let Some((_, client)) = self.clients().iter_mut().find(|(known, _)| *known == id) {
            f(client);
        }
    }
}

/// A server-sent events endpoint.
///
/// Answers `GET` on its path with an open-ended `text/event-stream`
/// response. Once the peer acknowledged that head the connection becomes an
/// [`EventSourceClient`] registered here, and [`EventSource::send`] reaches
/// it. Clones share the same clients.
#[derive(Clone)]
pub struct EventSource {
    path: String,
    credentials: Option<Credentials>,
    on_connect: Option<Arc<ConnectCallback>>,
    max_queued: usize,
    shared: Arc<Shared>,
}

impl EventSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            credentials: None,
            on_connect: None,
            max_queued: DEFAULT_MAX_QUEUED_MESSAGES,
            shared: Arc::new(Shared {
                lock: SyncLock::new(),
                clients: Mutex::new(Vec::new()),
                joining: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Called with every new client once it is registered, the place to
    /// greet it or to replay what it missed since [`EventSourceClient::last_id`].
    ///
    /// The callback may use this event source. Frames it broadcasts reach the
    /// new client after the ones the callback wrote to it directly.
    #[must_use]
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut EventSourceClient) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Requires these credentials. Ignored unless both are non-empty.
    pub fn set_authentication(&mut self, username: impl Into<String>, password: impl Into<String>) {
        let credentials = Credentials::new(username, password);
        self.credentials = credentials.is_configured().then_some(credentials);
    }

    #[must_use]
    pub fn with_authentication(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.set_authentication(username, password);
        self
    }

    #[must_use]
    pub fn with_max_queued_messages(mut self, max_queued: usize) -> Self {
        self.max_queued = max_queued;
        self
    }

    /// Queues one frame to every connected client.
    pub fn send(&self, message: &str, event: Option<&str>, id: u32, retry: u32) {
        let frame = format_frame(message, event, id, retry);

        let _guard = self.shared.lock.guard_current();
        for (_, client) in self.shared.clients().iter_mut().filter(|(_, client)| client.connected()) {
            client.write(&frame);
        }
        for joining in self.shared.joining().iter_mut().filter(|j| !j.closed) {
            joining.frames.push(frame.clone());
        }
    }

    /// Connected clients.
    pub fn count(&self) -> usize {
        let _guard = self.shared.lock.guard_current();
        let joining = self.shared.joining().iter().filter(|j| !j.closed).count();
        self.shared.clients().iter().filter(|(_, client)| client.connected()).count() + joining
    }

    /// Unacknowledged packets per connected client, rounded to nearest.
    pub fn avg_packets_waiting(&self) -> usize {
        let _guard = self.shared.lock.guard_current();
        let joining = self.shared.joining().iter().filter(|j| !j.closed).count();
        let clients = self.shared.clients();

        let (count, waiting) = clients
            .iter()
            .filter(|(_, client)| client.connected())
            .fold((joining, 0), |(count, waiting), (_, client)| (count + 1, waiting + client.packets_waiting()));

        if count == 0 { 0 } else { (waiting + count / 2) / count }
    }

    /// Closes every connected client.
    pub fn close(&self) {
        let _guard = self.shared.lock.guard_current();
        for (_, client) in self.shared.clients().iter_mut().filter(|(_, client)| client.connected()) {
            client.close();
        }
        for joining in self.shared.joining().iter_mut() {
            joining.closed = true;
        }
    }

    fn upgrade(&self) -> EventSourceUpgrade {
        EventSourceUpgrade {
            shared: Arc::clone(&self.shared),
            on_connect: self.on_connect.as_ref().map(Arc::clone),
            max_queued: self.max_queued,
        }
    }
}

impl Handler for EventSource {
    fn can_handle(&self, request: &mut Request) -> bool {
        if *request.method() != Method::GET || request.url() != self.path {
            return false;
        }
        request.add_interesting_header("Last-Event-ID");
        true
    }

    fn handle_request(&self, request: &mut Request) {
        if let Some(credentials) = &self.credentials
            && !credentials.authenticate(request.head())
        {
            auth::request_authentication(request, None, false);
            return;
        }

        let mut response = request.response(StatusCode::OK);
        response.set_content_type(mime::TEXT_EVENT_STREAM.as_ref());
        response.add_header("Cache-Control", "no-cache");
        response.add_header("Connection", "keep-alive");
        response.set_upgrade(Box::new(self.upgrade()));
        request.send(response);
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("path", &self.path)
            .field("authenticated", &self.credentials.is_some())
            .field("max_queued", &self.max_queued)
            .finish_non_exhaustive()
    }
}

/// Turns an answered event stream request into a registered client.
struct EventSourceUpgrade {
    shared: Arc<Shared>,
    on_connect: Option<Arc<ConnectCallback>>,
    max_queued: usize,
}

impl Upgrade for EventSourceUpgrade {
    fn upgrade(self: Box<Self>, transport: Box<dyn Transport>, head: RequestHead) -> Box<dyn Session> {
        let mut client = EventSourceClient::new(transport, &head, self.max_queued);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let _guard = self.shared.lock.guard_current();
        info!(id, url = head.url(), last_id = client.last_id(), "event source client connected");
        if let Some(on_connect) = &self.on_connect {
            self.shared.joining().push(Joining { id, frames: Vec::new(), closed: false });
            on_connect(&mut client);

            if let Some(joined) = self.shared.take_joining(id) {
                for frame in &joined.frames {
                    client.write(frame);
                }
                if joined.closed {
                    client.close();
                }
            }
        }
        self.shared.clients().push((id, client));

        Box::new(EventSourceSession { id, shared: Arc::clone(&self.shared) })
    }
}

/// The connection side of one client, forwarding transport events to it.
struct EventSourceSession {
    id: u64,
    shared: Arc<Shared>,
}

impl Session for EventSourceSession {
    fn on_ack(&mut self, len: usize, _time: Instant) {
        self.shared.with_client(self.id, |client| client.on_ack(len));
    }

    fn on_poll(&mut self, _time: Instant) {
        self.shared.with_client(self.id, EventSourceClient::on_poll);
    }

    fn on_timeout(&mut self, _time: Instant) {
        self.shared.with_client(self.id, EventSourceClient::on_timeout);
    }

    fn on_error(&mut self, error: std::io::Error) {
        debug!(id = self.id, cause = %error, "event source client failed, closing");
        self.shared.with_client(self.id, EventSourceClient::close);
    }

    fn on_disconnect(&mut self) {
        let _guard = self.shared.lock.guard_current();
        self.shared.clients().retain(|(id, _)| *id != self.id);
        info!(id = self.id, "event source client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use ember_http::connection::{Connection, ConnectionContext};
    use ember_http::transport::{MemoryPeer, MemoryTransport, TransportEvent};
    use indoc::indoc;

    fn connect(source: &EventSource, request: &str) -> (Connection, MemoryPeer) {
        let (transport, peer) = MemoryTransport::new(4096);
        let context = ConnectionContext::new(Arc::new(Arc::new(source.clone())));
        let mut connection = Connection::new(Box::new(transport), context);
        connection.handle(TransportEvent::Data(Bytes::copy_from_slice(request.as_bytes())));
        (connection, peer)
    }

    fn subscribe(source: &EventSource) -> (Connection, MemoryPeer) {
        let (mut connection, peer) = connect(source, "GET /events HTTP/1.1\r\nAccept: text/event-stream\r\n\r\n");
        connection.handle(TransportEvent::ack(peer.ack_all()));
        (connection, peer)
    }

    #[test]
    fn test_stream_head() {
        let source = EventSource::new("/events");
        let (connection, peer) = connect(&source, "GET /events HTTP/1.1\r\n\r\n");

        assert_eq!(
            peer.take_sent_string(),
            indoc! {"
                HTTP/1.1 200 OK\r
                Accept-Ranges: none\r
                Content-Type: text/event-stream\r
                Cache-Control: no-cache\r
                Connection: keep-alive\r
                \r
            "}
        );
        assert!(!connection.is_session());
        assert_eq!(source.count(), 0);
    }

    #[test]
    fn test_client_registered_after_head_ack() {
        let source = EventSource::new("/events");
        let (connection, peer) = subscribe(&source);
        peer.take_sent();

        assert!(connection.is_session());
        assert_eq!(source.count(), 1);

        source.send("hello", Some("greeting"), 1, 0);
        assert_eq!(peer.take_sent_string(), "id: 1\r\nevent: greeting\r\ndata: hello\r\n\r\n");
    }

    #[test]
    fn test_on_connect_sees_last_event_id() {
        let source = EventSource::new("/events").on_connect(|client| {
            let resume = format!("resume after {}", client.last_id());
            client.send(&resume, None, 0, 1000);
        });
        let (mut connection, peer) = connect(&source, "GET /events HTTP/1.1\r\nLast-Event-ID: 9\r\n\r\n");
        peer.take_sent();
        connection.handle(TransportEvent::ack(peer.ack_all()));

        assert_eq!(peer.take_sent_string(), "retry: 1000\r\ndata: resume after 9\r\n\r\n");
    }

    #[test]
    fn test_on_connect_may_use_the_source() {
        let source = EventSource::new("/events");
        let seen = Arc::new(Mutex::new(None));
        let reentrant = {
            let source = source.clone();
            let seen = Arc::clone(&seen);
            source.clone().on_connect(move |client| {
                *seen.lock().unwrap() = Some(source.count());
                client.send("direct", None, 0, 0);
                source.send("broadcast", None, 0, 0);
            })
        };

        let (mut connection, peer) = connect(&reentrant, "GET /events HTTP/1.1\r\n\r\n");
        peer.take_sent();
        connection.handle(TransportEvent::ack(peer.ack_all()));
        connection.handle(TransportEvent::ack(peer.ack_all()));

        assert_eq!(*seen.lock().unwrap(), Some(1));
        assert_eq!(reentrant.count(), 1);
        assert_eq!(peer.take_sent_string(), "data: direct\r\n\r\ndata: broadcast\r\n\r\n");
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let source = EventSource::new("/events");
        let (_first, first_peer) = subscribe(&source);
        let (_second, second_peer) = subscribe(&source);
        first_peer.take_sent();
        second_peer.take_sent();

        source.send("tick", None, 0, 0);
        assert_eq!(first_peer.take_sent_string(), "data: tick\r\n\r\n");
        assert_eq!(second_peer.take_sent_string(), "data: tick\r\n\r\n");
        assert_eq!(source.avg_packets_waiting(), 1);
    }

    #[test]
    fn test_broadcast_copies_are_independent() {
        let source = EventSource::new("/events");
        let (mut first, first_peer) = subscribe(&source);
        let (mut second, second_peer) = subscribe(&source);
        let (mut third, third_peer) = subscribe(&source);
        for peer in [&first_peer, &second_peer, &third_peer] {
            peer.take_sent();
        }

        source.send("x", None, 0, 0);
        assert_eq!(first_peer.take_sent_string(), "data: x\r\n\r\n");
        assert_eq!(second_peer.take_sent_string(), "data: x\r\n\r\n");
        assert_eq!(third_peer.take_sent_string(), "data: x\r\n\r\n");

        second_peer.disconnect();
        second.handle(TransportEvent::Disconnect);
        assert_eq!(source.count(), 2);

        source.send("y", None, 0, 0);
        assert_eq!(first_peer.take_sent_string(), "data: y\r\n\r\n");
        assert_eq!(second_peer.take_sent_string(), "");
        assert_eq!(third_peer.take_sent_string(), "data: y\r\n\r\n");

        // a stalled client keeps its frames while the other one drains
        third_peer.pause_sending(true);
        first.handle(TransportEvent::ack(first_peer.ack_all()));
        third.handle(TransportEvent::ack(third_peer.ack_all()));
        source.send("z", None, 0, 0);
        assert_eq!(first_peer.take_sent_string(), "data: z\r\n\r\n");
        assert_eq!(third_peer.take_sent_string(), "");

        third_peer.pause_sending(false);
        third.handle(TransportEvent::poll());
        assert_eq!(third_peer.take_sent_string(), "data: z\r\n\r\n");
    }

    #[test]
    fn test_avg_packets_waiting_rounds() {
        let source = EventSource::new("/events");
        let (_first, first_peer) = subscribe(&source);
        let (_second, second_peer) = subscribe(&source);
        assert_eq!(source.avg_packets_waiting(), 0);

        first_peer.take_sent();
        second_peer.take_sent();
        source.send("one", None, 0, 0);
        source.send("two", None, 0, 0);
        source.send("three", None, 0, 0);
        second_peer.ack_all();

        // (3 + 0 + 1) / 2
        assert_eq!(source.avg_packets_waiting(), 2);
    }

    #[test]
    fn test_no_clients() {
        let source = EventSource::new("/events");
        assert_eq!(source.count(), 0);
        assert_eq!(source.avg_packets_waiting(), 0);
        source.send("nobody", None, 0, 0);
        source.close();
    }

    #[test]
    fn test_disconnect_unregisters() {
        let source = EventSource::new("/events");
        let (mut connection, peer) = subscribe(&source);
        assert_eq!(source.count(), 1);

        peer.disconnect();
        assert_eq!(source.count(), 0);
        connection.handle(TransportEvent::Disconnect);
        assert!(connection.is_closed());
        assert!(source.shared.clients().is_empty());
    }

    #[test]
    fn test_close_closes_clients() {
        let source = EventSource::new("/events");
        let (_connection, peer) = subscribe(&source);
        source.close();
        assert!(peer.close_requested());
        assert_eq!(source.count(), 0);
    }

    #[test]
    fn test_acks_drain_queue() {
        let source = EventSource::new("/events").with_max_queued_messages(2);
        let (mut connection, peer) = subscribe(&source);
        peer.take_sent();
        peer.pause_sending(true);

        source.send("a", None, 0, 0);
        source.send("b", None, 0, 0);
        source.send("c", None, 0, 0);

        peer.pause_sending(false);
        connection.handle(TransportEvent::poll());
        assert_eq!(peer.take_sent_string(), "data: a\r\n\r\ndata: b\r\n\r\n");

        connection.handle(TransportEvent::ack(peer.ack_all()));
        source.send("d", None, 0, 0);
        assert_eq!(peer.take_sent_string(), "data: d\r\n\r\n");
    }

    #[test]
    fn test_other_paths_and_methods_are_not_handled() {
        let source = EventSource::new("/events");
        let (_connection, peer) = connect(&source, "POST /events HTTP/1.1\r\n\r\n");
        assert!(peer.take_sent_string().starts_with("HTTP/1.1 501 Not Implemented\r\n"));

        let (_connection, peer) = connect(&source, "GET /other HTTP/1.1\r\n\r\n");
        assert!(peer.take_sent_string().starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    }

    #[test]
    fn test_authentication_required() {
        let source = EventSource::new("/events").with_authentication("admin", "secret");
        let (connection, peer) = connect(&source, "GET /events HTTP/1.1\r\n\r\n");

        let sent = peer.take_sent_string();
        assert!(sent.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(sent.contains("WWW-Authenticate: Basic realm=\"Login Required\"\r\n"));
        assert!(!connection.is_session());

        let token = STANDARD.encode("admin:secret");
        let request = format!("GET /events HTTP/1.1\r\nAuthorization: Basic {token}\r\n\r\n");
        let (_connection, peer) = connect(&source, &request);
        assert!(peer.take_sent_string().starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn test_empty_credentials_disable_authentication() {
        let source = EventSource::new("/events").with_authentication("admin", "");
        let (_connection, peer) = connect(&source, "GET /events HTTP/1.1\r\n\r\n");
        assert!(peer.take_sent_string().starts_with("HTTP/1.1 200 OK\r\n"));
    }
}
