//! The tokio driver.
//!
//! A [`Server`] accepts TCP connections and runs every [`Connection`] on one
//! engine task: transport events from all reader and writer tasks arrive
//! through a single channel and are handled one at a time, and a ticker
//! delivers poll events to every live connection.

use crate::config::{ConfigError, ServerConfig};
use crate::router::Router;
use crate::tcp::TcpTransport;
use ember_http::connection::{Connection, ConnectionContext};
use ember_http::handler::Dispatcher;
use ember_http::transport::TransportEvent;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::FmtSubscriber;

pub struct ServerBuilder {
    dispatcher: Option<Arc<dyn Dispatcher>>,
    config: ServerConfig,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { dispatcher: None, config: ServerConfig::default() }
    }

    #[must_use]
    pub fn bind(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Replaces the whole configuration, including an address set before.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn router(self, router: Router) -> Self {
        self.dispatcher(router)
    }

    #[must_use]
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let dispatcher = self.dispatcher.ok_or(ServerError::MissingRouter)?;
        self.config.validate()?;
        Ok(Server { dispatcher, config: self.config })
    }
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("router must be set")]
    MissingRouter,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

pub struct Server {
    dispatcher: Arc<dyn Dispatcher>,
    config: ServerConfig,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Installs a log subscriber unless the application has one, binds the
    /// configured address and serves it until the process ends.
    pub async fn start(self) -> Result<(), ServerError> {
        init_tracing();

        info!(address = %self.config.address, "start listening");
        let listener = match TcpListener::bind(self.config.address.as_str()).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(cause = %source, "bind server error");
                return Err(ServerError::Bind { address: self.config.address.clone(), source });
            }
        };

        self.serve(listener).await;
        Ok(())
    }

    /// Runs the engine loop on an already bound listener.
    pub async fn serve(self, listener: TcpListener) {
        let context = ConnectionContext::new(self.dispatcher)
            .with_default_headers(self.config.default_headers())
            .with_rx_timeout(self.config.rx_timeout());

        let (events, mut events_rx) = mpsc::unbounded_channel();
        let mut connections = HashMap::<u64, Connection>::new();
        let mut next_id = 0_u64;

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };

                    next_id += 1;
                    debug!(id = next_id, %remote_addr, "accepted connection");
                    let transport = TcpTransport::spawn(next_id, stream, self.config.send_capacity, &events);
                    connections.insert(next_id, Connection::new(Box::new(transport), context.clone()));
                }
                Some((id, event)) = events_rx.recv() => {
                    let Entry::Occupied(mut entry) = connections.entry(id) else {
                        trace!(id, ?event, "event for a finished connection");
                        continue;
                    };

                    entry.get_mut().handle(event);
                    if entry.get().is_closed() {
                        entry.remove();
                        debug!(id, "connection finished");
                    }
                }
                _ = ticker.tick() => {
                    for connection in connections.values_mut() {
                        connection.handle(TransportEvent::poll());
                    }
                    connections.retain(|_, connection| !connection.is_closed());
                }
            }
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("config", &self.config).finish_non_exhaustive()
    }
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        warn!(cause = %e, "failed to install the default subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_source::EventSource;
    use crate::router::get;
    use ember_http::connection::Request;
    use http::StatusCode;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn spawn_server(router: Router, config: ServerConfig) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = Server::builder().config(config).router(router).build().unwrap();
        tokio::spawn(server.serve(listener));
        address
    }

    async fn read_until(stream: &mut TcpStream, end: &str) -> String {
        let mut received = Vec::new();
        let mut buf = [0; 1024];
        while !String::from_utf8_lossy(&received).contains(end) {
            let len = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await.unwrap().unwrap();
            assert_ne!(len, 0, "stream ended early: {}", String::from_utf8_lossy(&received));
            received.extend_from_slice(&buf[..len]);
        }
        String::from_utf8(received).unwrap()
    }

    #[test]
    fn test_build_requires_router() {
        assert!(matches!(Server::builder().build(), Err(ServerError::MissingRouter)));

        let router = Router::builder().build().unwrap();
        let invalid = ServerConfig::default().with_max_queued_messages(0);
        assert!(matches!(
            Server::builder().router(router).config(invalid).build(),
            Err(ServerError::Config(ConfigError::ZeroQueue))
        ));
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let router = Router::builder()
            .route("/hello", get(|request: &mut Request| request.send_text(StatusCode::OK, "text/plain", "Hello World!")))
            .build()
            .unwrap();
        let config = ServerConfig::default().with_default_header("Server", "ember");
        let address = spawn_server(router, config).await;

        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

        let response = read_until(&mut stream, "Hello World!").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Server: ember\r\n"));
        assert!(response.contains("Content-Length: 12\r\n"));
    }

    #[tokio::test]
    async fn test_event_stream_over_tcp() {
        let events = EventSource::new("/events");
        let router = Router::builder().handler(events.clone()).build().unwrap();
        let address = spawn_server(router, ServerConfig::default()).await;

        let mut stream = TcpStream::connect(address).await.unwrap();
        stream.write_all(b"GET /events HTTP/1.1\r\n\r\n").await.unwrap();
        let head = read_until(&mut stream, "\r\n\r\n").await;
        assert!(head.contains("Content-Type: text/event-stream\r\n"));

        // the session starts once the engine saw the head acknowledged
        while events.count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        events.send("hi", Some("greeting"), 1, 0);
        let frame = read_until(&mut stream, "data: hi\r\n\r\n").await;
        assert_eq!(frame, "id: 1\r\nevent: greeting\r\ndata: hi\r\n\r\n");
    }
}
