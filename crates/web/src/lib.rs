//! Routing, authentication, server-sent events and a tokio driver for
//! [`ember_http`].
//!
//! # Example
//!
//! ```no_run
//! use ember_web::{EventSource, Router, Server, ServerConfig};
//! use ember_web::router::get;
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() {
//!     let events = EventSource::new("/events");
//!     let router = Router::builder()
//!         .route("/", get(|request| request.send_text(StatusCode::OK, "text/plain", "hello")))
//!         .handler(events.clone())
//!         .build()
//!         .unwrap();
//!
//!     let server = Server::builder()
//!         .config(ServerConfig::default().with_address("0.0.0.0:8080"))
//!         .router(router)
//!         .build()
//!         .unwrap();
//!
//!     server.start().await.unwrap();
//! }
//! ```
//!
//! # Modules
//!
//! - [`router`]: rewrites, url patterns, filters and callback routes
//! - [`event_source`]: server-sent event endpoints and their clients
//! - [`auth`]: Basic and Digest authentication
//! - [`fs`]: file responses and static files
//! - [`config`]: server configuration
//! - [`server`]: the TCP server running the engine

pub mod auth;
pub mod config;
pub mod event_source;
pub mod fs;
pub mod router;
pub mod server;

mod tcp;

pub use config::ServerConfig;
pub use event_source::EventSource;
pub use router::Router;
pub use server::Server;

#[cfg(test)]
pub(crate) mod test_utils {
    use bytes::{Bytes, BytesMut};
    use ember_http::codec::HeadDecoder;
    use ember_http::connection::{Connection, ConnectionContext};
    use ember_http::handler::Dispatcher;
    use ember_http::protocol::RequestHead;
    use ember_http::transport::{MemoryPeer, MemoryTransport, TransportEvent};
    use std::sync::Arc;
    use tokio_util::codec::Decoder;

    pub(crate) fn parse_head(raw: &str) -> RequestHead {
        let mut buf = BytesMut::from(raw);
        HeadDecoder::new().decode(&mut buf).unwrap().unwrap()
    }

    /// Feeds `request` to a fresh connection over a 4 KiB memory transport.
    pub(crate) fn serve<D: Dispatcher + 'static>(dispatcher: D, request: &str) -> (Connection, MemoryPeer) {
        let (transport, peer) = MemoryTransport::new(4096);
        let mut connection = Connection::new(Box::new(transport), ConnectionContext::new(Arc::new(dispatcher)));
        connection.handle(TransportEvent::Data(Bytes::copy_from_slice(request.as_bytes())));
        (connection, peer)
    }
}
