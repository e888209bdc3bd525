//! An event driven HTTP connection engine
//!
//! This crate turns a raw, non-blocking byte stream per connection into
//! structured requests, dispatches them to handlers and streams responses
//! back under explicit, ack based backpressure. It never owns a socket or a
//! runtime: a driver feeds [`transport::TransportEvent`]s into a
//! [`connection::Connection`] and provides a [`transport::Transport`] to
//! write to.
//!
//! # Features
//!
//! - Incremental request parsing that resumes at any byte boundary
//! - Url encoded, multipart (with streamed uploads) and chunked request bodies
//! - Expect-continue handling
//! - Fixed-length, streamed and chunked responses pulled from a content source
//! - Flow control driven only by acknowledgments of earlier writes
//! - Connection upgrades to persistent sessions (used for server-sent events)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use http::StatusCode;
//! use ember_http::connection::{Connection, ConnectionContext, Request};
//! use ember_http::handler::make_handler;
//! use ember_http::transport::{MemoryTransport, TransportEvent};
//!
//! let handler = Arc::new(make_handler(|request: &mut Request| {
//!     request.send_text(StatusCode::OK, "text/plain", "Hello World!\r\n");
//! }));
//!
//! let (transport, peer) = MemoryTransport::new(4096);
//! let mut connection = Connection::new(Box::new(transport), ConnectionContext::new(Arc::new(handler)));
//!
//! connection.handle(TransportEvent::Data(Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n")));
//! assert!(peer.take_sent_string().ends_with("Hello World!\r\n"));
//!
//! connection.handle(TransportEvent::ack(peer.ack_all()));
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: the request decoder and response chunk framing
//! - [`protocol`]: request head, parse events, default headers, errors
//! - [`response`]: the response state machine and content sources
//! - [`connection`]: per connection lifecycle, requests and sessions
//! - [`handler`]: handler and dispatcher traits
//! - [`transport`]: the transport abstraction and an in-memory transport
//! - [`sync`]: the owner tracked lock for state shared across contexts
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: top-level error type
//! - [`protocol::ParseError`]: malformed requests; the connection is closed
//!   without a response
//! - [`protocol::SendError`]: response failures; the response fails and the
//!   connection is closed
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only, one request per connection
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod response;
pub mod sync;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
pub use utils::{parse_leading_u64, url_decode};
