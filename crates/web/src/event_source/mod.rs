//! Server-sent events
//!
//! An [`EventSource`] is a handler for one path. Each `GET` on it is answered
//! with an open `text/event-stream` response; once the head is acknowledged
//! the connection is upgraded into an [`EventSourceClient`] owned by the
//! event source. From then on [`EventSource::send`] fans frames out to every
//! connected client.
//!
//! Clients queue a bounded number of frames ([`DEFAULT_MAX_QUEUED_MESSAGES`]
//! unless configured otherwise). A frame is written only when the transport
//! has room for all of it, and leaves the queue when every byte of it was
//! acknowledged. Frames arriving while the queue is full are dropped.

mod client;
mod format;
mod message;
mod source;

pub use client::DEFAULT_MAX_QUEUED_MESSAGES;
pub use client::EventSourceClient;
pub use format::format_frame;
pub use message::EventSourceMessage;
pub use source::EventSource;
