//! Protocol types shared by the parser, the response pipeline and handlers.
//!
//! - **Request head** ([`RequestHead`]): method, url, recognized headers,
//!   the retained header list and parameters, in arrival order
//! - **Parse events** ([`ParseEvent`]): what the request decoder emits while
//!   a request streams in: head, body params, body bytes, upload pieces,
//!   completion
//! - **Default headers** ([`DefaultHeaders`]): process wide response headers,
//!   built once and injected into every connection
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`])

mod request;
pub use request::Authorization;
pub use request::ConnectionKind;
pub use request::Header;
pub use request::Param;
pub use request::RequestHead;

mod message;
pub use message::BodyChunk;
pub use message::ParseEvent;
pub use message::UploadChunk;

mod default_headers;
pub use default_headers::DefaultHeaders;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
