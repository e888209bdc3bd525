//! Request body decoding.
//!
//! Once the head is parsed, [`PayloadDecoder`] picks one strategy from the
//! request's framing and content type and turns body bytes into
//! [`ParseEvent`](crate::protocol::ParseEvent)s:
//!
//! - [`LengthDecoder`]: plain bytes bounded by `Content-Length`
//! - [`ChunkedDecoder`]: `Transfer-Encoding: chunked`
//! - [`FormDecoder`]: `application/x-www-form-urlencoded` (and `text/plain`
//!   bodies that look like `name=value`), one parameter per `&`
//! - [`MultipartDecoder`]: `multipart/*` with form fields and file uploads
//!
//! Every decoder finishes with exactly one `ParseEvent::Complete` and never
//! consumes bytes past the end of its body.

mod chunked_decoder;
mod form_decoder;
mod length_decoder;
mod multipart_decoder;
mod payload_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use form_decoder::FormDecoder;
pub use length_decoder::LengthDecoder;
pub use multipart_decoder::MultipartDecoder;
pub use payload_decoder::PayloadDecoder;

/// Size of the buffer an upload is collected in before it is handed out.
pub const UPLOAD_BUFFER_SIZE: usize = 1024;
