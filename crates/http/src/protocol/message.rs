use crate::protocol::{Param, RequestHead};
use bytes::Bytes;

/// What the request decoder produces, in stream order.
///
/// A well formed request yields exactly one [`ParseEvent::Head`] first and one
/// [`ParseEvent::Complete`] last. Everything in between comes from the body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// The request line and headers are complete.
    Head(Box<RequestHead>),
    /// A parameter carried in a form or multipart body.
    Param(Param),
    /// Raw body bytes of a request that is neither a form nor multipart.
    Body(BodyChunk),
    /// A slice of an uploaded file.
    Upload(UploadChunk),
    /// The whole request has been read.
    Complete,
}

impl ParseEvent {
    #[inline]
    pub fn is_head(&self) -> bool {
        matches!(self, ParseEvent::Head(_))
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, ParseEvent::Complete)
    }
}

/// A contiguous piece of a plain request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyChunk {
    pub data: Bytes,
    /// Offset of `data` within the body.
    pub index: u64,
    /// Declared body length, `None` for chunked bodies.
    pub total: Option<u64>,
}

/// A piece of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    /// Form field name of the part.
    pub name: String,
    pub filename: String,
    pub content_type: Option<String>,
    /// Offset of `data` within the file.
    pub index: u64,
    pub data: Bytes,
    /// Set on the piece that closes the file.
    pub last: bool,
}
