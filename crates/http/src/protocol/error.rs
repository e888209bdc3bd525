use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("response failed: {source}")]
    Send {
        #[from]
        source: SendError,
    },
}

/// Why a request could not be read. The connection is closed without a
/// response.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request head of {size} bytes exceeds {limit}")]
    HeadTooLarge { size: usize, limit: usize },

    #[error("more than {limit} headers")]
    TooManyHeaders { limit: usize },

    #[error("invalid request line {line:?}")]
    InvalidRequestLine { line: String },

    #[error("unsupported method {method:?}")]
    UnsupportedMethod { method: String },

    #[error("invalid header line {line:?}")]
    InvalidHeader { line: String },

    #[error("invalid chunked body: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid multipart body: {reason}")]
    InvalidMultipart { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn head_too_large(size: usize, limit: usize) -> Self {
        Self::HeadTooLarge { size, limit }
    }

    pub fn too_many_headers(limit: usize) -> Self {
        Self::TooManyHeaders { limit }
    }

    pub fn invalid_request_line(line: impl Into<String>) -> Self {
        Self::InvalidRequestLine { line: line.into() }
    }

    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod { method: method.into() }
    }

    pub fn invalid_header(line: impl Into<String>) -> Self {
        Self::InvalidHeader { line: line.into() }
    }

    pub fn invalid_chunk(reason: impl Into<String>) -> Self {
        Self::InvalidChunk { reason: reason.into() }
    }

    pub fn invalid_multipart(reason: impl Into<String>) -> Self {
        Self::InvalidMultipart { reason: reason.into() }
    }
}

/// Why a response could not be completed. The response fails and the
/// connection is closed.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("transport accepted {accepted} of {expected} bytes")]
    ShortWrite { expected: usize, accepted: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_content(reason: impl Into<String>) -> Self {
        Self::InvalidContent { reason: reason.into() }
    }

    pub fn short_write(expected: usize, accepted: usize) -> Self {
        Self::ShortWrite { expected, accepted }
    }
}
