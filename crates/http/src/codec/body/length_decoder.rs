//! Decoder for request bodies framed by `Content-Length`.
//!
//! The declared length is trusted optimistically: nothing is reserved up
//! front, bytes are handed out as they arrive and the body completes once the
//! declared number of bytes has been seen.

use std::cmp;

use crate::protocol::{BodyChunk, ParseError, ParseEvent};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Streams a fixed length body as [`ParseEvent::Body`] chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    total: u64,
    /// Bytes handed out so far
    index: u64,
}

impl LengthDecoder {
    pub fn new(total: u64) -> Self {
        Self { total, index: 0 }
    }

    fn remaining(&self) -> u64 {
        self.total - self.index
    }
}

impl Decoder for LengthDecoder {
    type Item = ParseEvent;
    type Error = ParseError;

    /// # Returns
    /// * `Ok(Some(ParseEvent::Body(_)))` with the next slice of the body
    /// * `Ok(Some(ParseEvent::Complete))` once all declared bytes were read
    /// * `Ok(None)` when more data is needed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining() == 0 {
            return Ok(Some(ParseEvent::Complete));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(usize::try_from(self.remaining()).unwrap_or(usize::MAX), src.len());
        let data = src.split_to(len).freeze();

        let chunk = BodyChunk { data, index: self.index, total: Some(self.total) };
        self.index += len as u64;
        Ok(Some(ParseEvent::Body(chunk)))
    }
}
