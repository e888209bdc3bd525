//! Chunked transfer encoding of response content.
//!
//! Every piece of content becomes `<HEX length>\r\n<data>\r\n`; an empty
//! piece is the terminating `0\r\n\r\n`.

use crate::protocol::SendError;
use bytes::{BufMut, BytesMut};
use std::io::Write;
use tokio_util::codec::Encoder;

/// Below this much free space no chunk is started.
pub const MIN_CHUNK_SPACE: usize = 8;

/// Frames response content into chunks. Nothing is written after the
/// terminating chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkEncoder {
    eof: bool,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// How much content fits in a chunk that may occupy at most `space` bytes
    /// including its framing.
    pub fn max_payload(space: usize) -> usize {
        space.saturating_sub(framing_len(space))
    }
}

/// Framing bytes around a chunk of `len` bytes: hex digits plus two CRLFs.
pub fn framing_len(len: usize) -> usize {
    let hex_digits = (usize::BITS - len.leading_zeros()).div_ceil(4).max(1);
    hex_digits as usize + 4
}

impl Encoder<&[u8]> for ChunkEncoder {
    type Error = SendError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        if item.is_empty() {
            self.eof = true;
            dst.extend_from_slice(b"0\r\n\r\n");
            return Ok(());
        }

        dst.reserve(item.len() + framing_len(item.len()));
        write!(dst.writer(), "{:X}\r\n", item.len())?;
        dst.extend_from_slice(item);
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
