//! Decoder for `Transfer-Encoding: chunked` request bodies.
//!
//! Each chunk is `<hex size>[;extensions]\r\n<data>\r\n`, a zero sized chunk
//! followed by optional trailers and an empty line ends the body
//! ([RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1)).
//! The decoder is a byte level state machine, so a chunk header may be split
//! at any byte across reads.

use crate::protocol::{BodyChunk, ParseError, ParseEvent};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// Streams a chunked body as [`ParseEvent::Body`] chunks without the framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    /// Bytes still expected in the current chunk
    remaining: u64,
    /// Body bytes handed out so far
    index: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining: 0, index: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Hex digits of the chunk size
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Ignored chunk extensions
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    /// A trailer field after the last chunk
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

fn invalid(reason: &str) -> ParseError {
    ParseError::invalid_chunk(reason)
}

impl Decoder for ChunkedDecoder {
    type Item = ParseEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!(len = self.index, "finished reading chunked body");
                return Ok(Some(ParseEvent::Complete));
            }

            if self.state == Data {
                if src.is_empty() {
                    return Ok(None);
                }
                let data = self.take_data(src);
                let chunk = BodyChunk { index: self.index, data, total: None };
                self.index += chunk.data.len() as u64;
                trace!(len = chunk.data.len(), "read chunked bytes");
                return Ok(Some(ParseEvent::Body(chunk)));
            }

            if !src.has_remaining() {
                return Ok(None);
            }

            let byte = src.get_u8();
            self.state = self.next_state(byte)?;
        }
    }
}

impl ChunkedDecoder {
    fn take_data(&mut self, src: &mut BytesMut) -> Bytes {
        let len = src.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        self.remaining -= len as u64;
        if self.remaining == 0 {
            self.state = DataCr;
        }
        src.split_to(len).freeze()
    }

    fn push_size_digit(&mut self, digit: u8) -> Result<(), ParseError> {
        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| invalid("chunk size overflow"))?;
        Ok(())
    }

    fn next_state(&mut self, byte: u8) -> Result<ChunkedState, ParseError> {
        let state = match (self.state, byte) {
            (Size, b'0'..=b'9') => {
                self.push_size_digit(byte - b'0')?;
                Size
            }
            (Size, b'a'..=b'f') => {
                self.push_size_digit(byte - b'a' + 10)?;
                Size
            }
            (Size, b'A'..=b'F') => {
                self.push_size_digit(byte - b'A' + 10)?;
                Size
            }
            (Size | SizeLws, b'\t' | b' ') => SizeLws,
            (Size | SizeLws, b';') => Extension,
            (Size | SizeLws | Extension, b'\r') => SizeLf,
            (Size, _) => return Err(invalid("invalid chunk size")),
            (SizeLws, _) => return Err(invalid("invalid whitespace after chunk size")),
            (Extension, b'\n') => return Err(invalid("chunk extension contains newline")),
            (Extension, _) => Extension,
            (SizeLf, b'\n') if self.remaining == 0 => EndCr,
            (SizeLf, b'\n') => Data,
            (SizeLf, _) => return Err(invalid("missing LF after chunk size")),
            (DataCr, b'\r') => DataLf,
            (DataCr, _) => return Err(invalid("missing CR after chunk data")),
            (DataLf, b'\n') => Size,
            (DataLf, _) => return Err(invalid("missing LF after chunk data")),
            (EndCr, b'\r') => EndLf,
            (Trailer, b'\r') => TrailerLf,
            (EndCr | Trailer, _) => Trailer,
            (TrailerLf, b'\n') => EndCr,
            (TrailerLf, _) => return Err(invalid("missing LF after trailer")),
            (EndLf, b'\n') => End,
            (EndLf, _) => return Err(invalid("missing final LF")),
            (Data | End, _) => self.state,
        };
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        while let Some(event) = decoder.decode(buffer).unwrap() {
            match event {
                ParseEvent::Body(chunk) => body.extend_from_slice(&chunk.data),
                ParseEvent::Complete => return (body, true),
                other => panic!("unexpected event {other:?}"),
            }
        }
        (body, false)
    }

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let Some(ParseEvent::Body(chunk)) = decoder.decode(&mut buffer).unwrap() else { panic!() };
        assert_eq!(&chunk.data[..], b"1234567890abcdef");
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.total, None);

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(ParseEvent::Complete));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let (body, complete) = decode_all(&mut ChunkedDecoder::new(), &mut buffer);

        assert!(complete);
        assert_eq!(body, b"hello, world");
    }

    #[test]
    fn test_extensions_and_trailers() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\nTrailer: value\r\n\r\n"[..]);
        let (body, complete) = decode_all(&mut ChunkedDecoder::new(), &mut buffer);

        assert!(complete);
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_byte_by_byte() {
        let input = b"3\r\nabc\r\nA\r\n0123456789\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::new();
        let mut body = Vec::new();
        let mut complete = false;

        for byte in input {
            buffer.extend_from_slice(&[*byte]);
            while let Some(event) = decoder.decode(&mut buffer).unwrap() {
                match event {
                    ParseEvent::Body(chunk) => {
                        assert_eq!(chunk.index, body.len() as u64);
                        body.extend_from_slice(&chunk.data);
                    }
                    ParseEvent::Complete => {
                        complete = true;
                        break;
                    }
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }

        assert!(complete);
        assert_eq!(body, b"abc0123456789");
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer: BytesMut = BytesMut::from(&b"xyz\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let Some(ParseEvent::Body(chunk)) = decoder.decode(&mut buffer).unwrap() else { panic!() };
        assert_eq!(&chunk.data[..], b"hello");
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_size_overflow() {
        let mut buffer = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }
}
