//! Selection of the body decoding strategy.
//!
//! The strategy follows from the parsed head:
//!
//! 1. `Transfer-Encoding: chunked` is always decoded as a chunked byte stream
//! 2. a zero `Content-Length` (or a missing one) means there is no body
//! 3. a `multipart/*` content type with a boundary selects the multipart parser
//! 4. `application/x-www-form-urlencoded` selects the form parser
//! 5. `text/plain` is sniffed: a body starting like `name=` is parsed as a form
//! 6. everything else is streamed as plain bytes

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::form_decoder::FormDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::body::multipart_decoder::MultipartDecoder;
use crate::protocol::{ParseError, ParseEvent, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

/// Unified body decoder delegating to the strategy picked for a request.
#[derive(Debug)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    Form(FormDecoder),
    Multipart(Box<MultipartDecoder>),
    /// `text/plain` body whose shape is not known yet
    Sniff(u64),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn form(size: u64) -> Self {
        Self { kind: Kind::Form(FormDecoder::new(size)) }
    }

    pub fn multipart(boundary: &str, size: u64) -> Self {
        Self { kind: Kind::Multipart(Box::new(MultipartDecoder::new(boundary, size))) }
    }

    /// Picks the strategy for the body following `head`.
    pub fn for_head(head: &RequestHead) -> Self {
        if head.is_chunked() {
            return Self::chunked();
        }

        let length = head.content_length();
        if length == 0 {
            return Self::empty();
        }

        let content_type = head.content_type().unwrap_or_default();
        match head.boundary() {
            Some(boundary) => Self::multipart(boundary, length),
            None if starts_with_ignore_case(content_type, "application/x-www-form-urlencoded") => Self::form(length),
            None if content_type.eq_ignore_ascii_case("text/plain") => Self { kind: Kind::Sniff(length) },
            None => Self::fix_length(length),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn is_param_char(byte: u8) -> bool {
    !matches!(byte, 0 | b'{' | b'[' | b'&' | b'=')
}

/// Decides whether a `text/plain` body is really `name=value` pairs.
///
/// Returns `None` while the bytes seen so far cannot tell.
fn sniff_form(seen: &[u8], total: u64) -> Option<bool> {
    let first = *seen.first()?;
    if !is_param_char(first) {
        return Some(false);
    }

    match seen.iter().position(|b| !is_param_char(*b)) {
        Some(end) => Some(seen[end] == b'='),
        None if seen.len() as u64 >= total => Some(false),
        None => None,
    }
}

impl Decoder for PayloadDecoder {
    type Item = ParseEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Kind::Sniff(total) = self.kind {
            let seen = &src[..src.len().min(usize::try_from(total).unwrap_or(usize::MAX))];
            match sniff_form(seen, total) {
                Some(true) => self.kind = Kind::Form(FormDecoder::new(total)),
                Some(false) => self.kind = Kind::Length(LengthDecoder::new(total)),
                None => return Ok(None),
            }
            trace!(form = matches!(self.kind, Kind::Form(_)), "sniffed text/plain body");
        }

        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::Form(decoder) => decoder.decode(src),
            Kind::Multipart(decoder) => decoder.decode(src),
            Kind::Sniff(_) => Ok(None),
            Kind::NoBody => Ok(Some(ParseEvent::Complete)),
        }
    }
}
