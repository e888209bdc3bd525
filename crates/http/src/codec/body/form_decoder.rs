//! Decoder for url encoded form bodies.
//!
//! The body is split on `&`. A token of the form `name=value` becomes a form
//! parameter with both halves url decoded. A token without `=`, or one that
//! starts like a JSON document (`{` or `[`), becomes the parameter `body`.

use std::cmp;

use crate::protocol::{Param, ParseError, ParseEvent};
use crate::utils::url_decode;
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDecoder {
    total: u64,
    parsed: u64,
    token: Vec<u8>,
}

impl FormDecoder {
    pub fn new(total: u64) -> Self {
        Self { total, parsed: 0, token: Vec::new() }
    }

    fn take_param(&mut self) -> Param {
        let token = std::mem::take(&mut self.token);
        let text = String::from_utf8_lossy(&token);

        match text.split_once('=') {
            Some((name, value)) if !text.starts_with(['{', '[']) => Param::form(url_decode(name), url_decode(value)),
            _ => Param::form("body", url_decode(&text)),
        }
    }
}

impl Decoder for FormDecoder {
    type Item = ParseEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.parsed == self.total {
                if self.token.is_empty() {
                    return Ok(Some(ParseEvent::Complete));
                }
                return Ok(Some(ParseEvent::Param(self.take_param())));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let available = cmp::min(usize::try_from(self.total - self.parsed).unwrap_or(usize::MAX), src.len());
            match src[..available].iter().position(|b| *b == b'&') {
                Some(end) => {
                    self.token.extend_from_slice(&src[..end]);
                    src.advance(end + 1);
                    self.parsed += (end + 1) as u64;
                    if !self.token.is_empty() {
                        return Ok(Some(ParseEvent::Param(self.take_param())));
                    }
                }
                None => {
                    self.token.extend_from_slice(&src[..available]);
                    src.advance(available);
                    self.parsed += available as u64;
                }
            }
        }
    }
}
