//! Request decoder module
//!
//! [`RequestDecoder`] drives one request through its two phases: the line
//! based head, then the body strategy chosen from that head. It is fed
//! whatever bytes the transport delivered and may be called again with more
//! at any point, so a request split at any byte boundary decodes to the same
//! events as the request delivered in one piece.
//!
//! # Example
//!
//! ```
//! use ember_http::codec::RequestDecoder;
//! use ember_http::protocol::ParseEvent;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET /status HTTP/1.1\r\n\r\n");
//!
//! assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_head());
//! assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(ParseEvent::Complete));
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::head_decoder::HeadDecoder;
use crate::protocol::{ParseError, ParseEvent};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for one request: head first, then body.
///
/// # State Machine
///
/// - `Head`: reading the request line and headers
/// - `Body`: the head was emitted, decoding the body it announced
/// - `Done`: the request completed or failed; further input is ignored
#[derive(Debug)]
pub struct RequestDecoder {
    state: State,
}

#[derive(Debug)]
enum State {
    Head(HeadDecoder),
    Body(PayloadDecoder),
    Done,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether the request was fully read, or decoding gave up.
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { state: State::Head(HeadDecoder::new()) }
    }
}

impl Decoder for RequestDecoder {
    type Item = ParseEvent;
    type Error = ParseError;

    /// # Returns
    ///
    /// - `Ok(Some(ParseEvent::Head(_)))` once the head is complete
    /// - `Ok(Some(_))` body params, bytes or upload pieces as they arrive
    /// - `Ok(Some(ParseEvent::Complete))` once, when the request has been read
    /// - `Ok(None)` when more data is needed, or after completion
    /// - `Err(_)` on malformed input; the decoder is done afterwards
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let result = match &mut self.state {
            State::Head(head_decoder) => match head_decoder.decode(src) {
                Ok(Some(head)) => {
                    self.state = State::Body(PayloadDecoder::for_head(&head));
                    return Ok(Some(ParseEvent::Head(Box::new(head))));
                }
                other => other.map(|_| None),
            },
            State::Body(payload_decoder) => payload_decoder.decode(src),
            State::Done => return Ok(None),
        };

        if matches!(result, Err(_) | Ok(Some(ParseEvent::Complete))) {
            self.state = State::Done;
        }
        result
    }
}
