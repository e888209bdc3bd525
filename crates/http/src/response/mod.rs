//! Response pipeline
//!
//! A [`Response`] is built by handler code, handed to its
//! [`Request`](crate::connection::Request) and then streamed out under ack
//! based flow control:
//!
//! - `respond` assembles the head and writes as much of it (and of the
//!   content) as the transport has room for
//! - every acknowledgment of earlier bytes lets it write more
//! - once everything was written and acknowledged the response ends
//!
//! Content comes from a single [`ContentSource`] abstraction. Fixed-length,
//! unframed and chunked responses share the same state machine; they differ
//! only in how the bytes a source produced are framed.
//!
//! # State Machine
//!
//! ```text
//! Setup -> Headers -> Content -> WaitAck -> End
//!   \         \          \
//!    +---------+----------+-----> Failed
//! ```
//!
//! `End` and `Failed` are terminal and never left again.

mod source;

pub use source::BytesSource;
pub use source::CallbackSource;
pub use source::ContentSource;
pub use source::Fill;
pub use source::ReaderSource;

use crate::codec::{ChunkEncoder, MIN_CHUNK_SPACE, framing_len};
use crate::connection::Upgrade;
use crate::ensure;
use crate::protocol::{DefaultHeaders, Header, SendError};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use tokio_util::codec::Encoder;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseState {
    /// Still being configured by the handler.
    Setup,
    /// Head is being written.
    Headers,
    /// Content is being written.
    Content,
    /// Everything was written, waiting for the last acknowledgments.
    WaitAck,
    End,
    Failed,
}

impl ResponseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResponseState::End | ResponseState::Failed)
    }
}

/// One outbound reply.
pub struct Response {
    code: StatusCode,
    content_type: Option<String>,
    content_length: Option<u64>,
    chunked: bool,
    headers: Vec<Header>,
    default_headers: Arc<DefaultHeaders>,
    source: Option<Box<dyn ContentSource>>,
    upgrade: Option<Box<dyn Upgrade>>,

    state: ResponseState,
    head: Bytes,
    head_written: usize,
    /// Content bytes produced by the source, framing excluded.
    written: usize,
    /// Bytes queued on the transport, head and framing included.
    sent: u64,
    acked: u64,
    unflushed: bool,
    encoder: ChunkEncoder,
    scratch: Vec<u8>,
}

impl Response {
    /// An empty response (`Content-Length: 0`) starting with `default_headers`.
    pub fn new(code: StatusCode, default_headers: Arc<DefaultHeaders>) -> Self {
        Self {
            code,
            content_type: None,
            content_length: Some(0),
            chunked: false,
            headers: Vec::new(),
            default_headers,
            source: None,
            upgrade: None,
            state: ResponseState::Setup,
            head: Bytes::new(),
            head_written: 0,
            written: 0,
            sent: 0,
            acked: 0,
            unflushed: false,
            encoder: ChunkEncoder::new(),
            scratch: Vec::new(),
        }
    }

    /// A response carrying `content` with its length declared.
    pub fn with_bytes(code: StatusCode, default_headers: Arc<DefaultHeaders>, content: impl Into<Bytes>) -> Self {
        let source = BytesSource::new(content);
        let mut response = Self::new(code, default_headers);
        response.content_length = Some(source.len() as u64);
        response.source = Some(Box::new(source));
        response
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn set_code(&mut self, code: StatusCode) {
        if self.state == ResponseState::Setup {
            self.code = code;
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn set_content_length(&mut self, len: u64) {
        if self.state == ResponseState::Setup && !self.chunked {
            self.content_length = Some(len);
        }
    }

    /// Streams the content until the source ends it; the connection is closed
    /// afterwards since nothing delimits the body.
    pub fn set_unknown_length(&mut self) {
        if self.state == ResponseState::Setup {
            self.content_length = None;
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|h| h.is(name)).map(Header::value)
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Frames the content with chunked transfer encoding. Only takes effect
    /// before the response started.
    pub fn set_chunked(&mut self, chunked: bool) {
        if self.state == ResponseState::Setup {
            self.chunked = chunked;
            if chunked {
                self.content_length = None;
            }
        }
    }

    pub fn set_source(&mut self, source: impl ContentSource + 'static) {
        self.source = Some(Box::new(source));
    }

    pub fn is_source_valid(&self) -> bool {
        self.source.as_ref().is_none_or(|source| source.is_valid())
    }

    /// Hands the connection over to `upgrade` once this response's head has
    /// been acknowledged. An upgrading response has no declared length and
    /// does not ask the peer to close.
    pub fn set_upgrade(&mut self, upgrade: Box<dyn Upgrade>) {
        if self.state == ResponseState::Setup {
            self.upgrade = Some(upgrade);
            self.content_length = None;
            self.chunked = false;
        }
    }

    pub fn is_upgrade(&self) -> bool {
        self.upgrade.is_some()
    }

    pub(crate) fn take_upgrade(&mut self) -> Option<Box<dyn Upgrade>> {
        self.upgrade.take()
    }

    /// Whether the peer can tell where the content ends without the
    /// connection closing.
    pub fn is_length_framed(&self) -> bool {
        self.chunked || self.content_length.is_some()
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn started(&self) -> bool {
        self.state != ResponseState::Setup
    }

    pub fn finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn failed(&self) -> bool {
        self.state == ResponseState::Failed
    }

    /// Status line and headers for an `HTTP/1.<minor_version>` peer.
    pub fn assemble_head(&self, minor_version: u8) -> String {
        let mut head = format!(
            "HTTP/1.{minor_version} {} {}\r\n",
            self.code.as_u16(),
            self.code.canonical_reason().unwrap_or_default()
        );

        let mut push = |name: &str, value: &str| {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        };

        if minor_version > 0 {
            push("Accept-Ranges", "none");
            if self.chunked {
                push("Transfer-Encoding", "chunked");
            }
        }
        if let Some(len) = self.content_length.filter(|_| !self.chunked) {
            push("Content-Length", &len.to_string());
        }
        if let Some(content_type) = &self.content_type {
            push("Content-Type", content_type);
        }
        for header in self.default_headers.iter().chain(&self.headers) {
            push(header.name(), header.value());
        }

        head.push_str("\r\n");
        head
    }

    /// Starts sending: the head is fixed and written together with as much
    /// content as fits. Nothing happens if the response already started.
    pub(crate) fn respond(&mut self, transport: &mut dyn Transport, minor_version: u8) -> Result<(), SendError> {
        if self.state != ResponseState::Setup {
            return Ok(());
        }

        if self.upgrade.is_none() {
            self.add_header("Connection", "close");
        }
        if self.chunked && minor_version == 0 {
            self.chunked = false;
        }

        self.head = Bytes::from(self.assemble_head(minor_version));
        debug!(code = self.code.as_u16(), head_len = self.head.len(), chunked = self.chunked, "sending response");
        self.set_state(ResponseState::Headers);
        self.advance(transport)
    }

    /// Reacts to `len` acknowledged bytes by writing more, if there is more.
    /// An ack of zero is a plain retry.
    pub(crate) fn ack(&mut self, transport: &mut dyn Transport, len: usize) -> Result<(), SendError> {
        if !self.started() || self.finished() {
            return Ok(());
        }

        self.acked += len as u64;
        trace!(len, acked = self.acked, sent = self.sent, "response ack");
        self.advance(transport)
    }

    pub(crate) fn fail(&mut self) {
        self.set_state(ResponseState::Failed);
    }

    fn set_state(&mut self, state: ResponseState) {
        if self.state.is_terminal() || self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "response state");
        self.state = state;
    }

    fn has_content(&self) -> bool {
        self.source.is_some() && self.content_length != Some(0)
    }

    fn advance(&mut self, transport: &mut dyn Transport) -> Result<(), SendError> {
        let result = self.step(transport);
        if self.unflushed && transport.can_send() {
            transport.send();
            self.unflushed = false;
        }
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn step(&mut self, transport: &mut dyn Transport) -> Result<(), SendError> {
        if self.state == ResponseState::Headers {
            self.write_head(transport)?;
            if self.head_written < self.head.len() {
                return Ok(());
            }
            let next = if self.has_content() { ResponseState::Content } else { ResponseState::WaitAck };
            self.set_state(next);
        }

        if self.state == ResponseState::Content {
            self.write_content(transport)?;
        }

        if self.state == ResponseState::WaitAck && self.acked >= self.sent {
            self.set_state(ResponseState::End);
        }
        Ok(())
    }

    fn write_head(&mut self, transport: &mut dyn Transport) -> Result<(), SendError> {
        let rest = &self.head[self.head_written..];
        let len = rest.len().min(transport.space());
        if len == 0 {
            return Ok(());
        }

        self.sent += add_all(transport, &rest[..len])? as u64;
        self.head_written += len;
        self.unflushed = true;
        trace!(written = self.head_written, total = self.head.len(), "wrote response head");
        Ok(())
    }

    fn write_content(&mut self, transport: &mut dyn Transport) -> Result<(), SendError> {
        if self.chunked {
            return self.write_chunk(transport);
        }

        let remaining = match self.content_length {
            Some(len) => usize::try_from(len.saturating_sub(self.written as u64)).unwrap_or(usize::MAX),
            None => usize::MAX,
        };
        if remaining == 0 {
            self.set_state(ResponseState::WaitAck);
            return Ok(());
        }

        let capacity = remaining.min(transport.space());
        if capacity == 0 {
            return Ok(());
        }

        let Some(len) = self.fill(capacity)? else {
            return Ok(());
        };

        if len == 0 {
            ensure!(
                self.content_length.is_none(),
                SendError::invalid_content(format!("content ended after {} of {remaining} remaining bytes", self.written))
            );
            self.set_state(ResponseState::WaitAck);
            return Ok(());
        }

        self.sent += add_all(transport, &self.scratch[..len])? as u64;
        self.written += len;
        self.unflushed = true;
        if len == remaining {
            self.set_state(ResponseState::WaitAck);
        }
        Ok(())
    }

    fn write_chunk(&mut self, transport: &mut dyn Transport) -> Result<(), SendError> {
        let space = transport.space();
        if space <= MIN_CHUNK_SPACE {
            return Ok(());
        }

        let Some(len) = self.fill(ChunkEncoder::max_payload(space))? else {
            return Ok(());
        };

        let mut frame = BytesMut::with_capacity(len + framing_len(len));
        self.encoder.encode(&self.scratch[..len], &mut frame)?;
        self.sent += add_all(transport, &frame)? as u64;
        self.written += len;
        self.unflushed = true;

        if self.encoder.is_eof() {
            self.set_state(ResponseState::WaitAck);
        }
        Ok(())
    }

    /// Asks the source for at most `capacity` bytes into the scratch buffer.
    /// `None` means the source is not ready.
    fn fill(&mut self, capacity: usize) -> Result<Option<usize>, SendError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(Some(0));
        };

        self.scratch.resize(capacity, 0);
        match source.fill(&mut self.scratch[..capacity], self.written) {
            Fill::TryAgain => {
                trace!(written = self.written, "content source not ready");
                Ok(None)
            }
            Fill::Ready(len) => {
                ensure!(len <= capacity, SendError::invalid_content(format!("source filled {len} of {capacity} bytes")));
                Ok(Some(len))
            }
        }
    }
}

/// Queues all of `data` or fails.
fn add_all(transport: &mut dyn Transport, data: &[u8]) -> Result<usize, SendError> {
    let accepted = transport.add(data);
    ensure!(accepted == data.len(), SendError::short_write(data.len(), accepted));
    Ok(accepted)
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.code)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("chunked", &self.chunked)
            .field("headers", &self.headers)
            .field("upgrade", &self.upgrade.is_some())
            .field("state", &self.state)
            .field("written", &self.written)
            .field("sent", &self.sent)
            .field("acked", &self.acked)
            .finish_non_exhaustive()
    }
}
