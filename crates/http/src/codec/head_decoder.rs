//! Line based decoder for the request line and headers.
//!
//! Lines end at `\n`; a trailing `\r` and surrounding whitespace are
//! dropped. A line only counts once its terminator has arrived, so the head
//! may be split across reads at any byte. Parsing stops at the empty line
//! that closes the head; the body bytes after it are left in the buffer.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum head size: 8KB
//!
//! Header lines without a `:` are dropped instead of failing the request.

use bytes::BytesMut;
use http::{Method, Version};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{Authorization, ConnectionKind, Header, Param, ParseError, RequestHead};
use crate::utils::{parse_leading_u64, url_decode};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the request line plus headers
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Incremental decoder producing a [`RequestHead`].
#[derive(Debug, Default)]
pub struct HeadDecoder {
    head: RequestHead,
    request_line_seen: bool,
    /// Bytes of complete lines consumed so far
    consumed: usize,
}

impl HeadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        ensure!(!line.is_empty(), ParseError::invalid_request_line("empty request line"));

        let mut parts = line.split_whitespace();
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::invalid_request_line(line));
        };

        self.head.method = parse_method(method)?;
        self.head.version = if version == "HTTP/1.0" { Version::HTTP_10 } else { Version::HTTP_11 };

        let (path, query) = match target.split_once('?') {
            Some((path, query)) if !path.is_empty() => (path, Some(query)),
            _ => (target, None),
        };
        self.head.url = url_decode(path).into_owned();
        if let Some(query) = query {
            add_query_params(&mut self.head, query);
        }

        trace!(method = %self.head.method, url = %self.head.url, "parsed request line");
        Ok(())
    }

    fn parse_header(&mut self, line: &str) -> Result<(), ParseError> {
        let Some((name, value)) = line.split_once(':') else {
            trace!(line, "discarding header line without separator");
            return Ok(());
        };
        ensure!(self.head.headers.len() < MAX_HEADER_NUM, ParseError::too_many_headers(MAX_HEADER_NUM));

        let (name, value) = (name.trim(), value.trim());
        ensure!(!name.is_empty(), ParseError::invalid_header(line));
        let head = &mut self.head;

        if name.eq_ignore_ascii_case("Host") {
            head.host = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Content-Type") {
            let (mime, params) = value.split_once(';').unwrap_or((value, ""));
            head.content_type = Some(mime.trim().to_string());
            if starts_with_ignore_case(mime, "multipart/") {
                head.boundary = boundary_of(params);
            }
        } else if name.eq_ignore_ascii_case("Content-Length") {
            head.content_length = parse_leading_u64(value);
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
            head.chunked = value.to_ascii_lowercase().split(',').any(|coding| coding.trim() == "chunked");
        } else if name.eq_ignore_ascii_case("Expect") {
            head.expect_continue = value.eq_ignore_ascii_case("100-continue");
        } else if name.eq_ignore_ascii_case("Authorization") {
            head.authorization = parse_authorization(value);
        } else if name.eq_ignore_ascii_case("Upgrade") && value.eq_ignore_ascii_case("websocket") {
            head.kind = ConnectionKind::WebSocket;
        } else if name.eq_ignore_ascii_case("Accept") && value.to_ascii_lowercase().contains("text/event-stream") {
            head.kind = ConnectionKind::EventStream;
        }

        head.push_header(Header::new(name, value));
        Ok(())
    }
}

fn parse_method(method: &str) -> Result<Method, ParseError> {
    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "DELETE" => Method::DELETE,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "HEAD" => Method::HEAD,
        "OPTIONS" => Method::OPTIONS,
        other => return Err(ParseError::unsupported_method(other)),
    };
    Ok(method)
}

fn add_query_params(head: &mut RequestHead, query: &str) {
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        head.add_param(Param::query(url_decode(name), url_decode(value)));
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn boundary_of(params: &str) -> Option<String> {
    params
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().replace('"', ""))
        .filter(|boundary| !boundary.is_empty())
}

fn parse_authorization(value: &str) -> Option<Authorization> {
    let (scheme, credentials) = value.split_once(' ')?;
    let credentials = credentials.trim().to_string();
    if scheme.eq_ignore_ascii_case("Basic") {
        Some(Authorization::Basic(credentials))
    } else if scheme.eq_ignore_ascii_case("Digest") {
        Some(Authorization::Digest(credentials))
    } else {
        None
    }
}

impl Decoder for HeadDecoder {
    type Item = RequestHead;
    type Error = ParseError;

    /// # Returns
    ///
    /// - `Ok(Some(head))` once the empty line closing the head was consumed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` on a malformed request line, an unknown method or
    ///   when a limit is exceeded
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|b| *b == b'\n') else {
                let pending = self.consumed + src.len();
                ensure!(pending <= MAX_HEADER_BYTES, ParseError::head_too_large(pending, MAX_HEADER_BYTES));
                return Ok(None);
            };

            self.consumed += end + 1;
            ensure!(
                self.consumed <= MAX_HEADER_BYTES,
                ParseError::head_too_large(self.consumed, MAX_HEADER_BYTES)
            );

            let raw = src.split_to(end + 1);
            let text = String::from_utf8_lossy(&raw[..end]);
            let line = text.trim();

            if !self.request_line_seen {
                self.parse_request_line(line)?;
                self.request_line_seen = true;
                continue;
            }

            if line.is_empty() {
                trace!(size = self.consumed, headers = self.head.headers.len(), "parsed request head");
                let head = std::mem::take(&mut self.head);
                *self = Self::new();
                return Ok(Some(head));
            }

            self.parse_header(line)?;
        }
    }
}
