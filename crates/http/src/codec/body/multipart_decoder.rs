//! Decoder for `multipart/*` request bodies.
//!
//! The body is scanned one byte at a time so a delimiter may be split
//! anywhere across reads. While inside a part, a `\r` might start the
//! delimiter `\r\n--<boundary>`: the decoder tracks how much of it matched
//! and, on a mismatch, replays the matched prefix as ordinary part data.
//!
//! Parts carrying a `filename` or a `Content-Type` are uploads. Their bytes
//! are collected in a buffer of [`UPLOAD_BUFFER_SIZE`] bytes which is handed
//! out as an [`UploadChunk`] whenever it fills up or the available input runs
//! out, so an upload never needs more memory than that buffer. Other parts
//! become form parameters.

use std::collections::VecDeque;

use super::UPLOAD_BUFFER_SIZE;
use crate::ensure;
use crate::protocol::{Param, ParseError, ParseEvent, UploadChunk};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

/// Longest accepted header line inside a part.
const MAX_PART_HEADER_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The leading `--<boundary>\r\n`
    Preamble,
    /// Header lines of a part, up to the empty line
    PartHeaders,
    /// Part content
    Data,
    /// Saw `\r` inside the content
    DelimiterLf,
    /// Saw `\r\n`
    DelimiterDash1,
    /// Saw `\r\n-`
    DelimiterDash2,
    /// Matching the boundary after `\r\n--`
    Boundary,
    /// A full delimiter matched: `\r\n` opens the next part, `--` closes the body
    AfterBoundary,
    AfterBoundaryLf,
    /// Past the closing delimiter
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Part {
    name: String,
    filename: String,
    content_type: Option<String>,
    is_file: bool,
}

#[derive(Debug)]
pub struct MultipartDecoder {
    boundary: Vec<u8>,
    /// Declared body length, shrunk when the closing delimiter comes early
    total: u64,
    parsed: u64,
    state: State,
    boundary_pos: usize,
    line: Vec<u8>,
    part: Part,
    item_size: u64,
    item_value: Vec<u8>,
    upload: BytesMut,
    pending: VecDeque<ParseEvent>,
    complete: bool,
}

impl MultipartDecoder {
    pub fn new(boundary: &str, total: u64) -> Self {
        Self {
            boundary: boundary.as_bytes().to_vec(),
            total,
            parsed: 0,
            state: State::Preamble,
            boundary_pos: 0,
            line: Vec::new(),
            part: Part::default(),
            item_size: 0,
            item_value: Vec::new(),
            upload: BytesMut::with_capacity(UPLOAD_BUFFER_SIZE),
            pending: VecDeque::new(),
            complete: false,
        }
    }

    fn consume(&mut self, byte: u8) -> Result<(), ParseError> {
        match self.state {
            State::Preamble => self.consume_preamble(byte)?,
            State::PartHeaders => match byte {
                b'\n' if self.line.is_empty() => self.start_item(),
                b'\n' => self.parse_part_header(),
                b'\r' => {}
                _ => {
                    self.line.push(byte);
                    ensure!(
                        self.line.len() <= MAX_PART_HEADER_BYTES,
                        ParseError::invalid_multipart("part header line too long")
                    );
                }
            },
            State::Data => {
                if byte == b'\r' {
                    self.state = State::DelimiterLf;
                } else {
                    self.write_item_byte(byte);
                }
            }
            State::DelimiterLf if byte == b'\n' => self.state = State::DelimiterDash1,
            State::DelimiterDash1 if byte == b'-' => self.state = State::DelimiterDash2,
            State::DelimiterDash2 if byte == b'-' => {
                self.state = State::Boundary;
                self.boundary_pos = 0;
            }
            State::DelimiterLf | State::DelimiterDash1 | State::DelimiterDash2 => {
                let matched = match self.state {
                    State::DelimiterLf => 1,
                    State::DelimiterDash1 => 2,
                    _ => 3,
                };
                self.replay_delimiter(matched, 0);
                return self.consume(byte);
            }
            State::Boundary => {
                if self.boundary[self.boundary_pos] != byte {
                    self.replay_delimiter(4, self.boundary_pos);
                    return self.consume(byte);
                }
                if self.boundary_pos + 1 == self.boundary.len() {
                    self.state = State::AfterBoundary;
                    self.finish_item();
                } else {
                    self.boundary_pos += 1;
                }
            }
            State::AfterBoundary => match byte {
                b'\r' => self.state = State::AfterBoundaryLf,
                b'-' => {
                    // closing `--\r\n` ends the body early, never later than declared
                    let end = self.parsed + 4;
                    if end < self.total {
                        debug!(declared = self.total, actual = end, "multipart body ends before its declared length");
                        self.total = end;
                    }
                    self.state = State::Finished;
                }
                _ => return Err(ParseError::invalid_multipart("unexpected byte after boundary")),
            },
            State::AfterBoundaryLf => {
                ensure!(byte == b'\n', ParseError::invalid_multipart("missing LF after boundary"));
                self.state = State::PartHeaders;
                self.part = Part::default();
            }
            State::Finished => {}
        }
        Ok(())
    }

    fn consume_preamble(&mut self, byte: u8) -> Result<(), ParseError> {
        ensure!(!self.boundary.is_empty(), ParseError::invalid_multipart("empty boundary"));
        let blen = self.boundary.len() as u64;
        let pos = self.parsed;
        let expected = match pos {
            0 | 1 => b'-',
            p if p < blen + 2 => self.boundary[usize::try_from(p - 2).unwrap_or(usize::MAX)],
            p if p == blen + 2 => b'\r',
            _ => b'\n',
        };
        ensure!(byte == expected, ParseError::invalid_multipart("body does not start with the boundary"));

        if pos == blen + 3 {
            self.state = State::PartHeaders;
            self.part = Part::default();
        }
        Ok(())
    }

    /// Hands a partially matched delimiter back to the part content: the first
    /// `matched` bytes of `\r\n--` followed by `boundary_len` boundary bytes.
    fn replay_delimiter(&mut self, matched: usize, boundary_len: usize) {
        self.state = State::Data;
        for i in 0..matched {
            self.write_item_byte(b"\r\n--"[i]);
        }
        for i in 0..boundary_len {
            let byte = self.boundary[i];
            self.write_item_byte(byte);
        }
    }

    fn parse_part_header(&mut self) {
        let line = std::mem::take(&mut self.line);
        let text = String::from_utf8_lossy(&line);
        let Some((name, value)) = text.split_once(':') else {
            trace!(line = %text, "discarding part header without separator");
            return;
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("Content-Type") {
            self.part.content_type = Some(value.to_string());
            self.part.is_file = true;
        } else if name.eq_ignore_ascii_case("Content-Disposition") {
            for attribute in value.split(';').skip(1) {
                let Some((key, val)) = attribute.split_once('=') else { continue };
                let val = val.trim().trim_matches('"');
                match key.trim() {
                    "name" => self.part.name = val.to_string(),
                    "filename" => {
                        self.part.filename = val.to_string();
                        self.part.is_file = true;
                    }
                    _ => {}
                }
            }
        }
    }

    fn start_item(&mut self) {
        self.state = State::Data;
        self.item_size = 0;
        self.item_value.clear();
        self.upload.clear();
    }

    fn write_item_byte(&mut self, byte: u8) {
        self.item_size += 1;
        if self.part.is_file {
            self.upload.put_u8(byte);
            if self.upload.len() == UPLOAD_BUFFER_SIZE {
                self.flush_upload(false);
            }
        } else {
            self.item_value.push(byte);
        }
    }

    fn flush_upload(&mut self, last: bool) {
        let data = self.upload.split().freeze();
        let chunk = UploadChunk {
            name: self.part.name.clone(),
            filename: self.part.filename.clone(),
            content_type: self.part.content_type.clone(),
            index: self.item_size - data.len() as u64,
            data,
            last,
        };
        self.pending.push_back(ParseEvent::Upload(chunk));
    }

    fn finish_item(&mut self) {
        if !self.part.is_file {
            let value = String::from_utf8_lossy(&self.item_value).into_owned();
            self.item_value.clear();
            self.pending.push_back(ParseEvent::Param(Param::form(self.part.name.clone(), value)));
        } else {
            self.flush_upload(true);
            let param = Param::file(self.part.name.clone(), self.part.filename.clone(), self.item_size);
            self.pending.push_back(ParseEvent::Param(param));
        }
    }
}

impl Decoder for MultipartDecoder {
    type Item = ParseEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            if self.complete {
                return Ok(Some(ParseEvent::Complete));
            }

            if self.parsed >= self.total {
                if self.state != State::Finished {
                    debug!(state = ?self.state, "multipart body ended without closing delimiter");
                }
                self.complete = true;
                continue;
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut consumed = 0;
            while consumed < src.len() && self.parsed < self.total {
                let byte = src[consumed];
                self.consume(byte)?;
                consumed += 1;
                self.parsed += 1;
            }
            src.advance(consumed);

            // the input is drained, hand out what the upload buffer holds so far
            if self.state == State::Data && self.part.is_file && !self.upload.is_empty() {
                self.flush_upload(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const BOUNDARY: &str = "----ember42";

    fn body() -> String {
        indoc! {"
            ------ember42\r
            Content-Disposition: form-data; name=\"ssid\"\r
            \r
            home-net\r
            ------ember42\r
            Content-Disposition: form-data; name=\"firmware\"; filename=\"fw.bin\"\r
            Content-Type: application/octet-stream\r
            \r
            AB\r
            -CD\r
            ------ember42--\r
        "}
        .to_string()
    }

    fn run(decoder: &mut MultipartDecoder, fragments: &[&[u8]]) -> Vec<ParseEvent> {
        let mut buffer = BytesMut::new();
        let mut events = Vec::new();
        for fragment in fragments {
            buffer.extend_from_slice(fragment);
            while let Some(event) = decoder.decode(&mut buffer).unwrap() {
                let complete = event.is_complete();
                events.push(event);
                if complete {
                    return events;
                }
            }
        }
        events
    }

    fn uploaded(events: &[ParseEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Upload(chunk) => Some(chunk.data.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn params(events: &[ParseEvent]) -> Vec<Param> {
        events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Param(param) => Some(param.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fields_and_upload() {
        let body = body();
        let mut decoder = MultipartDecoder::new(BOUNDARY, body.len() as u64);
        let events = run(&mut decoder, &[body.as_bytes()]);

        assert_eq!(events.last(), Some(&ParseEvent::Complete));
        assert_eq!(uploaded(&events), b"AB\r\n-CD");
        assert_eq!(
            params(&events),
            vec![Param::form("ssid", "home-net"), Param::file("firmware", "fw.bin", 7)]
        );

        let last_upload = events
            .iter()
            .rev()
            .find_map(|e| match e {
                ParseEvent::Upload(chunk) => Some(chunk),
                _ => None,
            })
            .unwrap();
        assert!(last_upload.last);
        assert_eq!(last_upload.filename, "fw.bin");
        assert_eq!(last_upload.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn test_byte_by_byte_matches_whole() {
        let body = body();
        let fragments: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        let mut decoder = MultipartDecoder::new(BOUNDARY, body.len() as u64);
        let events = run(&mut decoder, &fragments);

        assert_eq!(events.last(), Some(&ParseEvent::Complete));
        assert_eq!(uploaded(&events), b"AB\r\n-CD");
        assert_eq!(
            params(&events),
            vec![Param::form("ssid", "home-net"), Param::file("firmware", "fw.bin", 7)]
        );

        let mut expected_index = 0;
        for event in &events {
            if let ParseEvent::Upload(chunk) = event {
                assert_eq!(chunk.index, expected_index);
                expected_index += chunk.data.len() as u64;
            }
        }
    }

    #[test]
    fn test_large_upload_is_flushed_in_buffer_sized_pieces() {
        let payload = vec![b'x'; UPLOAD_BUFFER_SIZE * 2 + 10];
        let mut body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"big\"\r\n\r\n".to_vec();
        body.extend_from_slice(&payload);
        body.extend_from_slice(b"\r\n--b--\r\n");

        let mut decoder = MultipartDecoder::new("b", body.len() as u64);
        let events = run(&mut decoder, &[&body]);

        let sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Upload(chunk) => Some(chunk.data.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![UPLOAD_BUFFER_SIZE, UPLOAD_BUFFER_SIZE, 10]);
        assert_eq!(params(&events), vec![Param::file("f", "big", payload.len() as u64)]);
    }

    #[test]
    fn test_early_closing_delimiter_completes() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--b--\r\n";
        let mut decoder = MultipartDecoder::new("b", body.len() as u64 + 100);
        let events = run(&mut decoder, &[&body[..]]);

        assert_eq!(params(&events), vec![Param::form("a", "1")]);
        assert_eq!(events.last(), Some(&ParseEvent::Complete));
    }

    #[test]
    fn test_closing_delimiter_without_trailing_crlf() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--b--";
        let mut decoder = MultipartDecoder::new("b", body.len() as u64);
        let events = run(&mut decoder, &[&body[..]]);

        assert_eq!(events, vec![ParseEvent::Param(Param::form("a", "1")), ParseEvent::Complete]);
    }

    #[test]
    fn test_empty_upload_is_reported() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"empty.txt\"\r\n\r\n\r\n--b--\r\n";
        let mut decoder = MultipartDecoder::new("b", body.len() as u64);
        let events = run(&mut decoder, &[&body[..]]);

        let chunks: Vec<&UploadChunk> = events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Upload(chunk) => Some(chunk),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].last);
        assert!(chunks[0].data.is_empty());
        assert_eq!(params(&events), vec![Param::file("f", "empty.txt", 0)]);
        assert_eq!(events.last(), Some(&ParseEvent::Complete));
    }

    #[test]
    fn test_empty_boundary_is_an_error() {
        let mut decoder = MultipartDecoder::new("", 64);
        let mut buffer = BytesMut::from(&b"--\r\n\r\n1\r\n--\r\n"[..]);
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidMultipart { .. })));
    }

    #[test]
    fn test_wrong_boundary_is_an_error() {
        let mut decoder = MultipartDecoder::new("b", 64);
        let mut buffer = BytesMut::from(&b"--x\r\n"[..]);
        assert!(decoder.decode(&mut buffer).is_err());
    }
}
