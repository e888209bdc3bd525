//! Pull based response content.
//!
//! A [`ContentSource`] is asked for more bytes whenever the transport has
//! room. It writes into the buffer it is handed and reports how much it
//! produced, or [`Fill::TryAgain`] when nothing is ready yet.

use bytes::Bytes;
use std::fmt;
use std::io::{ErrorKind, Read};
use tracing::{trace, warn};

/// Outcome of one [`ContentSource::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// `n` bytes were written to the start of the buffer. `Ready(0)` ends the
    /// content.
    Ready(usize),
    /// No data right now; ask again on the next ack or poll.
    TryAgain,
}

/// Producer of response content.
pub trait ContentSource: Send {
    /// Writes at most `buf.len()` bytes. `written` is the number of content
    /// bytes this source produced so far.
    fn fill(&mut self, buf: &mut [u8], written: usize) -> Fill;

    /// A source that could not be set up (a file that failed to open, for
    /// example) is answered with a 500 instead.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Content held in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ContentSource for BytesSource {
    fn fill(&mut self, buf: &mut [u8], written: usize) -> Fill {
        let rest = self.data.get(written..).unwrap_or_default();
        let len = rest.len().min(buf.len());
        buf[..len].copy_from_slice(&rest[..len]);
        Fill::Ready(len)
    }
}

/// Content streamed from a blocking-free reader such as an open file.
pub struct ReaderSource<R> {
    reader: Option<R>,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: Some(reader) }
    }

    /// Wraps the result of opening a reader; a failed open makes an invalid
    /// source.
    pub fn from_result(result: std::io::Result<R>) -> Self {
        match result {
            Ok(reader) => Self::new(reader),
            Err(e) => {
                warn!(cause = %e, "response reader could not be opened");
                Self { reader: None }
            }
        }
    }
}

impl<R> fmt::Debug for ReaderSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSource").field("valid", &self.reader.is_some()).finish()
    }
}

impl<R: Read + Send> ContentSource for ReaderSource<R> {
    fn fill(&mut self, buf: &mut [u8], _written: usize) -> Fill {
        let Some(reader) = self.reader.as_mut() else {
            return Fill::Ready(0);
        };

        match reader.read(buf) {
            Ok(len) => Fill::Ready(len),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                trace!("reader not ready");
                Fill::TryAgain
            }
            Err(e) => {
                warn!(cause = %e, "failed to read response content");
                Fill::Ready(0)
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.reader.is_some()
    }
}

/// Content produced by a closure with the same contract as
/// [`ContentSource::fill`].
pub struct CallbackSource<F> {
    callback: F,
}

impl<F> CallbackSource<F>
where
    F: FnMut(&mut [u8], usize) -> Fill + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> fmt::Debug for CallbackSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSource").finish_non_exhaustive()
    }
}

impl<F> ContentSource for CallbackSource<F>
where
    F: FnMut(&mut [u8], usize) -> Fill + Send,
{
    fn fill(&mut self, buf: &mut [u8], written: usize) -> Fill {
        (self.callback)(buf, written)
    }
}
