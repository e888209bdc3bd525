//! Handler traits
//!
//! A [`Dispatcher`] decides which [`Handler`] serves a request once its head
//! has been parsed. The handler then sees the body as it streams in
//! (`handle_body`, `handle_upload`) and answers from `handle_request`, which
//! runs when the whole request has been read.
//!
//! Every callback runs synchronously on the engine task and must not block.

use crate::connection::{ANY_HEADER, Request};
use crate::protocol::{BodyChunk, RequestHead, UploadChunk};
use http::StatusCode;
use std::sync::Arc;
use tracing::trace;

pub trait Handler: Send + Sync {
    /// Cheap pre-check run before [`Handler::can_handle`].
    fn filter(&self, _request: &Request) -> bool {
        true
    }

    /// Whether this handler serves `request`. May mark headers as interesting
    /// or record path captures on the request.
    fn can_handle(&self, _request: &mut Request) -> bool {
        false
    }

    /// Answers a completely read request.
    fn handle_request(&self, request: &mut Request);

    fn handle_upload(&self, _request: &mut Request, chunk: UploadChunk) {
        trace!(filename = %chunk.filename, len = chunk.data.len(), "upload ignored");
    }

    fn handle_body(&self, _request: &mut Request, chunk: BodyChunk) {
        trace!(index = chunk.index, len = chunk.data.len(), "body ignored");
    }
}

/// Routes parsed request heads to handlers.
pub trait Dispatcher: Send + Sync {
    /// Adjusts the head before any handler is consulted.
    fn rewrite(&self, _head: &mut RequestHead) {}

    /// Picks the handler for `request`; `None` answers with 501.
    fn attach(&self, request: &mut Request) -> Option<Arc<dyn Handler>>;
}

/// A [`Handler`] answering every request with a closure.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut Request) + Send + Sync,
{
    fn can_handle(&self, _request: &mut Request) -> bool {
        true
    }

    fn handle_request(&self, request: &mut Request) {
        (self.f)(request);
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut Request) + Send + Sync,
{
    HandlerFn { f }
}

/// Serves the requests one handler accepts, keeping all headers.
impl<H: Handler + 'static> Dispatcher for Arc<H> {
    fn attach(&self, request: &mut Request) -> Option<Arc<dyn Handler>> {
        request.add_interesting_header(ANY_HEADER);
        if !self.filter(request) || !self.can_handle(request) {
            return None;
        }
        Some(Arc::clone(self) as Arc<dyn Handler>)
    }
}

/// Answers every request with a fixed status.
#[derive(Debug, Clone, Copy)]
pub struct StatusHandler(pub StatusCode);

impl Handler for StatusHandler {
    fn can_handle(&self, _request: &mut Request) -> bool {
        true
    }

    fn handle_request(&self, request: &mut Request) {
        request.send_status(self.0);
    }
}
