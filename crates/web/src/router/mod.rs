//! Request routing
//!
//! [`Router`] is the [`Dispatcher`] of a server. For every parsed request
//! head it
//!
//! 1. applies every matching [`Rewrite`], in registration order
//! 2. attaches the first handler whose filter passes and which accepts the
//!    request, in registration order
//! 3. falls back to the catch-all handler otherwise, which answers with the
//!    not-found callback or a plain 404
//!
//! # Examples
//!
//! ```
//! use ember_web::router::{Rewrite, Router, get, post};
//! use http::StatusCode;
//!
//! let router = Router::builder()
//!     .rewrite(Rewrite::new("/", "/index.html"))
//!     .route("/index.html", get(|request| request.send_text(StatusCode::OK, "text/html", "<h1>ember</h1>")))
//!     .route("/led/{id}", post(|request| {
//!         let led = request.path_arg(0).unwrap_or_default().to_string();
//!         request.send_text(StatusCode::OK, "text/plain", led);
//!     }))
//!     .build()
//!     .unwrap();
//! ```

mod callback;
pub mod filter;
mod method;
mod pattern;

pub use callback::CallbackHandler;
pub use callback::RouteBuilder;
pub use callback::{any, delete, get, head, options, patch, post, put};
pub use method::MethodSet;

use callback::{BodyCallback, RequestCallback, UploadCallback};
use ember_http::connection::{ANY_HEADER, Request};
use ember_http::handler::{Dispatcher, Handler};
use ember_http::protocol::{BodyChunk, Param, RequestHead, UploadChunk};
use ember_http::url_decode;
use filter::Filter;
use http::StatusCode;
use pattern::UrlPattern;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },
}

impl RouterError {
    pub fn invalid_pattern(pattern: &str, source: matchit::InsertError) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), source }
    }
}

/// Replaces the url `from` with `to` before routing.
///
/// A query part of `to` is added to the request's query parameters.
pub struct Rewrite {
    from: String,
    to: String,
    params: Option<String>,
    filter: Option<Box<dyn Filter>>,
}

impl Rewrite {
    pub fn new(from: impl Into<String>, to: &str) -> Self {
        let (to, params) = match to.split_once('?') {
            Some((path, params)) => (path.to_string(), Some(params.to_string())),
            None => (to.to_string(), None),
        };
        Self { from: from.into(), to, params, filter: None }
    }

    #[must_use]
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn from_url(&self) -> &str {
        &self.from
    }

    pub fn to_url(&self) -> &str {
        &self.to
    }

    pub fn params(&self) -> Option<&str> {
        self.params.as_deref()
    }

    pub fn matches(&self, head: &RequestHead) -> bool {
        head.url() == self.from && self.filter.as_ref().is_none_or(|filter| filter.matches(head))
    }

    fn apply(&self, head: &mut RequestHead) {
        trace!(from = %self.from, to = %self.to, "rewriting url");
        head.set_url(self.to.as_str());

        let Some(params) = &self.params else { return };
        for pair in params.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            head.add_param(Param::query(url_decode(name), url_decode(value)));
        }
    }
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewrite")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("params", &self.params)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Serves whatever no other handler accepted.
#[derive(Default)]
struct CatchAll {
    not_found: Option<RequestCallback>,
    on_upload: Option<UploadCallback>,
    on_body: Option<BodyCallback>,
}

impl Handler for CatchAll {
    fn can_handle(&self, _request: &mut Request) -> bool {
        true
    }

    fn handle_request(&self, request: &mut Request) {
        match &self.not_found {
            Some(not_found) => not_found(request),
            None => request.send_status(StatusCode::NOT_FOUND),
        }
    }

    fn handle_upload(&self, request: &mut Request, chunk: UploadChunk) {
        if let Some(on_upload) = &self.on_upload {
            on_upload(request, chunk);
        }
    }

    fn handle_body(&self, request: &mut Request, chunk: BodyChunk) {
        if let Some(on_body) = &self.on_body {
            on_body(request, chunk);
        }
    }
}

pub struct Router {
    rewrites: Vec<Rewrite>,
    handlers: Vec<Arc<dyn Handler>>,
    catch_all: Arc<CatchAll>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn rewrites(&self) -> &[Rewrite] {
        &self.rewrites
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Dispatcher for Router {
    fn rewrite(&self, head: &mut RequestHead) {
        for rewrite in &self.rewrites {
            if rewrite.matches(head) {
                rewrite.apply(head);
            }
        }
    }

    fn attach(&self, request: &mut Request) -> Option<Arc<dyn Handler>> {
        for handler in &self.handlers {
            if handler.filter(request) && handler.can_handle(request) {
                return Some(Arc::clone(handler));
            }
        }

        debug!(method = %request.method(), url = request.url(), "no route, using catch-all handler");
        request.add_interesting_header(ANY_HEADER);
        Some(Arc::clone(&self.catch_all) as Arc<dyn Handler>)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("rewrites", &self.rewrites)
            .field("handlers", &self.handlers.len())
            .field("not_found", &self.catch_all.not_found.is_some())
            .finish()
    }
}

enum Entry {
    Route(String, RouteBuilder),
    Handler(Arc<dyn Handler>),
}

pub struct RouterBuilder {
    rewrites: Vec<Rewrite>,
    entries: Vec<Entry>,
    catch_all: CatchAll,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { rewrites: vec![], entries: vec![], catch_all: CatchAll::default() }
    }

    #[must_use]
    pub fn rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrites.push(rewrite);
        self
    }

    /// Serves urls matching `pattern` with the callbacks of `route`.
    #[must_use]
    pub fn route(mut self, pattern: impl Into<String>, route: RouteBuilder) -> Self {
        self.entries.push(Entry::Route(pattern.into(), route));
        self
    }

    /// Adds a handler of its own, like an
    /// [`EventSource`](crate::event_source::EventSource).
    #[must_use]
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.entries.push(Entry::Handler(Arc::new(handler)));
        self
    }

    #[must_use]
    pub fn not_found<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.catch_all.not_found = Some(Box::new(f));
        self
    }

    /// Receives uploads of requests no handler accepted.
    #[must_use]
    pub fn on_upload<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request, UploadChunk) + Send + Sync + 'static,
    {
        self.catch_all.on_upload = Some(Box::new(f));
        self
    }

    /// Receives raw bodies of requests no handler accepted.
    #[must_use]
    pub fn on_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request, BodyChunk) + Send + Sync + 'static,
    {
        self.catch_all.on_body = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<Router, RouterError> {
        let handlers = self
            .entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Route(pattern, route) => {
                    let pattern = UrlPattern::parse(&pattern)?;
                    Ok(Arc::new(route.build(pattern)) as Arc<dyn Handler>)
                }
                Entry::Handler(handler) => Ok(handler),
            })
            .collect::<Result<Vec<_>, RouterError>>()?;

        Ok(Router { rewrites: self.rewrites, handlers, catch_all: Arc::new(self.catch_all) })
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("rewrites", &self.rewrites)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
