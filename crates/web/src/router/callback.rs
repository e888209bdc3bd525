use crate::auth::Credentials;
use crate::router::filter::{AllFilter, Filter, all_filter};
use crate::router::method::MethodSet;
use crate::router::pattern::UrlPattern;
use ember_http::connection::{ANY_HEADER, Request};
use ember_http::handler::Handler;
use ember_http::protocol::{BodyChunk, UploadChunk};
use std::fmt;

pub(crate) type RequestCallback = Box<dyn Fn(&mut Request) + Send + Sync>;
pub(crate) type UploadCallback = Box<dyn Fn(&mut Request, UploadChunk) + Send + Sync>;
pub(crate) type BodyCallback = Box<dyn Fn(&mut Request, BodyChunk) + Send + Sync>;

/// Everything about a route except its url, as built by [`get`], [`post`],
/// [`any`] and friends.
pub struct RouteBuilder {
    methods: MethodSet,
    filters: AllFilter,
    on_request: Option<RequestCallback>,
    on_upload: Option<UploadCallback>,
    on_body: Option<BodyCallback>,
    credentials: Option<Credentials>,
}

impl RouteBuilder {
    pub fn new(methods: MethodSet) -> Self {
        Self { methods, filters: all_filter(), on_request: None, on_upload: None, on_body: None, credentials: None }
    }

    /// Answers the request once it has been read completely.
    #[must_use]
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.on_request = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_upload<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request, UploadChunk) + Send + Sync + 'static,
    {
        self.on_upload = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request, BodyChunk) + Send + Sync + 'static,
    {
        self.on_body = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.and(filter);
        self
    }

    /// Challenges requests not carrying these credentials. Ignored unless
    /// both username and password are set.
    #[must_use]
    pub fn with_authentication(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials.is_configured().then_some(credentials);
        self
    }

    pub(crate) fn build(self, pattern: UrlPattern) -> CallbackHandler {
        CallbackHandler {
            pattern,
            methods: self.methods,
            filters: self.filters,
            on_request: self.on_request,
            on_upload: self.on_upload,
            on_body: self.on_body,
            credentials: self.credentials,
        }
    }
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder").field("methods", &self.methods).finish_non_exhaustive()
    }
}

macro_rules! route_builder {
    ($method:ident, $set:expr) => {
        #[doc = concat!("A route for `", stringify!($method), "` requests answered by `f`.")]
        pub fn $method<F>(f: F) -> RouteBuilder
        where
            F: Fn(&mut Request) + Send + Sync + 'static,
        {
            RouteBuilder::new($set).on_request(f)
        }
    };
}

route_builder!(get, MethodSet::GET);
route_builder!(post, MethodSet::POST);
route_builder!(put, MethodSet::PUT);
route_builder!(delete, MethodSet::DELETE);
route_builder!(patch, MethodSet::PATCH);
route_builder!(head, MethodSet::HEAD);
route_builder!(options, MethodSet::OPTIONS);
route_builder!(any, MethodSet::ANY);

/// A handler serving one url pattern with callbacks.
///
/// It only claims requests whose method is in its set and whose url matches
/// its pattern, and never claims anything without a request callback. All
/// request headers are kept for the callbacks.
pub struct CallbackHandler {
    pattern: UrlPattern,
    methods: MethodSet,
    filters: AllFilter,
    on_request: Option<RequestCallback>,
    on_upload: Option<UploadCallback>,
    on_body: Option<BodyCallback>,
    credentials: Option<Credentials>,
}

impl Handler for CallbackHandler {
    fn filter(&self, request: &Request) -> bool {
        self.filters.matches(request.head())
    }

    fn can_handle(&self, request: &mut Request) -> bool {
        if self.on_request.is_none() || !self.methods.contains(request.method()) {
            return false;
        }
        let Some(args) = self.pattern.matches(request.url()) else {
            return false;
        };

        request.head_mut().set_path_args(args);
        request.add_interesting_header(ANY_HEADER);
        true
    }

    fn handle_request(&self, request: &mut Request) {
        if let Some(credentials) = &self.credentials
            && !credentials.authenticate(request.head())
        {
            credentials.challenge(request);
            return;
        }

        if let Some(on_request) = &self.on_request {
            on_request(request);
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

impl fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}
