//! Composable request filters.
//!
//! Filters look at the parsed [`RequestHead`] only, so they can run before
//! a handler is attached: on routes, and on rewrites before the url changes.
//!
//! # Examples
//!
//! ```
//! use ember_web::router::filter::{all_filter, get_method, header};
//!
//! let mut filter = all_filter();
//! filter.and(get_method()).and(header("X-Requested-With", "fetch"));
//! ```

use ember_http::protocol::RequestHead;
use http::Method;

/// Decides whether a request may reach a route or a rewrite.
pub trait Filter: Send + Sync {
    fn matches(&self, head: &RequestHead) -> bool;
}

struct FnFilter<F: Fn(&RequestHead) -> bool>(F);

impl<F: Fn(&RequestHead) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn matches(&self, head: &RequestHead) -> bool {
        (self.0)(head)
    }
}

/// Creates a filter from a closure.
///
/// ```
/// use ember_web::router::filter::fn_filter;
///
/// let api_only = fn_filter(|head| head.url().starts_with("/api"));
/// ```
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&RequestHead) -> bool + Send + Sync,
{
    FnFilter(f)
}

pub fn true_filter() -> TrueFilter {
    TrueFilter
}

pub fn false_filter() -> FalseFilter {
    FalseFilter
}

#[derive(Debug, Clone, Copy)]
pub struct TrueFilter;

impl Filter for TrueFilter {
    #[inline]
    fn matches(&self, _head: &RequestHead) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FalseFilter;

impl Filter for FalseFilter {
    #[inline]
    fn matches(&self, _head: &RequestHead) -> bool {
        false
    }
}

pub fn any_filter() -> AnyFilter {
    AnyFilter::new()
}

/// Compose filters with OR logic. An empty chain matches.
pub struct AnyFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AnyFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn or<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for AnyFilter {
    fn matches(&self, head: &RequestHead) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.matches(head))
    }
}

impl std::fmt::Debug for AnyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyFilter").field("filters", &self.filters.len()).finish()
    }
}

pub fn all_filter() -> AllFilter {
    AllFilter::new()
}

/// Compose filters with AND logic. An empty chain matches.
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for AllFilter {
    fn matches(&self, head: &RequestHead) -> bool {
        self.filters.iter().all(|filter| filter.matches(head))
    }
}

impl std::fmt::Debug for AllFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllFilter").field("filters", &self.filters.len()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct MethodFilter(Method);

impl Filter for MethodFilter {
    fn matches(&self, head: &RequestHead) -> bool {
        self.0.eq(head.method())
    }
}

macro_rules! method_filter {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Creates a filter that matches HTTP ", stringify!($upper_case_method), " requests.")]
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter(Method::$upper_case_method)
        }
    };
}

method_filter!(get_method, GET);
method_filter!(post_method, POST);
method_filter!(put_method, PUT);
method_filter!(delete_method, DELETE);
method_filter!(head_method, HEAD);
method_filter!(options_method, OPTIONS);
method_filter!(patch_method, PATCH);

/// Creates a filter requiring header `name` (any case) with exactly `value`.
///
/// The header is looked up before any header is dropped from the request,
/// so it does not need to be marked interesting.
pub fn header(name: impl Into<String>, value: impl Into<String>) -> HeaderFilter {
    HeaderFilter { name: name.into(), value: value.into() }
}

#[derive(Debug, Clone)]
pub struct HeaderFilter {
    name: String,
    value: String,
}

impl Filter for HeaderFilter {
    fn matches(&self, head: &RequestHead) -> bool {
        head.header_value(&self.name).is_some_and(|value| value == self.value)
    }
}
