//! The parsed head of a request and the name/value pairs hanging off it.

use http::{Method, Version};
use std::fmt;

/// One request header, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// A request parameter: from the query string, a form body, or a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: String,
    value: String,
    size: u64,
    is_form: bool,
    is_file: bool,
}

impl Param {
    /// A query string parameter.
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self { name: name.into(), size: value.len() as u64, value, is_form: false, is_file: false }
    }

    /// A parameter carried in the request body.
    pub fn form(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { is_form: true, ..Self::query(name, value) }
    }

    /// An uploaded file: `value` is the file name and `size` the uploaded length.
    pub fn file(name: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self { name: name.into(), value: filename.into(), size, is_form: true, is_file: true }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_form(&self) -> bool {
        self.is_form
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }
}

/// What the peer asked the connection to turn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionKind {
    #[default]
    Http,
    WebSocket,
    EventStream,
}

/// Credentials presented in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The base64 token after `Basic `.
    Basic(String),
    /// The parameter list after `Digest `.
    Digest(String),
}

/// Everything known about a request once its head has been parsed.
///
/// Headers and params keep arrival order. Body params and the router's path
/// captures are added later, while the request is being served.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHead {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) version: Version,
    pub(crate) host: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) content_length: u64,
    pub(crate) boundary: Option<String>,
    pub(crate) chunked: bool,
    pub(crate) expect_continue: bool,
    pub(crate) authorization: Option<Authorization>,
    pub(crate) kind: ConnectionKind,
    pub(crate) headers: Vec<Header>,
    pub(crate) params: Vec<Param>,
    pub(crate) path_args: Vec<String>,
}

impl RequestHead {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The decoded path, without the query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Minor version digit, as written in `HTTP/1.x` status lines.
    pub fn minor_version(&self) -> u8 {
        u8::from(self.version != Version::HTTP_10)
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The content type without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn is_multipart(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn expects_continue(&self) -> bool {
        self.expect_continue
    }

    pub fn authorization(&self) -> Option<&Authorization> {
        self.authorization.as_ref()
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is(name))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header(name).map(Header::value)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn push_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    /// Keeps only the headers `keep` accepts.
    pub fn retain_headers<F: FnMut(&Header) -> bool>(&mut self, keep: F) {
        self.headers.retain(keep);
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Looks a parameter up by name and origin: `form` selects body params,
    /// `file` uploaded files.
    pub fn param(&self, name: &str, form: bool, file: bool) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name && p.is_form == form && p.is_file == file)
    }

    pub fn has_param(&self, name: &str, form: bool, file: bool) -> bool {
        self.param(name, form, file).is_some()
    }

    pub fn add_param(&mut self, param: Param) {
        self.params.push(param);
    }

    /// Positional captures from the route pattern that matched.
    pub fn path_args(&self) -> &[String] {
        &self.path_args
    }

    pub fn path_arg(&self, index: usize) -> Option<&str> {
        self.path_args.get(index).map(String::as_str)
    }

    pub fn set_path_args(&mut self, args: Vec<String>) {
        self.path_args = args;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head() -> RequestHead {
        let mut head = RequestHead { url: "/upload".into(), ..RequestHead::default() };
        head.push_header(Header::new("Host", "device.local"));
        head.push_header(Header::new("X-Trace", "abc"));
        head.add_param(Param::query("id", "7"));
        head.add_param(Param::form("id", "8"));
        head.add_param(Param::file("firmware", "fw.bin", 1024));
        head
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let head = head();
        assert_eq!(head.header_value("host"), Some("device.local"));
        assert!(head.has_header("x-trace"));
        assert!(!head.has_header("Cookie"));
    }

    #[test]
    fn test_param_lookup_by_origin() {
        let head = head();
        assert_eq!(head.param("id", false, false).map(Param::value), Some("7"));
        assert_eq!(head.param("id", true, false).map(Param::value), Some("8"));

        let file = head.param("firmware", true, true).unwrap();
        assert_eq!(file.value(), "fw.bin");
        assert_eq!(file.size(), 1024);
    }

    #[test]
    fn test_retain_headers() {
        let mut head = head();
        head.retain_headers(|h| h.is("X-Trace"));
        assert_eq!(head.headers().len(), 1);
        assert_eq!(head.headers()[0].to_string(), "X-Trace: abc");
    }

    #[test]
    fn test_minor_version() {
        let mut head = head();
        assert_eq!(head.minor_version(), 1);
        head.version = Version::HTTP_10;
        assert_eq!(head.minor_version(), 0);
    }
}
