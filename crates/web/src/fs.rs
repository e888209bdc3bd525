//! Responses streamed from files.
//!
//! Storage is reached through the [`FileSystem`] trait; [`LocalFileSystem`]
//! serves a directory of the host. [`file_response`] builds the response
//! that streams a file, with its content type derived from the extension.

use ember_http::connection::Request;
use ember_http::response::Response;
use http::StatusCode;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    fn file_len(&self, path: &str) -> io::Result<u64>;

    fn exists(&self, path: &str) -> bool {
        self.file_len(path).is_ok()
    }
}

/// Files below one directory. Paths are taken relative to it and may not
/// leave it.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|component| !matches!(component, Component::Normal(_) | Component::CurDir)) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, format!("{path} leaves the served directory")));
        }
        Ok(self.root.join(relative))
    }
}

impl FileSystem for LocalFileSystem {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path)?)?;
        Ok(Box::new(file))
    }

    fn file_len(&self, path: &str) -> io::Result<u64> {
        let metadata = self.resolve(path)?.metadata()?;
        if metadata.is_file() {
            Ok(metadata.len())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, format!("{path} is not a file")))
        }
    }
}

/// The content type for a file name's extension, `text/plain` if unknown.
pub fn content_type_for(path: &str) -> String {
    let extension = path.rsplit_once('.').map(|(_, extension)| extension.to_ascii_lowercase());
    let mime = match extension.as_deref() {
        Some("html" | "htm") => mime::TEXT_HTML,
        Some("css") => mime::TEXT_CSS,
        Some("json") => mime::APPLICATION_JSON,
        Some("js") => mime::APPLICATION_JAVASCRIPT,
        Some("png") => mime::IMAGE_PNG,
        Some("gif") => mime::IMAGE_GIF,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("svg") => mime::IMAGE_SVG,
        Some("woff") => mime::FONT_WOFF,
        Some("woff2") => mime::FONT_WOFF2,
        Some("xml") => mime::TEXT_XML,
        Some("pdf") => mime::APPLICATION_PDF,
        Some("ico") => return "image/x-icon".to_string(),
        Some("eot") => return "font/eot".to_string(),
        Some("ttf") => return "font/ttf".to_string(),
        Some("zip") => return "application/zip".to_string(),
        Some("gz") => return "application/x-gzip".to_string(),
        _ => mime::TEXT_PLAIN,
    };
    mime.to_string()
}

/// A response streaming the file at `path`, or a 404 if it cannot be read.
///
/// When `path` is missing but `path.gz` exists and no download was asked
/// for, the compressed file is sent with `Content-Encoding: gzip`. The
/// content type comes from `path`'s extension unless one is given.
pub fn file_response(
    request: &Request,
    fs: &dyn FileSystem,
    path: &str,
    content_type: Option<&str>,
    download: bool,
) -> Response {
    let compressed = format!("{path}.gz");
    let gzipped = !download && !fs.exists(path) && fs.exists(&compressed);
    let served = if gzipped { compressed.as_str() } else { path };

    let opened = fs.file_len(served).and_then(|len| Ok((len, fs.open(served)?)));
    let (len, reader) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            debug!(path = served, cause = %e, "file not available");
            return request.response(StatusCode::NOT_FOUND);
        }
    };

    let content_type = content_type.map_or_else(|| content_type_for(path), str::to_string);
    let mut response = request.begin_reader_response(&content_type, len, reader);
    if gzipped {
        response.add_header("Content-Encoding", "gzip");
    }

    let filename = path.rsplit('/').next().unwrap_or(path);
    let disposition = if download { "attachment" } else { "inline" };
    response.add_header("Content-Disposition", format!("{disposition}; filename=\"{filename}\""));
    response
}

/// Sends [`file_response`] for `path`.
pub fn send_file(request: &mut Request, fs: &dyn FileSystem, path: &str, content_type: Option<&str>, download: bool) {
    let response = file_response(request, fs, path, content_type, download);
    request.send(response);
}

/// Serves every url below `prefix` from a file system.
pub struct StaticFiles<F> {
    fs: F,
    prefix: String,
    default_file: String,
}

impl<F: FileSystem> StaticFiles<F> {
    pub fn new(prefix: impl Into<String>, fs: F) -> Self {
        Self { fs, prefix: prefix.into(), default_file: "index.html".to_string() }
    }

    /// The file served for urls ending with `/`.
    #[must_use]
    pub fn with_default_file(mut self, default_file: impl Into<String>) -> Self {
        self.default_file = default_file.into();
        self
    }

    fn file_path(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(self.prefix.trim_end_matches('/'))?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        if rest.is_empty() || rest.ends_with('/') {
            return Some(format!("{rest}/{}", self.default_file).replace("//", "/"));
        }
        Some(rest.to_string())
    }
}

impl<F: FileSystem> ember_http::handler::Handler for StaticFiles<F> {
    fn can_handle(&self, request: &mut Request) -> bool {
        *request.method() == http::Method::GET && self.file_path(request.url()).is_some()
    }

    fn handle_request(&self, request: &mut Request) {
        match self.file_path(request.url()) {
            Some(path) => send_file(request, &self.fs, &path, None, false),
            None => request.send_status(StatusCode::NOT_FOUND),
        }
    }
}

impl<F> fmt::Debug for StaticFiles<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFiles")
            .field("prefix", &self.prefix)
            .field("default_file", &self.default_file)
            .finish_non_exhaustive()
    }
}
