use crate::codec::RequestDecoder;
use crate::connection::{ConnectionContext, Session};
use crate::handler::Handler;
use crate::protocol::{DefaultHeaders, Header, Param, ParseEvent, RequestHead};
use crate::response::{CallbackSource, Fill, ReaderSource, Response};
use crate::transport::{Transport, TransportEvent};
use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tokio_util::codec::Decoder;
use tracing::{debug, info, trace, warn};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Marker keeping every request header.
pub const ANY_HEADER: &str = "ANY";

/// What the owning [`Connection`](crate::connection::Connection) has to do
/// after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// The response's upgrade is ready to take over the transport.
    Upgrade,
    Closed,
}

/// One HTTP exchange, bound to its transport for its whole lifetime.
///
/// The request parses incoming bytes, hands the head to the dispatcher and
/// the body to the attached handler, and drives the response the handler
/// sent. Handlers read the request through this type and answer with
/// [`Request::send`] or one of the `send_*`/`begin_*` helpers.
pub struct Request {
    transport: Box<dyn Transport>,
    decoder: RequestDecoder,
    buffer: BytesMut,
    head: RequestHead,
    context: ConnectionContext,
    handler: Option<Arc<dyn Handler>>,
    interesting_headers: Vec<String>,
    response: Option<Response>,
    /// The end of the response has been dealt with.
    settled: bool,
}

impl Request {
    pub fn new(mut transport: Box<dyn Transport>, context: ConnectionContext) -> Self {
        transport.set_rx_timeout(context.rx_timeout());
        Self {
            transport,
            decoder: RequestDecoder::new(),
            buffer: BytesMut::new(),
            head: RequestHead::default(),
            context,
            handler: None,
            interesting_headers: Vec::new(),
            response: None,
            settled: false,
        }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut RequestHead {
        &mut self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn url(&self) -> &str {
        self.head.url()
    }

    pub fn host(&self) -> Option<&str> {
        self.head.host()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.head.content_type()
    }

    pub fn content_length(&self) -> u64 {
        self.head.content_length()
    }

    pub fn headers(&self) -> &[Header] {
        self.head.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header_value(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.head.has_header(name)
    }

    pub fn params(&self) -> &[Param] {
        self.head.params()
    }

    /// A query or form parameter by name, the first one that arrived.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.head.params().iter().find(|p| p.name() == name && !p.is_file()).map(Param::value)
    }

    pub fn path_arg(&self, index: usize) -> Option<&str> {
        self.head.path_arg(index)
    }

    /// Keeps the header `name` once a handler is attached. [`ANY_HEADER`]
    /// keeps all of them.
    pub fn add_interesting_header(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.interesting_headers.iter().any(|known| known.eq_ignore_ascii_case(&name)) {
            self.interesting_headers.push(name);
        }
    }

    pub fn interesting_headers(&self) -> &[String] {
        &self.interesting_headers
    }

    pub fn default_headers(&self) -> &Arc<DefaultHeaders> {
        self.context.default_headers()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// The response sent for this request, if any.
    pub fn sent_response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// An empty response starting with this server's default headers.
    pub fn response(&self, code: StatusCode) -> Response {
        Response::new(code, Arc::clone(self.context.default_headers()))
    }

    pub fn begin_response(&self, code: StatusCode, content_type: &str, content: impl Into<Bytes>) -> Response {
        let mut response = Response::with_bytes(code, Arc::clone(self.context.default_headers()), content);
        response.set_content_type(content_type);
        response
    }

    /// A response streaming `len` bytes out of `reader`.
    pub fn begin_reader_response<R>(&self, content_type: &str, len: u64, reader: R) -> Response
    where
        R: Read + Send + 'static,
    {
        let mut response = self.response(StatusCode::OK);
        response.set_content_type(content_type);
        response.set_content_length(len);
        response.set_source(ReaderSource::new(reader));
        response
    }

    /// A response of `len` bytes produced by `fill`.
    pub fn begin_fill_response<F>(&self, content_type: &str, len: u64, fill: F) -> Response
    where
        F: FnMut(&mut [u8], usize) -> Fill + Send + 'static,
    {
        let mut response = self.response(StatusCode::OK);
        response.set_content_type(content_type);
        response.set_content_length(len);
        response.set_source(CallbackSource::new(fill));
        response
    }

    /// A chunked response produced by `fill`; an empty fill ends it.
    pub fn begin_chunked_response<F>(&self, content_type: &str, fill: F) -> Response
    where
        F: FnMut(&mut [u8], usize) -> Fill + Send + 'static,
    {
        let mut response = self.response(StatusCode::OK);
        response.set_content_type(content_type);
        response.set_chunked(true);
        response.set_source(CallbackSource::new(fill));
        response
    }

    pub fn send_status(&mut self, code: StatusCode) {
        let response = self.response(code);
        self.send(response);
    }

    pub fn send_text(&mut self, code: StatusCode, content_type: &str, content: impl Into<Bytes>) {
        let response = self.begin_response(code, content_type, content);
        self.send(response);
    }

    pub fn redirect(&mut self, url: &str) {
        let response = self.response(StatusCode::FOUND).with_header("Location", url);
        self.send(response);
    }

    /// Starts sending `response`. Only the first response of a request is
    /// sent; one with an invalid source is replaced by a 500.
    pub fn send(&mut self, response: Response) {
        if self.response.is_some() {
            warn!(url = self.head.url(), "request already has a response, ignoring another one");
            return;
        }

        let mut response = if response.is_source_valid() {
            response
        } else {
            warn!(url = self.head.url(), "response content is unavailable, answering 500");
            self.response(StatusCode::INTERNAL_SERVER_ERROR)
        };

        self.transport.set_rx_timeout(None);
        if let Err(e) = response.respond(self.transport.as_mut(), self.head.minor_version()) {
            warn!(cause = %e, "failed to start response");
        }
        self.response = Some(response);
    }

    pub(crate) fn on_event(&mut self, event: TransportEvent) -> Flow {
        match event {
            TransportEvent::Data(data) => self.on_data(&data),
            TransportEvent::Ack { len, .. } => self.on_ack(len),
            TransportEvent::Poll(_) => self.on_poll(),
            TransportEvent::Timeout(_) => {
                debug!(url = self.head.url(), "request timed out, closing");
                self.transport.close();
            }
            TransportEvent::Error(e) => {
                warn!(cause = %e, "transport error, closing");
                if let Some(response) = self.response.as_mut() {
                    response.fail();
                }
                self.transport.close();
            }
            TransportEvent::Disconnect => {
                trace!(url = self.head.url(), "request disconnected");
                return Flow::Closed;
            }
        }
        self.settle()
    }

    /// Hands the transport over to the response's upgrade.
    pub(crate) fn into_session(mut self) -> Option<Box<dyn Session>> {
        let upgrade = self.response.as_mut()?.take_upgrade()?;
        debug!(url = self.head.url(), "upgrading connection");
        Some(upgrade.upgrade(self.transport, self.head))
    }

    fn on_data(&mut self, data: &[u8]) {
        if self.decoder.is_done() {
            trace!(len = data.len(), "ignoring data after the request");
            return;
        }

        self.buffer.extend_from_slice(data);
        loop {
            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(event)) => self.on_parse_event(event),
                Ok(None) => break,
                Err(e) => {
                    debug!(cause = %e, "malformed request, closing connection");
                    self.buffer.clear();
                    self.transport.close();
                    break;
                }
            }
        }
    }

    fn on_parse_event(&mut self, event: ParseEvent) {
        match event {
            ParseEvent::Head(head) => self.on_head(*head),
            ParseEvent::Param(param) => self.head.add_param(param),
            ParseEvent::Body(chunk) => {
                if let Some(handler) = self.handler.as_ref().map(Arc::clone) {
                    handler.handle_body(self, chunk);
                }
            }
            ParseEvent::Upload(chunk) => {
                if let Some(handler) = self.handler.as_ref().map(Arc::clone) {
                    handler.handle_upload(self, chunk);
                }
            }
            ParseEvent::Complete => match self.handler.as_ref().map(Arc::clone) {
                Some(handler) => handler.handle_request(self),
                None => self.send_status(StatusCode::NOT_IMPLEMENTED),
            },
        }
    }

    fn on_head(&mut self, head: RequestHead) {
        self.head = head;
        let dispatcher = Arc::clone(self.context.dispatcher());
        dispatcher.rewrite(&mut self.head);
        self.handler = dispatcher.attach(self);

        if !self.interesting_headers.iter().any(|name| name == ANY_HEADER) {
            let interesting = &self.interesting_headers;
            self.head.retain_headers(|header| interesting.iter().any(|name| header.is(name)));
        }

        info!(method = %self.head.method(), url = self.head.url(), handled = self.handler.is_some(), "request");

        if self.head.expects_continue() {
            self.transport.write(CONTINUE);
        }
    }

    fn on_ack(&mut self, len: usize) {
        let Some(response) = self.response.as_mut() else {
            return;
        };
        if let Err(e) = response.ack(self.transport.as_mut(), len) {
            warn!(cause = %e, "failed to continue response");
        }
    }

    fn on_poll(&mut self) {
        let Some(response) = self.response.as_mut() else {
            return;
        };
        if response.started() && !response.finished() && self.transport.can_send() {
            if let Err(e) = response.ack(self.transport.as_mut(), 0) {
                warn!(cause = %e, "failed to continue response");
            }
        }
    }

    /// Deals with a response that just ended or failed.
    fn settle(&mut self) -> Flow {
        let Some(response) = self.response.as_ref() else {
            return Flow::Continue;
        };
        if self.settled || !response.finished() {
            return Flow::Continue;
        }

        if response.is_upgrade() && !response.failed() {
            return Flow::Upgrade;
        }

        self.settled = true;
        if response.failed() || !response.is_length_framed() {
            debug!(failed = response.failed(), "response done, closing connection");
            self.transport.close();
        } else {
            trace!("response done, waiting for the peer to close");
            self.transport.set_rx_timeout(self.context.rx_timeout());
        }
        Flow::Continue
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("head", &self.head)
            .field("handler", &self.handler.is_some())
            .field("interesting_headers", &self.interesting_headers)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}
