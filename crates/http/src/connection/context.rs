use crate::handler::Dispatcher;
use crate::protocol::DefaultHeaders;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Rx timeout armed while a request is being received.
pub const DEFAULT_RX_TIMEOUT: Duration = Duration::from_secs(3);

/// What every connection of one server shares: the dispatcher, the default
/// response headers and the receive timeout.
#[derive(Clone)]
pub struct ConnectionContext {
    dispatcher: Arc<dyn Dispatcher>,
    default_headers: Arc<DefaultHeaders>,
    rx_timeout: Option<Duration>,
}

impl ConnectionContext {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher, default_headers: Arc::default(), rx_timeout: Some(DEFAULT_RX_TIMEOUT) }
    }

    #[must_use]
    pub fn with_default_headers(mut self, default_headers: Arc<DefaultHeaders>) -> Self {
        self.default_headers = default_headers;
        self
    }

    #[must_use]
    pub fn with_rx_timeout(mut self, rx_timeout: Option<Duration>) -> Self {
        self.rx_timeout = rx_timeout;
        self
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub fn default_headers(&self) -> &Arc<DefaultHeaders> {
        &self.default_headers
    }

    pub fn rx_timeout(&self) -> Option<Duration> {
        self.rx_timeout
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("default_headers", &self.default_headers)
            .field("rx_timeout", &self.rx_timeout)
            .finish_non_exhaustive()
    }
}
