//! Server configuration.
//!
//! [`ServerConfig`] deserializes with serde, every field falling back to its
//! default, so an embedding application can read it from any format:
//!
//! ```
//! use ember_web::config::ServerConfig;
//!
//! let config = ServerConfig::default()
//!     .with_address("0.0.0.0:80")
//!     .with_default_header("Access-Control-Allow-Origin", "*");
//! config.validate().unwrap();
//! ```

use ember_http::codec::MIN_CHUNK_SPACE;
use ember_http::protocol::DefaultHeaders;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_RX_TIMEOUT_SECS: u64 = 3;
/// Four segments of a typical 1436 byte MSS.
pub const DEFAULT_SEND_CAPACITY: usize = 5744;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("address must not be empty")]
    EmptyAddress,

    #[error("poll interval must be positive")]
    ZeroPollInterval,

    #[error("send capacity {capacity} must exceed {min} bytes")]
    SendCapacityTooSmall { capacity: usize, min: usize },

    #[error("max queued messages must be positive")]
    ZeroQueue,

    #[error("invalid default header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub poll_interval_ms: u64,
    /// Zero disables the request rx timeout.
    pub rx_timeout_secs: u64,
    pub send_capacity: usize,
    pub max_queued_messages: usize,
    pub default_headers: Vec<HeaderEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            rx_timeout_secs: DEFAULT_RX_TIMEOUT_SECS,
            send_capacity: DEFAULT_SEND_CAPACITY,
            max_queued_messages: crate::event_source::DEFAULT_MAX_QUEUED_MESSAGES,
            default_headers: Vec::new(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_rx_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rx_timeout_secs = timeout.map_or(0, |timeout| timeout.as_secs());
        self
    }

    #[must_use]
    pub fn with_send_capacity(mut self, capacity: usize) -> Self {
        self.send_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_queued_messages(mut self, max_queued: usize) -> Self {
        self.max_queued_messages = max_queued;
        self
    }

    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push(HeaderEntry { name: name.into(), value: value.into() });
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.send_capacity <= MIN_CHUNK_SPACE {
            return Err(ConfigError::SendCapacityTooSmall { capacity: self.send_capacity, min: MIN_CHUNK_SPACE });
        }
        if self.max_queued_messages == 0 {
            return Err(ConfigError::ZeroQueue);
        }

        for HeaderEntry { name, value } in &self.default_headers {
            let reason = if name.is_empty() {
                "empty name"
            } else if name.contains([':', ' ', '\r', '\n']) {
                "name contains a separator"
            } else if value.contains(['\r', '\n']) {
                "value contains a line break"
            } else {
                continue;
            };
            return Err(ConfigError::InvalidHeader { name: name.clone(), reason });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rx_timeout(&self) -> Option<Duration> {
        (self.rx_timeout_secs > 0).then(|| Duration::from_secs(self.rx_timeout_secs))
    }

    /// The default headers, built once and shared by every connection.
    pub fn default_headers(&self) -> Arc<DefaultHeaders> {
        Arc::new(self.default_headers.iter().map(|entry| (entry.name.as_str(), entry.value.as_str())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.rx_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.send_capacity, 5744);
        assert_eq!(config.max_queued_messages, 8);
        assert!(config.default_headers().is_empty());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ServerConfig = serde_json::from_str(indoc! {r#"
            {
                "address": "0.0.0.0:80",
                "rx_timeout_secs": 0,
                "default_headers": [
                    { "name": "Access-Control-Allow-Origin", "value": "*" }
                ]
            }
        "#})
        .unwrap();

        assert_eq!(config.address, "0.0.0.0:80");
        assert_eq!(config.rx_timeout(), None);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);

        let headers = config.default_headers();
        let header = headers.iter().next().unwrap();
        assert_eq!((header.name(), header.value()), ("Access-Control-Allow-Origin", "*"));
    }

    #[test]
    fn test_validation() {
        assert_eq!(ServerConfig::default().with_address(" ").validate(), Err(ConfigError::EmptyAddress));
        assert_eq!(
            ServerConfig::default().with_poll_interval(Duration::ZERO).validate(),
            Err(ConfigError::ZeroPollInterval)
        );
        assert_eq!(
            ServerConfig::default().with_send_capacity(8).validate(),
            Err(ConfigError::SendCapacityTooSmall { capacity: 8, min: 8 })
        );
        assert_eq!(ServerConfig::default().with_max_queued_messages(0).validate(), Err(ConfigError::ZeroQueue));
        assert!(matches!(
            ServerConfig::default().with_default_header("X-Bad", "a\r\nb").validate(),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }
}
