//! Transport Error Types
//!
//! Error handling for address parsing, proxy and protocol configuration,
//! interface resolution and the socket operations behind dial/listen.

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Malformed configuration mapping (wrong shape, wrong type, missing field)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// No registered parser accepted the address string
    #[error("address ({address}) not parsed")]
    UnparsedAddress { address: String },

    /// Neither an interface name nor an IPv4 address bound to an up interface
    #[error("no network interface found for {name}")]
    InterfaceNotFound { name: String },

    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Proxy handshake refused or malformed
    #[error("Proxy error: {message}")]
    Proxy { message: String },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn unparsed_address(address: impl Into<String>) -> Self {
        Self::UnparsedAddress {
            address: address.into(),
        }
    }

    pub fn interface_not_found(name: impl Into<String>) -> Self {
        Self::InterfaceNotFound { name: name.into() }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if this is a retryable error.
    ///
    /// Nothing in this crate retries; the answer is for the layer that owns
    /// the channel and its backoff policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Proxy { .. } => true,
            TransportError::Configuration { .. } => false,
            TransportError::UnparsedAddress { .. } => false,
            TransportError::InterfaceNotFound { .. } => false,
        }
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. } | TransportError::Timeout { .. }
        )
    }

    /// Get error category for logging fields
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Configuration { .. } => "configuration",
            TransportError::UnparsedAddress { .. } => "parse",
            TransportError::InterfaceNotFound { .. } => "parse",
            TransportError::Network { .. } => "network",
            TransportError::Proxy { .. } => "proxy",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Interface enumeration goes through nix; its errno maps onto I/O
impl From<nix::Error> for TransportError {
    fn from(error: nix::Error) -> Self {
        TransportError::from(std::io::Error::from(error))
    }
}

/// Convert serde YAML errors to transport errors
impl From<serde_yaml::Error> for TransportError {
    fn from(error: serde_yaml::Error) -> Self {
        TransportError::configuration(format!("YAML configuration error: {}", error), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert_eq!(TransportError::network("test").category(), "network");
        assert_eq!(TransportError::timeout("dial", 5000).category(), "timeout");
        assert_eq!(TransportError::unparsed_address("x").category(), "parse");
        assert_eq!(TransportError::interface_not_found("x").category(), "parse");
        assert_eq!(
            TransportError::configuration("bad", Some("proxy")).category(),
            "configuration"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransportError::network("test").is_retryable());
        assert!(TransportError::timeout("test", 1000).is_retryable());
        assert!(!TransportError::configuration("test", None).is_retryable());
        assert!(!TransportError::unparsed_address("eth0:invalid").is_retryable());
    }

    #[test]
    fn test_parse_errors_name_the_input() {
        assert_eq!(
            TransportError::unparsed_address("eth0:invalid").to_string(),
            "address (eth0:invalid) not parsed"
        );
        assert_eq!(
            TransportError::interface_not_found("no-such-name").to_string(),
            "no network interface found for no-such-name"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        match TransportError::from(io_err) {
            TransportError::Io { message, source } => {
                assert!(message.contains("test"));
                assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_nix_error_conversion() {
        let err = TransportError::from(nix::Error::ENODEV);
        assert_eq!(err.category(), "io");
    }
}
