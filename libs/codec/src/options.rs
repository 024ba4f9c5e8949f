//! Dial and bind option value objects plus the small enums that ride in
//! single-byte headers.

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminator failover ranking; `Default` is implied when the header is absent
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    #[default]
    Default = 0,
    Required = 1,
    Failed = 2,
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precedence::Default => "default",
            Precedence::Required => "required",
            Precedence::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// End-to-end encryption engine negotiated through `CRYPTO_METHOD_HEADER`.
///
/// The cryptography itself is supplied by the caller; only the selection
/// travels on the wire.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CryptoMethod {
    /// kx key exchange with secretstream framing
    #[default]
    Libsodium = 0,
    /// ECDH with AES256-GCM, for peers on an external TLS stack
    Ssl = 1,
}

/// Connection role reported by an inspect response
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize)]
pub enum ConnType {
    Invalid = 0,
    Dial = 1,
    Bind = 2,
    Unknown = 3,
}

impl ConnType {
    /// Map a raw header byte, treating out-of-range values as unknown
    pub fn from_byte(b: u8) -> ConnType {
        ConnType::try_from(b).unwrap_or(ConnType::Unknown)
    }
}

/// Options carried on a `Connect` message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialOptions {
    /// Terminator identity to route to, empty for any
    pub identity: String,
    pub caller_id: String,
    pub app_data: Option<Vec<u8>>,
    pub crypto_method: CryptoMethod,
}

impl DialOptions {
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = caller_id.into();
        self
    }

    pub fn with_app_data(mut self, app_data: impl Into<Vec<u8>>) -> Self {
        self.app_data = Some(app_data.into());
        self
    }

    pub fn with_crypto_method(mut self, method: CryptoMethod) -> Self {
        self.crypto_method = method;
        self
    }
}

/// Options carried on a `Bind` message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    /// Higher is less preferred; 0 is the wire default
    pub cost: u16,
    pub precedence: Precedence,
    pub identity: String,
    pub identity_secret: String,
    pub listener_id: String,
    pub crypto_method: CryptoMethod,
}

impl ListenOptions {
    pub fn with_cost(mut self, cost: u16) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_identity_secret(mut self, secret: impl Into<String>) -> Self {
        self.identity_secret = secret.into();
        self
    }

    pub fn with_listener_id(mut self, listener_id: impl Into<String>) -> Self {
        self.listener_id = listener_id.into();
        self
    }

    pub fn with_crypto_method(mut self, method: CryptoMethod) -> Self {
        self.crypto_method = method;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(Precedence::Required as u8, 1);
        assert_eq!(Precedence::try_from(2u8).unwrap(), Precedence::Failed);
        assert!(Precedence::try_from(3u8).is_err());
        assert_eq!(CryptoMethod::default(), CryptoMethod::Libsodium);
        assert_eq!(ConnType::from_byte(2), ConnType::Bind);
        assert_eq!(ConnType::from_byte(200), ConnType::Unknown);
    }

    #[test]
    fn test_listen_options_from_yaml() {
        let yaml = "cost: 10\nprecedence: required\nidentity: svc-1\nlistener_id: l1\n";
        let opts: ListenOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.cost, 10);
        assert_eq!(opts.precedence, Precedence::Required);
        assert_eq!(opts.identity, "svc-1");
        assert_eq!(opts.crypto_method, CryptoMethod::Libsodium);
    }
}
