//! Protocol-level errors for edge message processing
//!
//! Decode failures carry the header id or content type involved so callers
//! can log and switch on them without parsing text. The in-band error code
//! taxonomy peers put in [`ERROR_CODE_HEADER`](crate::constants::ERROR_CODE_HEADER)
//! is modelled by [`ErrorCode`].

use crate::content_type::ContentType;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Header and message decoding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Stored header length does not match the width of the requested type
    #[error("Header {header_id} has {got} bytes, expected {expected} for {type_name}")]
    HeaderWidth {
        header_id: i32,
        expected: usize,
        got: usize,
        type_name: &'static str,
    },

    /// A header the message kind requires is absent
    #[error("Missing header {header_id} ({context})")]
    MissingHeader { header_id: i32, context: String },

    /// A string header holds bytes that are not UTF-8
    #[error("Header {header_id} is not valid UTF-8")]
    InvalidUtf8 { header_id: i32 },

    /// A header decoded to a number outside its enumeration
    #[error("Header {header_id} holds {value}, not a valid {kind}")]
    InvalidHeaderValue {
        header_id: i32,
        value: u64,
        kind: &'static str,
    },

    /// Dial success body must be exactly a 4-byte little-endian connId
    #[error("Dial success msg improperly formatted. body len: {body_len}")]
    MalformedDialSuccess { body_len: usize },

    /// A specific response kind was expected but something else arrived
    #[error("Unexpected response. received {actual} instead of {expected}")]
    UnexpectedContentType { expected: String, actual: String },
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    pub fn header_width(header_id: i32, expected: usize, got: usize, type_name: &'static str) -> Self {
        Self::HeaderWidth {
            header_id,
            expected,
            got,
            type_name,
        }
    }

    pub fn missing_header(header_id: i32, context: impl Into<String>) -> Self {
        Self::MissingHeader {
            header_id,
            context: context.into(),
        }
    }

    pub fn unexpected_content_type(expected: impl Into<String>, actual: i32) -> Self {
        Self::UnexpectedContentType {
            expected: expected.into(),
            actual: ContentType::describe(actual),
        }
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ProtocolError::HeaderWidth { .. }
            | ProtocolError::MissingHeader { .. }
            | ProtocolError::InvalidUtf8 { .. }
            | ProtocolError::InvalidHeaderValue { .. } => "header",
            ProtocolError::MalformedDialSuccess { .. } => "body",
            ProtocolError::UnexpectedContentType { .. } => "content_type",
        }
    }
}

/// Connection lifecycle violations reported upward by the tracker
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    /// Message addressed to a connId that was never opened (or already forgotten)
    #[error("{content_type} for unknown connId {conn_id}")]
    UnknownConnection { conn_id: u32, content_type: String },

    /// Message addressed to a connId that already reached a terminal state
    #[error("{content_type} for connId {conn_id} in terminal state {state}")]
    TerminalConnection {
        conn_id: u32,
        state: String,
        content_type: String,
    },

    /// Message not allowed from the connection's current state
    #[error("{content_type} not valid for connId {conn_id} in state {state}")]
    InvalidTransition {
        conn_id: u32,
        state: String,
        content_type: String,
    },

    /// Session token expired without a successful refresh
    #[error("Session token expired without refresh; tore down {} connection(s)", torn_down.len())]
    TokenExpired { torn_down: Vec<u32> },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl LifecycleError {
    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            LifecycleError::UnknownConnection { .. } => "unknown_connection",
            LifecycleError::TerminalConnection { .. } => "terminal_connection",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::TokenExpired { .. } => "token_expired",
            LifecycleError::Protocol(inner) => inner.category(),
        }
    }
}

/// Stable numeric error taxonomy carried in-band
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize)]
pub enum ErrorCode {
    Internal = 1,
    InvalidApiSession = 2,
    InvalidSession = 3,
    WrongSessionType = 4,
    InvalidEdgeRouterForSession = 5,
    InvalidService = 6,
    TunnelingNotEnabled = 7,
    InvalidTerminator = 8,
    InvalidPrecedence = 9,
    InvalidCost = 10,
    EncryptionDataMissing = 11,
}

impl ErrorCode {
    /// Whether retrying with a fresh session could succeed
    pub fn is_session_related(self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidApiSession
                | ErrorCode::InvalidSession
                | ErrorCode::WrongSessionType
                | ErrorCode::InvalidEdgeRouterForSession
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = ProtocolError::MalformedDialSuccess { body_len: 3 };
        assert_eq!(err.to_string(), "Dial success msg improperly formatted. body len: 3");

        let err = ProtocolError::unexpected_content_type("dial result message", 60790);
        assert!(err.to_string().contains("EdgeBindType"));
    }

    #[test]
    fn test_error_code_taxonomy() {
        assert_eq!(ErrorCode::try_from(1u32).unwrap(), ErrorCode::Internal);
        assert_eq!(ErrorCode::try_from(11u32).unwrap(), ErrorCode::EncryptionDataMissing);
        assert!(ErrorCode::try_from(12u32).is_err());
        assert!(ErrorCode::InvalidSession.is_session_related());
        assert!(!ErrorCode::InvalidCost.is_session_related());
    }

    #[test]
    fn test_lifecycle_error_wraps_protocol() {
        let err: LifecycleError = ProtocolError::missing_header(1000, "data").into();
        assert!(matches!(err, LifecycleError::Protocol(_)));
        assert_eq!(err.category(), "header");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ProtocolError::header_width(1000, 4, 2, "u32").category(), "header");
        assert_eq!(ProtocolError::MalformedDialSuccess { body_len: 0 }.category(), "body");
        assert_eq!(
            ProtocolError::unexpected_content_type("bind", 60786).category(),
            "content_type"
        );
        assert_eq!(
            LifecycleError::TokenExpired { torn_down: vec![] }.category(),
            "token_expired"
        );
    }
}
