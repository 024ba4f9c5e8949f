//! # Edge Protocol Constants
//!
//! Header ids, error codes and flag bits shared by every edge message kind.
//! Header ids form one flat namespace across all content types; new headers
//! must take an unused id so older peers keep ignoring them.

// =============================================================================
// HEADER IDS
// =============================================================================

pub const CONN_ID_HEADER: i32 = 1000;
pub const SEQ_HEADER: i32 = 1001;
pub const SESSION_TOKEN_HEADER: i32 = 1002;
pub const PUBLIC_KEY_HEADER: i32 = 1003;
pub const COST_HEADER: i32 = 1004;
pub const PRECEDENCE_HEADER: i32 = 1005;
pub const TERMINATOR_IDENTITY_HEADER: i32 = 1006;
pub const TERMINATOR_IDENTITY_SECRET_HEADER: i32 = 1007;
pub const CALLER_ID_HEADER: i32 = 1008;
pub const CRYPTO_METHOD_HEADER: i32 = 1009;
pub const FLAGS_HEADER: i32 = 1010;
pub const APP_DATA_HEADER: i32 = 1011;
pub const ROUTER_PROVIDED_CONN_ID_HEADER: i32 = 1012;
pub const HEALTH_STATUS_HEADER: i32 = 1013;
pub const ERROR_CODE_HEADER: i32 = 1014;
pub const TIMESTAMP_HEADER: i32 = 1015;
pub const TRACE_HOP_COUNT_HEADER: i32 = 1016;
pub const TRACE_HOP_TYPE_HEADER: i32 = 1017;
pub const TRACE_HOP_ID_HEADER: i32 = 1018;
pub const TRACE_SOURCE_REQUEST_ID_HEADER: i32 = 1019;
pub const TRACE_ERROR_HEADER: i32 = 1020;
pub const LISTENER_ID_HEADER: i32 = 1021;
pub const CONN_TYPE_HEADER: i32 = 1022;
pub const SUPPORTS_INSPECT_HEADER: i32 = 1023;
pub const SUPPORTS_BIND_SUCCESS_HEADER: i32 = 1024;
pub const CONNECTION_MARKER_HEADER: i32 = 1025;
pub const CIRCUIT_ID_HEADER: i32 = 1026;

/// Lives in the reflected header range, so replies carry the same UUID back
pub const UUID_HEADER: i32 = 128;

// =============================================================================
// FLAGS
// =============================================================================

/// Data flag: no more payload follows in this direction
pub const FIN: u32 = 0x1;

/// Every header id this crate knows how to interpret
pub const KNOWN_HEADERS: &[i32] = &[
    UUID_HEADER,
    CONN_ID_HEADER,
    SEQ_HEADER,
    SESSION_TOKEN_HEADER,
    PUBLIC_KEY_HEADER,
    COST_HEADER,
    PRECEDENCE_HEADER,
    TERMINATOR_IDENTITY_HEADER,
    TERMINATOR_IDENTITY_SECRET_HEADER,
    CALLER_ID_HEADER,
    CRYPTO_METHOD_HEADER,
    FLAGS_HEADER,
    APP_DATA_HEADER,
    ROUTER_PROVIDED_CONN_ID_HEADER,
    HEALTH_STATUS_HEADER,
    ERROR_CODE_HEADER,
    TIMESTAMP_HEADER,
    TRACE_HOP_COUNT_HEADER,
    TRACE_HOP_TYPE_HEADER,
    TRACE_HOP_ID_HEADER,
    TRACE_SOURCE_REQUEST_ID_HEADER,
    TRACE_ERROR_HEADER,
    LISTENER_ID_HEADER,
    CONN_TYPE_HEADER,
    SUPPORTS_INSPECT_HEADER,
    SUPPORTS_BIND_SUCCESS_HEADER,
    CONNECTION_MARKER_HEADER,
    CIRCUIT_ID_HEADER,
];

/// Check whether a header id belongs to the edge namespace
pub fn is_known_header(id: i32) -> bool {
    KNOWN_HEADERS.contains(&id)
}
