//! # Edge Protocol Codec
//!
//! ## Purpose
//!
//! The message layer of the edge overlay: logical connections (dial a
//! service, or bind as its terminator) are multiplexed over one reliable
//! channel, and this crate defines what travels over it.
//!
//! - Header codec: typed values to little-endian header bytes and back
//! - Message catalogue: one constructor per message kind, plus typed parsers
//!   for the responses (dial result, inspect result, trace-route hop, bind)
//! - Connection lifecycle: per-connId state driven by sent/received messages,
//!   including session token expiry
//!
//! ## What This Crate Does NOT Contain
//!
//! - Channel framing or socket I/O (belongs to the channel and `edge-network`)
//! - The cryptographic handshake; only the negotiated method is carried
//!
//! ## Architecture Role
//!
//! ```text
//! Application → [edge-codec] → channel → edge-network
//!                  ↑      ↓
//!             Lifecycle  Message catalogue / header codec
//! ```

pub mod builder;
pub mod constants;
pub mod content_type;
pub mod error;
pub mod header;
pub mod lifecycle;
pub mod message;
pub mod options;
pub mod parser;

pub use builder::*;
pub use constants::*;
pub use content_type::ContentType;
pub use error::{ErrorCode, LifecycleError, ProtocolError, ProtocolResult};
pub use header::{HeaderType, HeaderValue};
pub use lifecycle::{ConnEntry, ConnState, ConnectionTracker, Role, Transition};
pub use message::Message;
pub use options::{ConnType, CryptoMethod, DialOptions, ListenOptions, Precedence};
pub use parser::{
    unmarshal_bind, unmarshal_dial_result, unmarshal_inspect_result,
    unmarshal_trace_route_response, unmarshal_update_bind, BindRequest, BindUpdate, DialResult,
    InspectResult, TraceRouteHop,
};
