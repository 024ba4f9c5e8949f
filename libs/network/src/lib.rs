//! # Edge Transport Addressing
//!
//! ## Purpose
//!
//! Turns address strings and a schema-less transport configuration into
//! connected byte streams for the edge channel:
//!
//! - Configuration mapping with ALPN protocol hints and a cached proxy section
//! - Address abstraction (dial, dial with local binding, listen) and an
//!   explicit parser registry
//! - TCP addresses, dialed directly or through an HTTP CONNECT proxy
//! - Network interface resolution by name or bound IPv4 address
//!
//! ## What This Crate Does NOT Contain
//!
//! - Message framing or the edge message catalogue (`edge-codec`)
//! - Retry or backoff; every failure is returned to the caller
//!
//! ## Architecture Role
//!
//! ```text
//! "tcp:host:port" → [AddressRegistry] → Address ──dial/listen──→ Conn
//!                                          ↑
//!                      Configuration (protocol, proxy) + interface resolver
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod interface;
pub mod proxy;
pub mod tcp;

pub use address::{
    AcceptFn, Address, AddressParser, AddressRegistry, Conn, ConnectionDetail, HostPortAddress,
    ListenerHandle, TokenId,
};
pub use config::{Configuration, KEY_PROTOCOL, KEY_PROXY};
pub use error::{Result, TransportError};
pub use interface::{
    resolve_interface, resolve_interface_with, InterfaceSource, NetworkInterface, SystemInterfaces,
};
pub use proxy::{load_proxy_configuration, ProxyAuth, ProxyConfiguration, ProxyType};
pub use tcp::{TcpAddress, TcpAddressParser};
