//! Proxy Configuration and HTTP CONNECT
//!
//! Parses the `proxy` section of a transport [`Configuration`](crate::Configuration)
//! and performs the HTTP CONNECT handshake for outbound TCP dials that must
//! traverse a proxy.
//!
//! ```yaml
//! proxy:
//!   type: http            # or "none"
//!   address: proxy.internal:3128
//!   username: edge        # optional
//!   password: secret      # optional, only read when username is set
//! ```

use crate::{Result, TransportError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Upper bound on the proxy's CONNECT response header block
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "http")]
    HttpConnect,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::None => "none",
            ProxyType::HttpConnect => "http",
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic-auth credentials; a password is never present without a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyAuth {
    /// Value for the `Proxy-Authorization` header
    pub fn basic_header(&self) -> String {
        let credentials = format!("{}:{}", self.user, self.password.as_deref().unwrap_or(""));
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfiguration {
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    /// `host:port`, empty only for [`ProxyType::None`]
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfiguration {
    pub fn none() -> Self {
        Self {
            proxy_type: ProxyType::None,
            address: String::new(),
            auth: None,
        }
    }

    pub fn http_connect(address: impl Into<String>, auth: Option<ProxyAuth>) -> Self {
        Self {
            proxy_type: ProxyType::HttpConnect,
            address: address.into(),
            auth,
        }
    }
}

/// Parse the mapping found under the `proxy` key.
///
/// Every failure names the offending field and, for type mismatches, the
/// value that was found.
pub fn load_proxy_configuration(cfg: &Mapping) -> Result<ProxyConfiguration> {
    let proxy_type = match cfg.get("type") {
        None => {
            return Err(TransportError::configuration(
                "proxy configuration does not specify proxy type",
                Some("proxy.type"),
            ))
        }
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(TransportError::configuration(
                format!("proxy type must be a string, found [{}]", describe_value(other)),
                Some("proxy.type"),
            ))
        }
    };

    let proxy_type = match proxy_type {
        "none" => return Ok(ProxyConfiguration::none()),
        "http" => ProxyType::HttpConnect,
        unknown => {
            return Err(TransportError::configuration(
                format!("invalid proxy type {}", unknown),
                Some("proxy.type"),
            ))
        }
    };

    let address = match cfg.get("address") {
        None => {
            return Err(TransportError::configuration(
                format!("no address specified for {} proxy", proxy_type),
                Some("proxy.address"),
            ))
        }
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(other) => {
            return Err(TransportError::configuration(
                format!(
                    "invalid value for {} proxy address [{}], must be non-empty string",
                    proxy_type,
                    describe_value(other)
                ),
                Some("proxy.address"),
            ))
        }
    };

    let auth = match cfg.get("username") {
        None => None,
        Some(Value::String(user)) => {
            let password = match cfg.get("password") {
                None => None,
                Some(Value::String(password)) => Some(password.clone()),
                Some(other) => {
                    return Err(TransportError::configuration(
                        format!(
                            "invalid value for {} proxy password [{}], must be string",
                            proxy_type,
                            describe_value(other)
                        ),
                        Some("proxy.password"),
                    ))
                }
            };
            Some(ProxyAuth {
                user: user.clone(),
                password,
            })
        }
        Some(other) => {
            return Err(TransportError::configuration(
                format!(
                    "invalid value for {} proxy username [{}], must be string",
                    proxy_type,
                    describe_value(other)
                ),
                Some("proxy.username"),
            ))
        }
    };

    Ok(ProxyConfiguration {
        proxy_type,
        address,
        auth,
    })
}

/// Short rendering of an arbitrary YAML value for error messages
pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().replace('\n', " "))
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}

/// Ask an already-connected HTTP proxy to open a tunnel to `target`.
///
/// On success the stream carries the tunnelled bytes. The response is read
/// one byte at a time so nothing past the header block is consumed.
pub async fn http_connect(
    stream: &mut TcpStream,
    target: &str,
    auth: Option<&ProxyAuth>,
) -> Result<()> {
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(auth) = auth {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", auth.basic_header()));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| TransportError::network_with_source("Failed to write CONNECT request", e))?;

    let mut response = BytesMut::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_CONNECT_RESPONSE {
            return Err(TransportError::proxy(format!(
                "CONNECT response exceeds {} bytes",
                MAX_CONNECT_RESPONSE
            )));
        }
        let n = stream.read(&mut byte).await.map_err(|e| {
            TransportError::network_with_source("Failed to read CONNECT response", e)
        })?;
        if n == 0 {
            return Err(TransportError::proxy(
                "proxy closed connection during CONNECT handshake",
            ));
        }
        response.extend_from_slice(&byte);
    }

    let text = String::from_utf8_lossy(&response);
    let status_line = text.lines().next().unwrap_or_default().to_string();
    let status = parse_status_code(&status_line)
        .ok_or_else(|| TransportError::proxy(format!("malformed CONNECT response: {status_line}")))?;

    if !(200..300).contains(&status) {
        warn!(tunnel = target, status, "Proxy refused CONNECT");
        return Err(TransportError::proxy(format!(
            "CONNECT to {target} refused: {status_line}"
        )));
    }

    debug!(tunnel = target, status, "Proxy tunnel established");
    Ok(())
}

fn parse_status_code(status_line: &str) -> Option<u16> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
