//! TCP Address
//!
//! `tcp:<host>:<port>` addresses, with IPv6 hosts in brackets
//! (`tcp:[::1]:6262`). Dials honor the `proxy` section of the
//! [`Configuration`]: an HTTP proxy is connected to first and asked to
//! tunnel to the target with CONNECT.

use crate::address::{
    AcceptFn, Address, AddressParser, Conn, HostPortAddress, ListenerHandle, TokenId,
};
use crate::config::Configuration;
use crate::interface::{first_ipv4, resolve_interface_with, InterfaceSource, SystemInterfaces};
use crate::proxy::{http_connect, ProxyType};
use crate::{Result, TransportError};
use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub const TCP_PREFIX: &str = "tcp";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpAddress {
    hostname: String,
    port: u16,
}

impl TcpAddress {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Parse `tcp:<host>:<port>`
    pub fn parse(address: &str) -> Result<Self> {
        let rest = address
            .strip_prefix(TCP_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| TransportError::unparsed_address(address))?;

        let (hostname, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| TransportError::unparsed_address(address))?;
            let port = after
                .strip_prefix(':')
                .ok_or_else(|| TransportError::unparsed_address(address))?;
            (host, port)
        } else {
            let (host, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| TransportError::unparsed_address(address))?;
            // an unbracketed IPv6 host is ambiguous
            if host.contains(':') {
                return Err(TransportError::unparsed_address(address));
            }
            (host, port)
        };

        if hostname.is_empty() {
            return Err(TransportError::unparsed_address(address));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::unparsed_address(address))?;

        Ok(Self::new(hostname, port))
    }

    /// `host:port` as used on the wire and in CONNECT requests
    pub fn host_port(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }

    /// Full dial: optional local bind, optional proxy, bounded by `timeout`
    async fn connect(
        &self,
        name: &str,
        local: Option<IpAddr>,
        timeout: Duration,
        config: &Configuration,
    ) -> Result<Conn> {
        let proxy = config.get_proxy_configuration()?;
        let target = self.host_port();

        let attempt = async {
            match proxy.as_deref() {
                Some(proxy) if proxy.proxy_type == ProxyType::HttpConnect => {
                    debug!(service = name, tunnel = %target, proxy = %proxy.address, "Dialing through HTTP proxy");
                    let mut stream = connect_stream(&proxy.address, local).await?;
                    http_connect(&mut stream, &target, proxy.auth.as_ref()).await?;
                    Ok::<TcpStream, TransportError>(stream)
                }
                _ => connect_stream(&target, local).await,
            }
        };

        let stream = tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| TransportError::timeout(format!("dial {}", self), timeout.as_millis() as u64))??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let conn = Conn::new(stream, self.to_string(), false);
        info!(
            service = name,
            address = %self,
            local_addr = ?conn.local_addr(),
            "Dialed TCP address"
        );
        Ok(conn)
    }

    /// Bound dial resolving `binding` against the given interface source
    pub async fn dial_bound(
        &self,
        name: &str,
        binding: &str,
        source: &(dyn InterfaceSource + Sync),
        timeout: Duration,
        config: &Configuration,
    ) -> Result<Conn> {
        let iface = resolve_interface_with(source, binding)?;
        let local = first_ipv4(source, &iface)?;
        debug!(service = name, binding, interface = %iface.name, local = %local, "Binding dial to interface");
        self.connect(name, Some(local), timeout, config).await
    }
}

/// Resolve `host:port` and connect to the first address that answers,
/// preferring IPv4 when the local side is bound to an IPv4 address
async fn connect_stream(host_port: &str, local: Option<IpAddr>) -> Result<TcpStream> {
    let candidates: Vec<SocketAddr> = lookup_host(host_port)
        .await
        .map_err(|e| TransportError::network_with_source(format!("Failed to resolve {host_port}"), e))?
        .filter(|addr| local.map_or(true, |ip| ip.is_ipv4() == addr.is_ipv4()))
        .collect();

    let mut last_error = None;
    for remote in candidates {
        let result = match local {
            None => TcpStream::connect(remote).await,
            Some(ip) => {
                let socket = if remote.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.bind(SocketAddr::new(ip, 0))?;
                socket.connect(remote).await
            }
        };
        match result {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(remote = %remote, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => TransportError::network_with_source(format!("Failed to connect to {host_port}"), e),
        None => TransportError::network(format!("No usable address for {host_port}")),
    })
}

impl fmt::Display for TcpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", TCP_PREFIX, self.host_port())
    }
}

#[async_trait]
impl Address for TcpAddress {
    async fn dial(
        &self,
        name: &str,
        _identity: Option<&TokenId>,
        timeout: Duration,
        config: &Configuration,
    ) -> Result<Conn> {
        self.connect(name, None, timeout, config).await
    }

    async fn dial_with_local_binding(
        &self,
        name: &str,
        binding: &str,
        _identity: Option<&TokenId>,
        timeout: Duration,
        config: &Configuration,
    ) -> Result<Conn> {
        self.dial_bound(name, binding, &SystemInterfaces, timeout, config).await
    }

    async fn listen(
        &self,
        name: &str,
        _identity: Option<&TokenId>,
        accept: AcceptFn,
        _config: &Configuration,
    ) -> Result<ListenerHandle> {
        let listener = TcpListener::bind((self.hostname.as_str(), self.port))
            .await
            .map_err(|e| TransportError::network_with_source(format!("Failed to bind {self}"), e))?;
        let local_addr = listener.local_addr()?;

        info!(service = name, address = %self, local_addr = %local_addr, "TCP listener started");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let address = self.to_string();
        let task = tokio::spawn(accept_loop(listener, address, accept, shutdown_rx));

        Ok(ListenerHandle::new(local_addr, shutdown_tx, task))
    }

    fn address_type(&self) -> &'static str {
        TCP_PREFIX
    }

    fn as_host_port(&self) -> Option<&dyn HostPortAddress> {
        Some(self)
    }
}

impl HostPortAddress for TcpAddress {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn port(&self) -> u16 {
        self.port
    }
}

async fn accept_loop(
    listener: TcpListener,
    address: String,
    accept: AcceptFn,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!(address = %address, "Accept loop stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY: {}", e);
                    }
                    debug!(address = %address, peer = %peer, "Accepted TCP connection");
                    accept(Conn::new(stream, address.clone(), true));
                }
                Err(e) => {
                    // per-connection failures (e.g. reset before accept) are not fatal
                    warn!(address = %address, error = %e, "Failed to accept TCP connection");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Parser for `tcp:` addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpAddressParser;

impl AddressParser for TcpAddressParser {
    fn parse(&self, address: &str) -> Result<Arc<dyn Address>> {
        Ok(Arc::new(TcpAddress::parse(address)?))
    }
}
