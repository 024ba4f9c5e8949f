//! Address Abstraction and Parser Registry
//!
//! An [`Address`] is a dialable/listenable endpoint produced from a string
//! such as `tcp:127.0.0.1:6262`. Parsers are registered on an explicit
//! [`AddressRegistry`], built once at startup and shared read-only
//! afterwards; the first parser that accepts a string wins.

use crate::config::Configuration;
use crate::{Result, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Opaque credential the caller authenticates with; transports that do not
/// authenticate at this layer ignore it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenId {
    pub token: String,
}

impl TokenId {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Where a connection came from, for logs and inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetail {
    pub address: String,
    pub inbound: bool,
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
}

/// A connected byte stream produced by dial or accept. Dropping it closes
/// the underlying socket.
#[derive(Debug)]
pub struct Conn {
    stream: TcpStream,
    detail: ConnectionDetail,
}

impl Conn {
    pub(crate) fn new(stream: TcpStream, address: String, inbound: bool) -> Self {
        let detail = ConnectionDetail {
            address,
            inbound,
            local_addr: stream.local_addr().ok(),
            remote_addr: stream.peer_addr().ok(),
        };
        Self { stream, detail }
    }

    pub fn detail(&self) -> &ConnectionDetail {
        &self.detail
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.detail.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.detail.remote_addr
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Invoked once per accepted connection, from the listener's accept task
pub type AcceptFn = Arc<dyn Fn(Conn) + Send + Sync>;

/// A running listener. [`close`](Self::close) stops accepting and waits
/// for the accept task; dropping the handle stops it without waiting.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            local_addr,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Bound address; differs from the requested one when port 0 was asked for
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub async fn close(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                TransportError::network_with_source("Listener task did not shut down cleanly", e)
            })?;
        }
        info!(local_addr = %self.local_addr, "Listener closed");
        Ok(())
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[async_trait]
pub trait Address: fmt::Display + fmt::Debug + Send + Sync {
    /// Connect, giving up after `timeout`. A timed-out dial leaves nothing
    /// behind.
    async fn dial(
        &self,
        name: &str,
        identity: Option<&TokenId>,
        timeout: Duration,
        config: &Configuration,
    ) -> Result<Conn>;

    /// Like [`dial`](Self::dial), with the local side bound to the interface
    /// named (or addressed) by `binding`
    async fn dial_with_local_binding(
        &self,
        name: &str,
        binding: &str,
        identity: Option<&TokenId>,
        timeout: Duration,
        config: &Configuration,
    ) -> Result<Conn>;

    async fn listen(
        &self,
        name: &str,
        identity: Option<&TokenId>,
        accept: AcceptFn,
        config: &Configuration,
    ) -> Result<ListenerHandle>;

    /// Listen or abort; for listeners a process cannot run without.
    ///
    /// # Panics
    ///
    /// If the listener cannot be created.
    async fn must_listen(
        &self,
        name: &str,
        identity: Option<&TokenId>,
        accept: AcceptFn,
        config: &Configuration,
    ) -> ListenerHandle {
        match self.listen(name, identity, accept, config).await {
            Ok(handle) => handle,
            Err(e) => panic!("unable to listen on {self}: {e}"),
        }
    }

    /// Transport tag, e.g. `tcp`
    fn address_type(&self) -> &'static str;

    fn as_host_port(&self) -> Option<&dyn HostPortAddress> {
        None
    }
}

pub trait HostPortAddress: Address {
    fn hostname(&self) -> &str;
    fn port(&self) -> u16;
}

pub trait AddressParser: Send + Sync {
    fn parse(&self, address: &str) -> Result<Arc<dyn Address>>;
}

/// Ordered set of address parsers.
///
/// Meant to be filled during startup and read afterwards. Registration and
/// lookup are both safe from any thread, but a parse racing a registration
/// may or may not see the new parser.
#[derive(Default)]
pub struct AddressRegistry {
    parsers: RwLock<Vec<Arc<dyn AddressParser>>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `tcp:` parser
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.add_parser(Arc::new(crate::tcp::TcpAddressParser));
        registry
    }

    /// Adding the same parser instance twice is a no-op
    pub fn add_parser(&self, parser: Arc<dyn AddressParser>) {
        let mut parsers = self.parsers.write();
        if parsers.iter().any(|existing| Arc::ptr_eq(existing, &parser)) {
            return;
        }
        parsers.push(parser);
    }

    pub fn len(&self) -> usize {
        self.parsers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.read().is_empty()
    }

    /// First successful parse in registration order
    pub fn parse(&self, address: &str) -> Result<Arc<dyn Address>> {
        for parser in self.parsers.read().iter() {
            match parser.parse(address) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => debug!(address, error = %e, "Parser rejected address"),
            }
        }
        Err(TransportError::unparsed_address(address))
    }
}

impl fmt::Debug for AddressRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRegistry")
            .field("parsers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NamedAddress(String);

    impl fmt::Display for NamedAddress {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "named:{}", self.0)
        }
    }

    #[async_trait]
    impl Address for NamedAddress {
        async fn dial(
            &self,
            _name: &str,
            _identity: Option<&TokenId>,
            timeout: Duration,
            _config: &Configuration,
        ) -> Result<Conn> {
            Err(TransportError::timeout("dial", timeout.as_millis() as u64))
        }

        async fn dial_with_local_binding(
            &self,
            name: &str,
            _binding: &str,
            identity: Option<&TokenId>,
            timeout: Duration,
            config: &Configuration,
        ) -> Result<Conn> {
            self.dial(name, identity, timeout, config).await
        }

        async fn listen(
            &self,
            _name: &str,
            _identity: Option<&TokenId>,
            _accept: AcceptFn,
            _config: &Configuration,
        ) -> Result<ListenerHandle> {
            Err(TransportError::network("cannot listen on a named address"))
        }

        fn address_type(&self) -> &'static str {
            "named"
        }
    }

    /// Accepts anything
    struct AnyParser;

    impl AddressParser for AnyParser {
        fn parse(&self, address: &str) -> Result<Arc<dyn Address>> {
            Ok(Arc::new(NamedAddress(address.to_string())))
        }
    }

    struct RejectParser;

    impl AddressParser for RejectParser {
        fn parse(&self, address: &str) -> Result<Arc<dyn Address>> {
            Err(TransportError::unparsed_address(address))
        }
    }

    #[test]
    fn test_empty_registry_names_input() {
        let registry = AddressRegistry::new();
        let err = registry.parse("eth0:invalid").unwrap_err();
        assert!(matches!(
            &err,
            TransportError::UnparsedAddress { address } if address == "eth0:invalid"
        ));
    }

    #[test]
    fn test_accepting_parser_makes_parse_succeed() {
        let registry = AddressRegistry::new();
        registry.add_parser(Arc::new(RejectParser));
        assert!(registry.parse("eth0:invalid").is_err());

        registry.add_parser(Arc::new(AnyParser));
        let parsed = registry.parse("eth0:invalid").unwrap();
        assert_eq!(parsed.to_string(), "named:eth0:invalid");
        assert_eq!(parsed.address_type(), "named");
        assert!(parsed.as_host_port().is_none());
    }

    #[test]
    fn test_add_parser_idempotent() {
        let registry = AddressRegistry::new();
        let parser: Arc<dyn AddressParser> = Arc::new(AnyParser);
        registry.add_parser(parser.clone());
        registry.add_parser(parser);
        assert_eq!(registry.len(), 1);

        // a distinct instance is a distinct parser
        registry.add_parser(Arc::new(AnyParser));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registration_order() {
        let registry = AddressRegistry::with_defaults();
        registry.add_parser(Arc::new(AnyParser));
        assert_eq!(registry.parse("tcp:localhost:80").unwrap().address_type(), "tcp");
        assert_eq!(registry.parse("udp:localhost:80").unwrap().address_type(), "named");
    }

    #[tokio::test]
    #[should_panic(expected = "unable to listen on named:x")]
    async fn test_must_listen_panics() {
        let addr = NamedAddress("x".into());
        let accept: AcceptFn = Arc::new(|_conn: Conn| {});
        addr.must_listen("test", None, accept, &Configuration::new()).await;
    }
}
