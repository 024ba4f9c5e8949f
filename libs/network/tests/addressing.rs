//! Address parsing, configuration files and host interface resolution

use edge_network::{
    resolve_interface, Address, AddressRegistry, Configuration, HostPortAddress, ProxyType,
    TcpAddress, TransportError,
};
use proptest::prelude::*;
use std::io::Write;
use std::sync::Arc;

#[test]
fn test_unregistered_prefix_fails_naming_input() {
    let registry = AddressRegistry::with_defaults();
    match registry.parse("eth0:invalid") {
        Err(TransportError::UnparsedAddress { address }) => assert_eq!(address, "eth0:invalid"),
        other => panic!("Expected UnparsedAddress, got {other:?}"),
    }
}

#[test]
fn test_default_registry_parses_tcp() {
    let registry = AddressRegistry::with_defaults();
    let addr = registry.parse("tcp:[fd00::7]:6262").unwrap();
    let host_port = addr.as_host_port().unwrap();
    assert_eq!(host_port.hostname(), "fd00::7");
    assert_eq!(host_port.port(), 6262);
    assert_eq!(addr.to_string(), "tcp:[fd00::7]:6262");
}

#[test]
fn test_registry_shared_across_threads() {
    let registry = Arc::new(AddressRegistry::with_defaults());
    let handles: Vec<_> = (0..4u16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                registry
                    .parse(&format!("tcp:10.0.0.{i}:{}", 7000 + i))
                    .map(|a| a.to_string())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(
            handle.join().unwrap().unwrap(),
            format!("tcp:10.0.0.{i}:{}", 7000 + i)
        );
    }
}

#[test]
fn test_configuration_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "protocol: [ziti-edge, h2]\nproxy:\n  type: http\n  address: proxy.internal:3128\n  username: edge\nkeepalive: 30"
    )
    .unwrap();

    let cfg = Configuration::from_file(file.path()).unwrap();
    assert_eq!(cfg.protocols(), vec!["ziti-edge", "h2"]);

    let proxy = cfg.get_proxy_configuration().unwrap().unwrap();
    assert_eq!(proxy.proxy_type, ProxyType::HttpConnect);
    assert_eq!(proxy.address, "proxy.internal:3128");
    let auth = proxy.auth.as_ref().unwrap();
    assert_eq!(auth.user, "edge");
    assert_eq!(auth.password, None);

    let again = cfg.get_proxy_configuration().unwrap().unwrap();
    assert!(Arc::ptr_eq(&proxy, &again));
}

#[test]
fn test_configuration_missing_file() {
    let err = Configuration::from_file("/nonexistent/edge-transport.yaml").unwrap_err();
    assert_eq!(err.category(), "io");
}

#[test]
fn test_resolve_loopback_by_address() {
    let iface = resolve_interface("127.0.0.1").unwrap();
    assert!(iface.up);
    assert!(iface.index > 0);

    // the name we just found resolves to itself
    assert_eq!(resolve_interface(&iface.name).unwrap(), iface);
}

#[test]
fn test_resolve_unknown_fails() {
    match resolve_interface("no-such-name") {
        Err(TransportError::InterfaceNotFound { name }) => assert_eq!(name, "no-such-name"),
        other => panic!("Expected InterfaceNotFound, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn prop_tcp_address_reparses(host in "[a-z][a-z0-9-]{0,20}(\\.[a-z][a-z0-9-]{0,10}){0,3}", port: u16) {
        let addr = TcpAddress::new(host.clone(), port);
        let parsed = TcpAddress::parse(&addr.to_string()).unwrap();
        prop_assert_eq!(parsed.hostname(), host.as_str());
        prop_assert_eq!(parsed.port(), port);
    }

    #[test]
    fn prop_tcp_ipv6_reparses(segments: [u16; 8], port: u16) {
        let ip = std::net::Ipv6Addr::new(
            segments[0], segments[1], segments[2], segments[3],
            segments[4], segments[5], segments[6], segments[7],
        );
        let addr = TcpAddress::new(ip.to_string(), port);
        let parsed = TcpAddress::parse(&addr.to_string()).unwrap();
        prop_assert_eq!(parsed, addr);
    }
}
