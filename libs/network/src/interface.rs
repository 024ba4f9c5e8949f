//! Network Interface Resolution
//!
//! Maps a local-binding hint to an interface. The hint is either an
//! interface name (`eth0`) or an IPv4 address bound to an interface that is
//! up (`10.0.0.4`). Names are tried first, then every up interface's IPv4
//! addresses in enumeration order; first match wins.
//!
//! Enumeration goes through [`InterfaceSource`] so the resolution rules can
//! be exercised without depending on the host's interface table.

use crate::{Result, TransportError};
use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_nametoindex, InterfaceFlags};
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,
    /// Administratively up
    pub up: bool,
}

/// Where interfaces and their addresses come from
pub trait InterfaceSource {
    /// Exact name lookup
    fn by_name(&self, name: &str) -> Result<Option<NetworkInterface>>;

    fn interfaces(&self) -> Result<Vec<NetworkInterface>>;

    /// Addresses bound to one interface; a failure here only skips that
    /// interface during resolution
    fn addresses(&self, iface: &NetworkInterface) -> Result<Vec<IpAddr>>;
}

/// The host's interface table via `getifaddrs(3)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn by_name(&self, name: &str) -> Result<Option<NetworkInterface>> {
        Ok(self.interfaces()?.into_iter().find(|iface| iface.name == name))
    }

    fn interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let entries = getifaddrs()?.map(|entry| {
            let up = entry.flags.contains(InterfaceFlags::IFF_UP);
            (entry.interface_name, up)
        });
        Ok(fold_interfaces(entries, |name| Ok(if_nametoindex(name)?)))
    }

    fn addresses(&self, iface: &NetworkInterface) -> Result<Vec<IpAddr>> {
        let addresses = getifaddrs()?
            .filter(|entry| entry.interface_name == iface.name)
            .filter_map(|entry| entry.address)
            .filter_map(|storage| {
                if let Some(v4) = storage.as_sockaddr_in() {
                    Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()))
                } else {
                    storage
                        .as_sockaddr_in6()
                        .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
                }
            })
            .collect();
        Ok(addresses)
    }
}

/// Collapse per-address `(name, up)` entries into one interface each.
///
/// An interface whose index cannot be looked up is skipped with a warning;
/// the rest are still returned.
fn fold_interfaces<I, F>(entries: I, index_of: F) -> Vec<NetworkInterface>
where
    I: IntoIterator<Item = (String, bool)>,
    F: Fn(&str) -> Result<u32>,
{
    let mut result: Vec<NetworkInterface> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    for (name, up) in entries {
        if let Some(existing) = result.iter_mut().find(|iface| iface.name == name) {
            existing.up |= up;
            continue;
        }
        if skipped.contains(&name) {
            continue;
        }
        match index_of(&name) {
            Ok(index) => result.push(NetworkInterface { name, index, up }),
            Err(e) => {
                warn!(
                    interface = %name,
                    error = %e,
                    "Could not look up interface index, skipping it"
                );
                skipped.push(name);
            }
        }
    }

    result
}

/// Resolve against the host's interfaces
pub fn resolve_interface(to_resolve: &str) -> Result<NetworkInterface> {
    resolve_interface_with(&SystemInterfaces, to_resolve)
}

pub fn resolve_interface_with(
    source: &dyn InterfaceSource,
    to_resolve: &str,
) -> Result<NetworkInterface> {
    if let Some(iface) = source.by_name(to_resolve)? {
        return Ok(iface);
    }

    for iface in source.interfaces()? {
        if !iface.up {
            debug!(
                interface = %iface.name,
                "Interface is down, ignoring it for address resolution"
            );
            continue;
        }

        let addresses = match source.addresses(&iface) {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(interface = %iface.name, error = %e, "Could not check interface");
                continue;
            }
        };

        for addr in addresses {
            trace!(interface = %iface.name, address = %addr, wanted = to_resolve, "Checking interface");
            if let IpAddr::V4(v4) = addr {
                if v4.to_string() == to_resolve {
                    debug!(interface = %iface.name, address = to_resolve, "Resolved interface");
                    return Ok(iface);
                }
            }
        }
    }

    Err(TransportError::interface_not_found(to_resolve))
}

/// First IPv4 address of an interface, used as the local side of a bound dial
pub fn first_ipv4(source: &dyn InterfaceSource, iface: &NetworkInterface) -> Result<IpAddr> {
    source
        .addresses(iface)?
        .into_iter()
        .find(IpAddr::is_ipv4)
        .ok_or_else(|| {
            TransportError::network(format!("interface {} has no IPv4 address", iface.name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    #[derive(Default)]
    struct FakeInterfaces {
        interfaces: Vec<NetworkInterface>,
        addresses: HashMap<String, Vec<IpAddr>>,
        broken: Vec<String>,
    }

    impl FakeInterfaces {
        fn with(mut self, name: &str, up: bool, addrs: &[IpAddr]) -> Self {
            let index = self.interfaces.len() as u32 + 1;
            self.interfaces.push(NetworkInterface {
                name: name.to_string(),
                index,
                up,
            });
            self.addresses.insert(name.to_string(), addrs.to_vec());
            self
        }

        fn broken(mut self, name: &str) -> Self {
            self.broken.push(name.to_string());
            self
        }
    }

    impl InterfaceSource for FakeInterfaces {
        fn by_name(&self, name: &str) -> Result<Option<NetworkInterface>> {
            Ok(self.interfaces.iter().find(|i| i.name == name).cloned())
        }

        fn interfaces(&self) -> Result<Vec<NetworkInterface>> {
            Ok(self.interfaces.clone())
        }

        fn addresses(&self, iface: &NetworkInterface) -> Result<Vec<IpAddr>> {
            if self.broken.contains(&iface.name) {
                return Err(TransportError::network("enumeration failed"));
            }
            Ok(self.addresses.get(&iface.name).cloned().unwrap_or_default())
        }
    }

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_name_wins_even_when_down() {
        let source = FakeInterfaces::default().with("eth9", false, &[]);
        assert_eq!(resolve_interface_with(&source, "eth9").unwrap().name, "eth9");
    }

    #[test]
    fn test_resolve_by_ipv4() {
        let source = FakeInterfaces::default()
            .with("lo", true, &[v4(127, 0, 0, 1)])
            .with("eth0", true, &[v4(10, 0, 0, 4), "fe80::1".parse().unwrap()]);
        assert_eq!(resolve_interface_with(&source, "10.0.0.4").unwrap().name, "eth0");
    }

    #[test]
    fn test_down_interfaces_skipped() {
        let source = FakeInterfaces::default()
            .with("eth0", false, &[v4(10, 0, 0, 4)])
            .with("eth1", true, &[v4(10, 0, 0, 4)]);
        assert_eq!(resolve_interface_with(&source, "10.0.0.4").unwrap().name, "eth1");
    }

    #[test]
    fn test_enumeration_failure_skipped() {
        let source = FakeInterfaces::default()
            .with("eth0", true, &[v4(10, 0, 0, 4)])
            .with("eth1", true, &[v4(10, 0, 0, 4)])
            .broken("eth0");
        assert_eq!(resolve_interface_with(&source, "10.0.0.4").unwrap().name, "eth1");
    }

    #[test]
    fn test_ipv6_not_matched() {
        let source = FakeInterfaces::default().with("eth0", true, &["::1".parse().unwrap()]);
        assert!(matches!(
            resolve_interface_with(&source, "::1"),
            Err(TransportError::InterfaceNotFound { .. })
        ));
    }

    #[test]
    fn test_not_found_names_input() {
        let source = FakeInterfaces::default().with("lo", true, &[v4(127, 0, 0, 1)]);
        let err = resolve_interface_with(&source, "no-such-name").unwrap_err();
        assert_eq!(err.to_string(), "no network interface found for no-such-name");
    }

    #[test]
    fn test_fold_merges_entries_per_interface() {
        let entries = vec![
            ("lo".to_string(), true),
            ("eth0".to_string(), false),
            ("eth0".to_string(), true),
            ("lo".to_string(), true),
        ];
        let folded = fold_interfaces(entries, |name| Ok(if name == "lo" { 1 } else { 2 }));
        assert_eq!(
            folded,
            vec![
                NetworkInterface { name: "lo".into(), index: 1, up: true },
                NetworkInterface { name: "eth0".into(), index: 2, up: true },
            ]
        );
    }

    #[test]
    fn test_fold_skips_interface_without_index() {
        let lookups = std::cell::Cell::new(0);
        let entries = vec![
            ("gone0".to_string(), true),
            ("eth0".to_string(), true),
            ("gone0".to_string(), true),
        ];
        let folded = fold_interfaces(entries, |name| {
            lookups.set(lookups.get() + 1);
            if name == "gone0" {
                Err(TransportError::network("no such device"))
            } else {
                Ok(3)
            }
        });
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].name, "eth0");
        assert_eq!(lookups.get(), 2);
    }

    #[test]
    fn test_first_ipv4() {
        let source = FakeInterfaces::default()
            .with("eth0", true, &["fe80::1".parse().unwrap(), v4(10, 0, 0, 4)])
            .with("v6only", true, &["fe80::2".parse().unwrap()]);
        let eth0 = source.by_name("eth0").unwrap().unwrap();
        assert_eq!(first_ipv4(&source, &eth0).unwrap(), v4(10, 0, 0, 4));

        let v6only = source.by_name("v6only").unwrap().unwrap();
        assert!(first_ipv4(&source, &v6only).is_err());
    }
}
