//! Network interface enumeration and classification (C7).
//!
//! Used by the supervisor to auto-resolve a bind IP when none is given on
//! the command line, and to drive the network-liveness monitor's "is this
//! IP still present on an interface" check.

use get_if_addrs::{get_if_addrs, IfAddr};
use std::net::Ipv4Addr;

/// Coarse classification of a network, in priority order for bind-IP
/// auto-resolution (home networks first, then private, then everything
/// else; virtual adapters last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkKind {
    Home,
    Private,
    Other,
    Virtual,
}

/// One IPv4-bearing interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub kind: NetworkKind,
}

/// Classifies an interface the same way the diagnostic tool this crate's
/// bind-IP heuristic is modeled on does: name patterns first (virtual
/// adapters always lose to a real link even if their IP looks private),
/// then IP range.
pub fn classify(name: &str, ip: Ipv4Addr) -> NetworkKind {
    let name_lower = name.to_lowercase();
    let is_virtual_name = name_lower.contains("vethernet")
        || name_lower.contains("hyper-v")
        || name_lower.contains("vmware")
        || name_lower.contains("virtualbox")
        || name_lower.contains("veth")
        || name_lower.contains("docker")
        || name_lower.contains("loopback");

    let octets = ip.octets();
    if is_virtual_name {
        return NetworkKind::Virtual;
    }
    if octets[0] == 192 && octets[1] == 168 {
        return NetworkKind::Home;
    }
    if octets[0] == 10 {
        return NetworkKind::Private;
    }
    if octets[0] == 172 && (16..=31).contains(&octets[1]) {
        return NetworkKind::Private;
    }
    NetworkKind::Other
}

/// Enumerates every non-loopback IPv4 address on the host, classified by
/// [`classify`].
pub fn list_interfaces() -> std::io::Result<Vec<InterfaceInfo>> {
    let all = get_if_addrs()?;
    let mut result = Vec::new();
    for iface in all {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            let kind = classify(&iface.name, v4.ip);
            result.push(InterfaceInfo {
                name: iface.name,
                ip: v4.ip,
                kind,
            });
        }
    }
    Ok(result)
}

/// Picks the best bind candidate: lowest [`NetworkKind`] (home is
/// preferred over private, private over other, other over virtual), first
/// match wins ties.
pub fn best_bind_candidate(interfaces: &[InterfaceInfo]) -> Option<&InterfaceInfo> {
    interfaces.iter().min_by_key(|i| i.kind)
}

/// True if `ip` is still present on some non-loopback interface. Used by
/// the network monitor to detect an unplugged cable or a dropped Wi-Fi
/// association.
pub fn ip_is_present(ip: Ipv4Addr) -> std::io::Result<bool> {
    Ok(list_interfaces()?.iter().any(|i| i.ip == ip))
}

/// Auto-resolves a bind address the way the supervisor's startup step does:
/// prefer a named Ethernet link, then Wi-Fi, then anything else whose name
/// looks like a real link (`eth`/`en`), then the first non-loopback
/// interface at all, and only fall back to `0.0.0.0` if nothing was found.
pub fn resolve_bind_ip(interfaces: &[InterfaceInfo]) -> Ipv4Addr {
    let named = |pred: &dyn Fn(&str) -> bool| {
        interfaces
            .iter()
            .find(|i| pred(&i.name.to_lowercase()))
            .map(|i| i.ip)
    };

    named(&|n| n.contains("ethernet"))
        .or_else(|| named(&|n| n.contains("wi-fi") || n.contains("wifi") || n.contains("wlan")))
        .or_else(|| named(&|n| n.contains("eth") || n.contains("en")))
        .or_else(|| interfaces.first().map(|i| i.ip))
        .unwrap_or(Ipv4Addr::UNSPECIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_network_ranges_classify_as_home() {
        assert_eq!(
            classify("eth0", Ipv4Addr::new(192, 168, 1, 42)),
            NetworkKind::Home
        );
        assert_eq!(
            classify("eth0", Ipv4Addr::new(192, 168, 0, 10)),
            NetworkKind::Home
        );
    }

    #[test]
    fn ten_dot_range_classifies_as_private() {
        assert_eq!(
            classify("eth0", Ipv4Addr::new(10, 0, 0, 5)),
            NetworkKind::Private
        );
    }

    #[test]
    fn hyperv_name_overrides_private_looking_ip() {
        assert_eq!(
            classify("vEthernet (WSL)", Ipv4Addr::new(172, 20, 0, 1)),
            NetworkKind::Virtual
        );
    }

    #[test]
    fn unmatched_ranges_classify_as_other() {
        assert_eq!(
            classify("eth0", Ipv4Addr::new(8, 8, 8, 8)),
            NetworkKind::Other
        );
    }

    #[test]
    fn best_candidate_prefers_home_over_private() {
        let interfaces = vec![
            InterfaceInfo {
                name: "eth0".into(),
                ip: Ipv4Addr::new(10, 0, 0, 5),
                kind: NetworkKind::Private,
            },
            InterfaceInfo {
                name: "wlan0".into(),
                ip: Ipv4Addr::new(192, 168, 1, 10),
                kind: NetworkKind::Home,
            },
        ];
        let best = best_bind_candidate(&interfaces).unwrap();
        assert_eq!(best.ip, Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn resolve_bind_ip_prefers_ethernet_over_wifi() {
        let interfaces = vec![
            InterfaceInfo {
                name: "Wi-Fi".into(),
                ip: Ipv4Addr::new(192, 168, 1, 5),
                kind: NetworkKind::Home,
            },
            InterfaceInfo {
                name: "Ethernet".into(),
                ip: Ipv4Addr::new(10, 0, 0, 2),
                kind: NetworkKind::Private,
            },
        ];
        assert_eq!(resolve_bind_ip(&interfaces), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn resolve_bind_ip_falls_back_to_unspecified_when_empty() {
        assert_eq!(resolve_bind_ip(&[]), Ipv4Addr::UNSPECIFIED);
    }
}
