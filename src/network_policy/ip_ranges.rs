//! Address classification for SSRF protection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// True for any address a public navigation target must never resolve to:
/// RFC1918 private, RFC4193 unique-local, loopback, link-local, unspecified,
/// broadcast, and IPv4-mapped IPv6 forms of those.
#[must_use]
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 0.0.0.0/8 "this network"
        || ip.octets()[0] == 0
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_forbidden_v4(mapped);
    }

    ip.is_loopback() || ip.is_unspecified() || ip.is_unique_local() || ip.is_unicast_link_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forbidden(addr: &str) -> bool {
        addr.parse::<IpAddr>().map(is_forbidden_ip).unwrap_or(false)
    }

    #[test]
    fn rejects_private_and_loopback_v4() {
        for addr in [
            "10.0.0.1",
            "10.255.255.255",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.1.1",
            "127.0.0.1",
            "127.8.9.10",
            "169.254.169.254",
            "0.0.0.0",
            "255.255.255.255",
        ] {
            assert!(forbidden(addr), "{addr} should be forbidden");
        }
    }

    #[test]
    fn accepts_public_v4() {
        for addr in ["93.184.216.34", "8.8.8.8", "172.32.0.1", "172.15.255.255", "1.1.1.1"] {
            assert!(!forbidden(addr), "{addr} should be allowed");
        }
    }

    #[test]
    fn rejects_local_v6_ranges() {
        for addr in ["::1", "::", "fc00::1", "fd12:3456::1", "fe80::1", "::ffff:127.0.0.1", "::ffff:10.1.2.3"] {
            assert!(forbidden(addr), "{addr} should be forbidden");
        }
    }

    #[test]
    fn accepts_public_v6() {
        for addr in ["2606:2800:220:1:248:1893:25c8:1946", "2001:4860:4860::8888", "::ffff:93.184.216.34"] {
            assert!(!forbidden(addr), "{addr} should be allowed");
        }
    }
}
