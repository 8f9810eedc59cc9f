use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// True when the address is private, loopback, link-local, CGNAT or in 0.0.0.0/8.
pub fn is_blocked_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

pub fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    match a {
        0 | 10 | 127 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        169 => b == 254,
        // 100.64.0.0/10
        100 => (b & 0xc0) == 64,
        _ => false,
    }
}

pub fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = embedded_ipv4(ip) {
        return is_blocked_ipv4(v4);
    }
    let first = ip.segments()[0];
    // fc00::/7 unique-local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// IPv4-mapped (`::ffff:a.b.c.d`) or IPv4-compatible (`::a.b.c.d`) payload.
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let s = ip.segments();
    if s[..6].iter().all(|&seg| seg == 0) {
        let [.., a, b, c, d] = ip.octets();
        return Some(Ipv4Addr::new(a, b, c, d));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(s: &str) -> bool {
        is_blocked_address(s.parse().unwrap())
    }

    #[test]
    fn private_and_reserved_ipv4_ranges() {
        for ip in [
            "10.0.0.1",
            "10.255.255.255",
            "127.0.0.1",
            "127.8.9.10",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "100.127.255.255",
            "0.0.0.0",
            "0.1.2.3",
        ] {
            assert!(blocked(ip), "{ip} should be blocked");
        }
    }

    #[test]
    fn range_edges_stay_public() {
        for ip in [
            "9.255.255.255",
            "11.0.0.0",
            "172.15.255.255",
            "172.32.0.0",
            "192.167.255.255",
            "192.169.0.0",
            "169.253.255.255",
            "100.63.255.255",
            "100.128.0.0",
            "1.1.1.1",
            "93.184.216.34",
        ] {
            assert!(!blocked(ip), "{ip} should be allowed");
        }
    }

    #[test]
    fn ipv6_ranges() {
        assert!(blocked("::1"));
        assert!(blocked("::"));
        assert!(blocked("fd00::1"));
        assert!(blocked("fc12:3456::1"));
        assert!(blocked("fe80::1"));
        assert!(blocked("::ffff:127.0.0.1"));
        assert!(blocked("::ffff:10.1.2.3"));
        assert!(blocked("::192.168.0.1"));
        assert!(!blocked("2606:4700:4700::1111"));
        assert!(!blocked("::ffff:8.8.8.8"));
    }
}
