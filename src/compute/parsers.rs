//! Parsers for diagnostic command output gathered from instances.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;

use crate::backend::{Address, AddressKind};

#[expect(
    clippy::expect_used,
    reason = "the pattern is a literal and is covered by tests"
)]
static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+inet (\d+\.\d+\.\d+\.\d+)/(\d+)").expect("IPv4 pattern should compile")
});

#[expect(
    clippy::expect_used,
    reason = "the pattern is a literal and is covered by tests"
)]
static IPV6_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+inet6 ([a-fA-F0-9:]+)/(\d+)").expect("IPv6 pattern should compile")
});

/// Extracts every address listed by `ip addr`, IPv4 first.
///
/// Private IPv4 ranges (10/8, 172.16/12, 192.168/16) and IPv6 unique local
/// addresses (fc00::/7) are marked as not publicly routable.
#[must_use]
pub fn parse_ip_addr_output(output: &str) -> Vec<Address> {
    let ipv4 = IPV4_PATTERN.captures_iter(output).filter_map(|caps| {
        let address = caps.get(1)?.as_str();
        let netmask = caps.get(2)?.as_str();
        Some(Address {
            address: address.to_owned(),
            netmask: netmask.to_owned(),
            kind: AddressKind::Ipv4,
            is_publicly_routable: ipv4_is_routable(address),
        })
    });
    let ipv6 = IPV6_PATTERN.captures_iter(output).filter_map(|caps| {
        let address = caps.get(1)?.as_str();
        let netmask = caps.get(2)?.as_str();
        Some(Address {
            address: address.to_owned(),
            netmask: netmask.to_owned(),
            kind: AddressKind::Ipv6,
            is_publicly_routable: ipv6_is_routable(address),
        })
    });
    ipv4.chain(ipv6).collect()
}

fn ipv4_is_routable(address: &str) -> bool {
    address
        .parse::<Ipv4Addr>()
        .is_ok_and(|parsed| !parsed.is_private())
}

fn ipv6_is_routable(address: &str) -> bool {
    address.parse::<Ipv6Addr>().is_ok_and(|parsed| {
        // fc00::/7
        parsed
            .segments()
            .first()
            .is_some_and(|segment| segment & 0xfe00 != 0xfc00)
    })
}
