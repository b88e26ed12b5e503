use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::EgressError;

/// Address family of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

/// Destination of an egress rule: a single address or a CIDR network.
///
/// Only built through [`parse_target`], [`Target::network`] or from a bare
/// [`IpAddr`], so a network always has a valid prefix and no host bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    addr: IpAddr,
    /// `None` for a bare address
    prefix_len: Option<u8>,
}

impl Target {
    /// CIDR network; host bits of `addr` are cleared
    pub fn network(addr: IpAddr, prefix_len: u8) -> Result<Self, EgressError> {
        if prefix_len > max_prefix_len(addr) {
            return Err(EgressError::InvalidTarget {
                target: format!("{addr}/{prefix_len}"),
                reason: "prefix length out of range".to_string(),
            });
        }
        Ok(Self {
            addr: mask(addr, prefix_len),
            prefix_len: Some(prefix_len),
        })
    }

    pub fn family(&self) -> Family {
        match self.addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length, counting a bare address as a full-length prefix
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len.unwrap_or_else(|| max_prefix_len(self.addr))
    }

    /// Whether every address of `other` also belongs to `self`
    pub fn contains(&self, other: &Target) -> bool {
        if self.family() != other.family() || self.prefix_len() > other.prefix_len() {
            return false;
        }
        mask(other.addr(), self.prefix_len()) == self.addr
    }
}

impl From<IpAddr> for Target {
    fn from(addr: IpAddr) -> Self {
        Self {
            addr,
            prefix_len: None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix_len {
            None => write!(f, "{}", self.addr),
            Some(prefix_len) => write!(f, "{}/{prefix_len}", self.addr),
        }
    }
}

impl FromStr for Target {
    type Err = EgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_target(s)
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_target(&raw).map_err(de::Error::custom)
    }
}

/// Parse an egress target
///
/// Accepted formats:
/// - IPv4 / IPv6 address: "1.1.1.1", "2001:db8::1"
/// - CIDR network: "10.0.0.0/8", "2001:db8::/32"
///
/// Host bits of a CIDR are cleared, so "10.1.2.3/8" becomes "10.0.0.0/8".
/// Domain names, ports and bracketed IPv6 are rejected.
///
/// # Examples
/// ```
/// use egressd::net::parse_target;
///
/// let target = parse_target("2.2.0.0/16").unwrap();
/// assert_eq!(target.to_string(), "2.2.0.0/16");
/// ```
pub fn parse_target(input: &str) -> Result<Target, EgressError> {
    let invalid = |reason: &str| EgressError::InvalidTarget {
        target: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty value"));
    }

    let Some((addr_part, prefix_part)) = trimmed.split_once('/') else {
        return trimmed
            .parse::<IpAddr>()
            .map(Target::from)
            .map_err(|_| invalid("not an IP address or CIDR"));
    };

    let addr = addr_part
        .parse::<IpAddr>()
        .map_err(|_| invalid("invalid network address"))?;

    if prefix_part.is_empty() || !prefix_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("invalid prefix length"));
    }
    let prefix_len = prefix_part
        .parse::<u8>()
        .map_err(|_| invalid("invalid prefix length"))?;
    Target::network(addr, prefix_len).map_err(|_| invalid("prefix length out of range"))
}

fn max_prefix_len(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Clear host bits; a prefix longer than the address keeps every bit
fn mask(addr: IpAddr, prefix_len: u8) -> IpAddr {
    let prefix_len = u32::from(prefix_len);
    match addr {
        IpAddr::V4(v4) => {
            let mask = 32u32
                .checked_sub(prefix_len)
                .map_or(u32::MAX, |host_bits| u32::MAX.checked_shl(host_bits).unwrap_or(0));
            IpAddr::V4(Ipv4Addr::from_bits(v4.to_bits() & mask))
        }
        IpAddr::V6(v6) => {
            let mask = 128u32
                .checked_sub(prefix_len)
                .map_or(u128::MAX, |host_bits| u128::MAX.checked_shl(host_bits).unwrap_or(0));
            IpAddr::V6(Ipv6Addr::from_bits(v6.to_bits() & mask))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // === Positive test cases ===

    #[rstest]
    #[case("1.1.1.1", "1.1.1.1", Family::V4)]
    #[case("  192.168.1.1  ", "192.168.1.1", Family::V4)]
    #[case("2.2.0.0/16", "2.2.0.0/16", Family::V4)]
    #[case("10.1.2.3/8", "10.0.0.0/8", Family::V4)]
    #[case("0.0.0.0/0", "0.0.0.0/0", Family::V4)]
    #[case("1.1.1.1/32", "1.1.1.1/32", Family::V4)]
    #[case("::1", "::1", Family::V6)]
    #[case("2001:db8::/32", "2001:db8::/32", Family::V6)]
    #[case("2001:db8:ffff::1/32", "2001:db8::/32", Family::V6)]
    #[case("::/0", "::/0", Family::V6)]
    fn test_parse_valid_targets(
        #[case] input: &str,
        #[case] rendered: &str,
        #[case] family: Family,
    ) {
        let target = parse_target(input).unwrap();
        assert_eq!(target.to_string(), rendered);
        assert_eq!(target.family(), family);
    }

    // === Negative test cases ===

    #[rstest]
    #[case("", "empty string")]
    #[case("   ", "whitespace only")]
    #[case("example.com", "domain name")]
    #[case("999.999.999.999", "octets out of range")]
    #[case("192.168.1", "incomplete IP")]
    #[case("192.168.1.1:8080", "IPv4 with port")]
    #[case("[::1]", "IPv6 with brackets")]
    #[case("[::1]:8080", "IPv6 with port")]
    #[case("10.0.0.0/33", "IPv4 prefix too long")]
    #[case("2001:db8::/129", "IPv6 prefix too long")]
    #[case("10.0.0.0/", "missing prefix")]
    #[case("10.0.0.0/+8", "signed prefix")]
    #[case("10.0.0.0/8/8", "double prefix")]
    #[case("/8", "missing address")]
    fn test_parse_invalid_targets(#[case] input: &str, #[case] _description: &str) {
        let result = parse_target(input);
        assert!(
            matches!(result, Err(EgressError::InvalidTarget { .. })),
            "expected {input:?} to be rejected, got {result:?}"
        );
    }

    // === Containment ===

    #[rstest]
    #[case("1.1.0.0/16", "1.1.1.1", true)]
    #[case("1.1.0.0/16", "1.1.128.0/17", true)]
    #[case("1.1.1.1", "1.1.1.1", true)]
    #[case("1.1.1.1", "1.1.0.0/16", false)]
    #[case("1.1.0.0/16", "1.2.0.1", false)]
    #[case("0.0.0.0/0", "203.0.113.9", true)]
    #[case("0.0.0.0/0", "::1", false)]
    #[case("2001:db8::/32", "2001:db8:1::/48", true)]
    fn test_contains(#[case] outer: &str, #[case] inner: &str, #[case] expected: bool) {
        let outer = parse_target(outer).unwrap();
        let inner = parse_target(inner).unwrap();
        assert_eq!(outer.contains(&inner), expected);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let target = parse_target("2001:db8::/32").unwrap();
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, "\"2001:db8::/32\"");
        let back: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);

        let bad = serde_json::from_str::<Target>("\"not-an-ip\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_network_constructor_normalises_host_bits() {
        let target = Target::network("10.1.2.3".parse().unwrap(), 8).unwrap();
        assert_eq!(target.to_string(), "10.0.0.0/8");

        let back = parse_target(&target.to_string()).unwrap();
        assert_eq!(back, target);
    }

    #[rstest]
    #[case("1.1.1.1", 33)]
    #[case("1.1.1.1", 40)]
    #[case("2001:db8::1", 129)]
    fn test_network_constructor_rejects_long_prefix(#[case] addr: &str, #[case] prefix_len: u8) {
        let result = Target::network(addr.parse().unwrap(), prefix_len);
        assert!(matches!(result, Err(EgressError::InvalidTarget { .. })));
    }

    #[test]
    fn test_mask_saturates_on_long_prefix() {
        let v4: IpAddr = "1.1.1.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(mask(v4, 40), v4);
        assert_eq!(mask(v6, 200), v6);
        assert_eq!(mask(v4, 0), "0.0.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_bare_address_is_not_a_network() {
        let target = Target::from("1.1.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(target.to_string(), "1.1.1.1");
        assert_eq!(target.prefix_len(), 32);
        assert_ne!(target, parse_target("1.1.1.1/32").unwrap());
        assert_eq!(parse_target("1.1.1.1").unwrap(), target);
    }
}
