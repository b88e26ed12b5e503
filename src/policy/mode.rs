use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::EgressError;

/// Which enforcement layers the daemon drives. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnforcementMode {
    /// DNS proxy only
    #[default]
    #[serde(rename = "dns")]
    Dns,
    /// DNS proxy plus the nftables packet filter
    #[serde(rename = "dns+nft")]
    DnsNft,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementMode::Dns => "dns",
            EnforcementMode::DnsNft => "dns+nft",
        }
    }

    pub fn uses_nft(&self) -> bool {
        matches!(self, EnforcementMode::DnsNft)
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementMode {
    type Err = EgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dns" => Ok(EnforcementMode::Dns),
            "dns+nft" => Ok(EnforcementMode::DnsNft),
            other => Err(EgressError::InvalidConfig {
                field: "mode".to_string(),
                reason: format!("unknown enforcement mode '{other}': expected dns or dns+nft"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("dns", EnforcementMode::Dns)]
    #[case("dns+nft", EnforcementMode::DnsNft)]
    fn parses_known_modes(#[case] input: &str, #[case] expected: EnforcementMode) {
        assert_eq!(input.parse::<EnforcementMode>().unwrap(), expected);
    }

    #[rstest]
    #[case("nft")]
    #[case("DNS+NFT")]
    #[case(" dns ")]
    #[case("")]
    fn rejects_unknown_mode(#[case] input: &str) {
        assert!(matches!(
            input.parse::<EnforcementMode>(),
            Err(EgressError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn serializes_as_wire_names() {
        assert_eq!(
            serde_json::to_string(&EnforcementMode::DnsNft).unwrap(),
            "\"dns+nft\""
        );
        assert!(!EnforcementMode::Dns.uses_nft());
        assert!(EnforcementMode::DnsNft.uses_nft());
    }
}
