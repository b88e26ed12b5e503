use std::path::PathBuf;

use clap::{Parser, builder::BoolishValueParser};

use crate::policy::EnforcementMode;

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Egress policy daemon keeping an nftables ruleset and the DNS proxy in step"
)]
pub struct Args {
    /// Path to configuration file (TOML)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enforcement layers: "dns" or "dns+nft"
    #[arg(long = "mode", env = "OPENSANDBOX_EGRESS_MODE")]
    pub mode: Option<EnforcementMode>,

    /// Control plane listen address (":PORT" listens on all interfaces)
    #[arg(long = "http-addr", env = "OPENSANDBOX_EGRESS_HTTP_ADDR")]
    pub http_addr: Option<String>,

    /// Shared secret required as bearer token on policy writes
    #[arg(long = "token", env = "OPENSANDBOX_EGRESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Initial policy as JSON
    #[arg(long = "rules", env = "OPENSANDBOX_EGRESS_RULES")]
    pub rules: Option<String>,

    /// Drop TCP/443 to the DoH resolvers in --doh-blocklist
    #[arg(
        long = "block-doh-443",
        env = "OPENSANDBOX_EGRESS_BLOCK_DOH_443",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub block_doh_443: Option<bool>,

    /// DoH resolver addresses (IP/CIDR)
    #[arg(
        long = "doh-blocklist",
        env = "OPENSANDBOX_EGRESS_DOH_BLOCKLIST",
        value_delimiter = ','
    )]
    pub doh_blocklist: Vec<String>,

    /// Deadline in seconds for one nft invocation
    #[arg(long = "apply-timeout-secs", value_name = "SECS")]
    pub apply_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = Args::try_parse_from([
            "egressd",
            "--mode",
            "dns+nft",
            "--http-addr",
            ":9090",
            "--token",
            "s3cret",
            "--block-doh-443",
            "--doh-blocklist",
            "8.8.8.8,1.1.1.1",
            "--apply-timeout-secs",
            "5",
        ])
        .unwrap();

        assert_eq!(args.mode, Some(EnforcementMode::DnsNft));
        assert_eq!(args.http_addr.as_deref(), Some(":9090"));
        assert_eq!(args.token.as_deref(), Some("s3cret"));
        assert_eq!(args.block_doh_443, Some(true));
        assert_eq!(args.doh_blocklist, vec!["8.8.8.8", "1.1.1.1"]);
        assert_eq!(args.apply_timeout_secs, Some(5));
    }

    #[test]
    fn block_doh_accepts_explicit_value() {
        let args = Args::try_parse_from(["egressd", "--block-doh-443", "false"]).unwrap();
        assert_eq!(args.block_doh_443, Some(false));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Args::try_parse_from(["egressd", "--mode", "iptables"]).is_err());
    }
}
