pub mod manager;
pub mod ruleset;
pub mod runner;

pub use manager::{NftManager, PolicyEnforcer};
pub use ruleset::build_ruleset;
pub use runner::{NftCommand, NftRunner};

/// Table owned by the daemon; nothing outside it is touched
pub const TABLE_NAME: &str = "opensandbox";
pub const CHAIN_NAME: &str = "egress";
/// Packet mark exempting host-originated traffic from the policy
pub const BYPASS_MARK: &str = "0x1";

pub const ALLOW_V4_SET: &str = "allow_v4";
pub const ALLOW_V6_SET: &str = "allow_v6";
pub const DENY_V4_SET: &str = "deny_v4";
pub const DENY_V6_SET: &str = "deny_v6";
pub const DOH_V4_SET: &str = "doh_v4";
pub const DOH_V6_SET: &str = "doh_v6";
pub const DOH_PORT: u16 = 443;
