pub mod mode;
pub mod model;
pub mod sets;

// Re-export main types for convenience
pub use mode::EnforcementMode;
pub use model::{Action, EgressRule, NetworkPolicy, RawPolicy, RawRule, parse_policy};
pub use sets::StaticIpSets;
