pub mod parser;

// Re-export main types and functions
pub use parser::{Family, Target, parse_target};
