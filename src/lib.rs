pub mod cli;
pub mod error;
pub mod net;
pub mod nftables;
pub mod policy;
pub mod server;
