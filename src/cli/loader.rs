use std::{
    net::SocketAddr,
    time::Duration,
};

use crate::{
    error::EgressError,
    net::{Target, parse_target},
    nftables::manager::DEFAULT_APPLY_TIMEOUT,
    policy::{EnforcementMode, NetworkPolicy, parse_policy},
};

use super::args::Args;
use super::config::ConfigFile;

pub const DEFAULT_HTTP_ADDR: &str = ":18080";

/// Process-wide settings, fixed after startup
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mode: EnforcementMode,
    pub http_addr: SocketAddr,
    pub token: Option<String>,
    pub initial_policy: Option<NetworkPolicy>,
    /// Empty unless DoH blocking is enabled
    pub doh_blocklist: Vec<Target>,
    pub apply_timeout: Duration,
}

/// Merge command line arguments (and their environment variables) with the config file
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings; arguments take precedence over the config file
    pub fn load(args: &Args) -> Result<Settings, EgressError> {
        let config = match args.config.as_ref() {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        let mode = args
            .mode
            .or(config.enforcement.mode)
            .unwrap_or_default();

        let http_addr = parse_listen_addr(
            args.http_addr
                .as_deref()
                .or(config.server.addr.as_deref())
                .unwrap_or(DEFAULT_HTTP_ADDR),
        )?;

        let token = args
            .token
            .clone()
            .or_else(|| config.server.token.clone())
            .filter(|token| !token.is_empty());

        let initial_policy = match args.rules.as_deref() {
            Some(rules) if !rules.trim().is_empty() => {
                Some(parse_policy(rules).map_err(|err| EgressError::InvalidConfig {
                    field: "rules".to_string(),
                    reason: err.to_string(),
                })?)
            }
            _ => config.initial_policy()?,
        };

        let block_doh = args.block_doh_443.unwrap_or(config.doh.block_443);
        let entries = if args.doh_blocklist.is_empty() {
            &config.doh.blocklist
        } else {
            &args.doh_blocklist
        };
        let doh_blocklist = if block_doh {
            parse_blocklist(entries)?
        } else {
            Vec::new()
        };
        if block_doh && doh_blocklist.is_empty() {
            log::warn!("DoH blocking enabled but the blocklist is empty");
        }

        let apply_timeout = match args
            .apply_timeout_secs
            .or(config.enforcement.apply_timeout_secs)
        {
            Some(0) => {
                return Err(EgressError::InvalidConfig {
                    field: "apply_timeout_secs".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_APPLY_TIMEOUT,
        };

        Ok(Settings {
            mode,
            http_addr,
            token,
            initial_policy,
            doh_blocklist,
            apply_timeout,
        })
    }
}

/// Parse a listen address; ":PORT" binds all IPv4 interfaces
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr, EgressError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.starts_with(':') {
        format!("0.0.0.0{trimmed}")
    } else {
        trimmed.to_string()
    };
    candidate
        .parse::<SocketAddr>()
        .map_err(|err| EgressError::InvalidConfig {
            field: "http_addr".to_string(),
            reason: format!("'{raw}': {err}"),
        })
}

fn parse_blocklist(entries: &[String]) -> Result<Vec<Target>, EgressError> {
    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            parse_target(entry).map_err(|err| EgressError::InvalidConfig {
                field: "doh_blocklist".to_string(),
                reason: err.to_string(),
            })
        })
        .collect()
}
