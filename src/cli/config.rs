use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::EgressError,
    policy::{EnforcementMode, NetworkPolicy, RawPolicy},
};

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub enforcement: EnforcementConfig,
    #[serde(default)]
    pub doh: DohConfig,
    /// Policy enforced at startup
    #[serde(default)]
    pub policy: Option<RawPolicy>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:18080" or ":18080"
    pub addr: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EnforcementConfig {
    pub mode: Option<EnforcementMode>,
    pub apply_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DohConfig {
    #[serde(default)]
    pub block_443: bool,
    #[serde(default)]
    pub blocklist: Vec<String>,
}

impl ConfigFile {
    /// Load configuration file
    pub fn load(path: &Path) -> Result<Self, EgressError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| EgressError::ConfigParse {
            path: PathBuf::from(path),
            source,
        })
    }

    /// Validate the `[policy]` table, if present
    pub fn initial_policy(&self) -> Result<Option<NetworkPolicy>, EgressError> {
        self.policy
            .clone()
            .map(NetworkPolicy::try_from)
            .transpose()
            .map_err(|err| EgressError::InvalidConfig {
                field: "policy".to_string(),
                reason: err.to_string(),
            })
    }
}
