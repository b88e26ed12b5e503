use thiserror::Error;

use std::{path::PathBuf, time::Duration};

use crate::nftables::TABLE_NAME;

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("invalid policy: {reason}")]
    InvalidPolicy { reason: String },

    #[error("invalid egress target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("nft apply failed: {status} (output: {output})")]
    NftFailed { status: String, output: String },

    #[error("failed to run nft: {source}")]
    NftSpawn {
        #[source]
        source: std::io::Error,
    },

    #[error("nft apply timed out after {timeout:?}")]
    ApplyTimeout { timeout: Duration },

    #[error("nft apply cancelled")]
    ApplyCancelled,

    #[error("failed to commit policy to DNS proxy: {reason}")]
    PolicyCommit { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl EgressError {
    /// nft was abandoned mid-run; it may or may not have committed its batch.
    pub fn leaves_kernel_unknown(&self) -> bool {
        matches!(
            self,
            EgressError::ApplyTimeout { .. } | EgressError::ApplyCancelled
        )
    }

    /// A fresh host has no table to delete yet; nft reports ENOENT against
    /// the `delete table` statement.
    pub fn is_missing_table(&self) -> bool {
        let EgressError::NftFailed { .. } = self else {
            return false;
        };
        let msg = self.to_string().to_lowercase();
        msg.contains("no such file or directory")
            && msg.contains(&format!("delete table inet {TABLE_NAME}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_signature_is_detected() {
        let err = EgressError::NftFailed {
            status: "exit status: 1".to_string(),
            output: "/dev/stdin:1:19-29: Error: No such file or directory; did you mean table 'opensandbox' in family inet?\ndelete table inet opensandbox\n                  ^^^^^^^^^^^".to_string(),
        };
        assert!(err.is_missing_table());
    }

    #[test]
    fn other_nft_failures_are_not_bootstrap_errors() {
        let err = EgressError::NftFailed {
            status: "exit status: 1".to_string(),
            output: "Error: Operation not permitted".to_string(),
        };
        assert!(!err.is_missing_table());

        let enoent_elsewhere = EgressError::NftFailed {
            status: "exit status: 1".to_string(),
            output: "Error: No such file or directory\nadd rule inet opensandbox egress".to_string(),
        };
        assert!(!enoent_elsewhere.is_missing_table());
    }

    #[test]
    fn spawn_errors_are_not_bootstrap_errors() {
        let err = EgressError::NftSpawn {
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory; delete table inet opensandbox",
            ),
        };
        assert!(!err.is_missing_table());
    }

    #[test]
    fn abandoned_runs_leave_kernel_unknown() {
        let timeout = EgressError::ApplyTimeout {
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.leaves_kernel_unknown());
        assert!(EgressError::ApplyCancelled.leaves_kernel_unknown());

        let failed = EgressError::NftFailed {
            status: "exit status: 1".to_string(),
            output: "Error: syntax error".to_string(),
        };
        assert!(!failed.leaves_kernel_unknown());
    }
}
