use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::{error::EgressError, net::Target, policy::NetworkPolicy};

use super::{TABLE_NAME, build_ruleset, runner::NftRunner};

pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Packet-filter enforcement abstraction for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyEnforcer: Send + Sync + 'static {
    async fn apply(
        &self,
        cancel: &CancellationToken,
        policy: &NetworkPolicy,
    ) -> Result<(), EgressError>;
}

/// Applies static IP/CIDR policy to nftables through an [`NftRunner`]
pub struct NftManager<R: NftRunner> {
    runner: R,
    doh_blocklist: Vec<Target>,
    timeout: Duration,
}

impl<R: NftRunner> NftManager<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            doh_blocklist: Vec::new(),
            timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }

    /// Drop TCP/443 towards these resolvers regardless of policy
    pub fn with_doh_blocklist(mut self, blocklist: Vec<Target>) -> Self {
        self.doh_blocklist = blocklist;
        self
    }

    /// Deadline for a single runner invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the owned table with the ruleset for `policy`.
    ///
    /// `None` applies the default-deny policy. On a fresh host the leading
    /// `delete table` fails because the table does not exist yet; the same
    /// program is then resubmitted once without that line. If the retry
    /// fails too, the first error is returned.
    pub async fn apply_static(
        &self,
        cancel: &CancellationToken,
        policy: Option<&NetworkPolicy>,
    ) -> Result<(), EgressError> {
        let default_policy;
        let policy = match policy {
            Some(policy) => policy,
            None => {
                default_policy = NetworkPolicy::default_deny();
                &default_policy
            }
        };

        let script = build_ruleset(policy, &self.doh_blocklist);
        log::debug!("Applying nftables ruleset:\n{script}");

        let err = match self.run_bounded(cancel, &script).await {
            Ok(_) => {
                log::info!(
                    "Applied nftables ruleset ({} rules, default {})",
                    policy.egress().len(),
                    policy.default_action()
                );
                return Ok(());
            }
            Err(err) => err,
        };

        if err.is_missing_table() {
            let fallback = remove_delete_table_line(&script);
            if fallback != script {
                log::info!("Table inet {TABLE_NAME} not present yet, retrying without delete");
                match self.run_bounded(cancel, &fallback).await {
                    Ok(_) => {
                        log::info!("Created nftables table inet {TABLE_NAME}");
                        return Ok(());
                    }
                    Err(retry_err) => {
                        log::warn!("Retry without delete table failed: {retry_err}");
                    }
                }
            }
        }

        log::error!("Failed to apply nftables ruleset: {err}");
        Err(err)
    }

    async fn run_bounded(
        &self,
        cancel: &CancellationToken,
        script: &str,
    ) -> Result<String, EgressError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EgressError::ApplyCancelled),
            result = tokio::time::timeout(self.timeout, self.runner.run(script)) => {
                result.unwrap_or(Err(EgressError::ApplyTimeout { timeout: self.timeout }))
            }
        }
    }
}

#[async_trait]
impl<R: NftRunner> PolicyEnforcer for NftManager<R> {
    async fn apply(
        &self,
        cancel: &CancellationToken,
        policy: &NetworkPolicy,
    ) -> Result<(), EgressError> {
        self.apply_static(cancel, Some(policy)).await
    }
}

fn remove_delete_table_line(script: &str) -> String {
    let delete_stmt = format!("delete table inet {TABLE_NAME}");
    let mut filtered = script
        .lines()
        .filter(|line| !line.starts_with(&delete_stmt) && !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    filtered.push('\n');
    filtered
}
