pub mod auth;
pub mod routes;
pub mod store;

use std::{fmt, sync::Arc};

use axum::http::HeaderMap;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    error::EgressError,
    nftables::PolicyEnforcer,
    policy::{EnforcementMode, NetworkPolicy, parse_policy},
};

pub use routes::{router, serve};
pub use store::{PolicyStore, SharedPolicyStore};

/// Step of a policy write at which it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Validate,
    Apply,
    Commit,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteStage::Validate => "validation",
            WriteStage::Apply => "packet filter apply",
            WriteStage::Commit => "DNS proxy commit",
        })
    }
}

/// A rejected policy write.
///
/// `kernel_applied` tells whether the packet filter already enforces the new
/// policy while the DNS proxy still holds the previous one. `None` when an
/// nft run was abandoned and the kernel may hold either ruleset.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct WriteError {
    pub stage: WriteStage,
    pub kernel_applied: Option<bool>,
    #[source]
    pub source: EgressError,
}

/// Read-only view returned by `GET /policy`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySnapshot {
    #[serde(flatten)]
    pub policy: NetworkPolicy,
    pub enforcement_mode: EnforcementMode,
}

/// Control plane keeping the packet filter and the DNS proxy in step.
///
/// Holds no policy itself: the [`PolicyStore`] is the source of truth for
/// what is enforced. A write reaches the store only after the packet filter
/// (when the mode includes it) accepted the same policy.
pub struct PolicyServer {
    store: Arc<dyn PolicyStore>,
    enforcer: Option<Arc<dyn PolicyEnforcer>>,
    mode: EnforcementMode,
    token: Option<String>,
    shutdown: CancellationToken,
}

impl PolicyServer {
    pub fn new(store: Arc<dyn PolicyStore>, mode: EnforcementMode) -> Self {
        Self {
            store,
            enforcer: None,
            mode,
            token: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Packet-filter layer; consulted only in `dns+nft` mode
    pub fn with_enforcer(mut self, enforcer: Arc<dyn PolicyEnforcer>) -> Self {
        self.enforcer = Some(enforcer);
        self
    }

    /// Shared secret required on writes; empty means no authentication
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|token| !token.is_empty());
        self
    }

    /// Cancelling this token aborts in-flight packet-filter applies
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        match &self.token {
            None => true,
            Some(expected) => auth::token_matches(expected, auth::bearer_token(headers)),
        }
    }

    /// Currently committed policy, falling back to default deny
    pub fn handle_read(&self) -> PolicySnapshot {
        let policy = self
            .store
            .current_policy()
            .map(|policy| policy.as_ref().clone())
            .unwrap_or_default();
        PolicySnapshot {
            policy,
            enforcement_mode: self.mode,
        }
    }

    /// Validate a JSON policy body, then commit it
    pub async fn handle_write(&self, body: &[u8]) -> Result<Arc<NetworkPolicy>, WriteError> {
        let policy = parse_policy(body).map_err(|source| {
            log::warn!("Rejected policy update: {source}");
            WriteError {
                stage: WriteStage::Validate,
                kernel_applied: Some(false),
                source,
            }
        })?;
        self.commit(policy).await
    }

    /// Enforce a validated policy: packet filter first, DNS proxy second.
    ///
    /// Any failure stops the write where it is. The previously committed
    /// policy stays in the store, and a kernel ruleset that already landed
    /// is not rolled back.
    pub async fn commit(&self, policy: NetworkPolicy) -> Result<Arc<NetworkPolicy>, WriteError> {
        for (allow, deny) in policy.overlapping_targets() {
            log::warn!("Allow target {allow} overlaps deny target {deny}; deny takes precedence");
        }

        if self.mode.uses_nft() {
            let enforcer = self.enforcer.as_ref().ok_or_else(|| WriteError {
                stage: WriteStage::Apply,
                kernel_applied: Some(false),
                source: EgressError::InvalidConfig {
                    field: "mode".to_string(),
                    reason: "dns+nft mode without a packet filter enforcer".to_string(),
                },
            })?;

            let cancel = self.shutdown.child_token();
            enforcer
                .apply(&cancel, &policy)
                .await
                .map_err(|source| WriteError {
                    stage: WriteStage::Apply,
                    kernel_applied: if source.leaves_kernel_unknown() {
                        None
                    } else {
                        Some(false)
                    },
                    source,
                })?;
        }

        let policy = Arc::new(policy);
        self.store
            .update_policy(Arc::clone(&policy))
            .map_err(|source| {
                log::error!("Packet filter and DNS proxy disagree: {source}");
                WriteError {
                    stage: WriteStage::Commit,
                    kernel_applied: Some(self.mode.uses_nft()),
                    source,
                }
            })?;

        log::info!(
            "Committed egress policy (mode {}, default {}, {} rules)",
            self.mode,
            policy.default_action(),
            policy.egress().len()
        );
        Ok(policy)
    }

    /// Enforce the startup policy, default deny when none is configured
    pub async fn bootstrap(&self, initial: Option<NetworkPolicy>) -> Result<(), EgressError> {
        self.commit(initial.unwrap_or_default())
            .await
            .map(|_| ())
            .map_err(|err| err.source)
    }
}
