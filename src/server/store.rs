use std::sync::{Arc, PoisonError, RwLock};

#[cfg(test)]
use mockall::automock;

use crate::{error::EgressError, policy::NetworkPolicy};

/// Policy currently enforced by the DNS proxy.
///
/// The proxy owns this state; the control plane only reads it and replaces it
/// after the packet filter accepted a new policy. Implementations serialise
/// writers and hand readers a consistent snapshot.
#[cfg_attr(test, automock)]
pub trait PolicyStore: Send + Sync + 'static {
    /// `None` until a policy has been committed
    fn current_policy(&self) -> Option<Arc<NetworkPolicy>>;

    fn update_policy(&self, policy: Arc<NetworkPolicy>) -> Result<(), EgressError>;
}

/// In-process store shared with the DNS proxy
#[derive(Debug, Default)]
pub struct SharedPolicyStore {
    current: RwLock<Option<Arc<NetworkPolicy>>>,
}

impl SharedPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicyStore for SharedPolicyStore {
    fn current_policy(&self) -> Option<Arc<NetworkPolicy>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_policy(&self, policy: Arc<NetworkPolicy>) -> Result<(), EgressError> {
        let mut current = self
            .current
            .write()
            .map_err(|_| EgressError::PolicyCommit {
                reason: "policy store lock poisoned".to_string(),
            })?;
        *current = Some(policy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Action, NetworkPolicy};

    #[test]
    fn starts_empty() {
        let store = SharedPolicyStore::new();
        assert!(store.current_policy().is_none());
    }

    #[test]
    fn update_replaces_whole_policy() {
        let store = SharedPolicyStore::new();
        store
            .update_policy(Arc::new(NetworkPolicy::default_deny()))
            .unwrap();
        let allow_all = Arc::new(NetworkPolicy::new(Action::Allow, Vec::new()));
        store.update_policy(Arc::clone(&allow_all)).unwrap();

        assert_eq!(store.current_policy(), Some(allow_all));
    }

    #[test]
    fn concurrent_readers_see_complete_policies() {
        let store = Arc::new(SharedPolicyStore::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let action = if i % 2 == 0 { Action::Allow } else { Action::Deny };
                    store
                        .update_policy(Arc::new(NetworkPolicy::new(action, Vec::new())))
                        .unwrap();
                    store.current_policy().expect("policy committed")
                })
            })
            .collect();

        for writer in writers {
            let seen = writer.join().unwrap();
            assert!(seen.egress().is_empty());
        }
        assert!(store.current_policy().is_some());
    }
}
