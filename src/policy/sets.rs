use crate::net::{Family, Target};

use super::model::{Action, NetworkPolicy};

/// Policy targets partitioned by action and address family
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StaticIpSets {
    pub allow_v4: Vec<Target>,
    pub allow_v6: Vec<Target>,
    pub deny_v4: Vec<Target>,
    pub deny_v6: Vec<Target>,
}

impl StaticIpSets {
    /// Partition targets into the four allow/deny x v4/v6 sets.
    ///
    /// Each set keeps insertion order and drops entries that repeat or are
    /// covered by another member of the same set, since nftables interval
    /// sets refuse overlapping elements. Overlaps between an allow set and a
    /// deny set are kept; rule order in the ruleset decides those.
    pub fn from_policy(policy: &NetworkPolicy) -> Self {
        let mut sets = Self::default();
        for rule in policy.egress() {
            let bucket = match (rule.action, rule.target.family()) {
                (Action::Allow, Family::V4) => &mut sets.allow_v4,
                (Action::Allow, Family::V6) => &mut sets.allow_v6,
                (Action::Deny, Family::V4) => &mut sets.deny_v4,
                (Action::Deny, Family::V6) => &mut sets.deny_v6,
            };
            bucket.push(rule.target);
        }

        for bucket in [
            &mut sets.allow_v4,
            &mut sets.allow_v6,
            &mut sets.deny_v4,
            &mut sets.deny_v6,
        ] {
            *bucket = collapse(bucket);
        }
        sets
    }
}

/// Partition an arbitrary target list by family, collapsed like the policy sets
pub fn split_by_family(targets: &[Target]) -> (Vec<Target>, Vec<Target>) {
    let (v4, v6): (Vec<Target>, Vec<Target>) = targets
        .iter()
        .partition(|target| target.family() == Family::V4);
    (collapse(&v4), collapse(&v6))
}

fn collapse(targets: &[Target]) -> Vec<Target> {
    targets
        .iter()
        .enumerate()
        .filter(|&(index, target)| {
            !targets.iter().enumerate().any(|(other_index, other)| {
                other_index != index
                    && other.contains(target)
                    // same range: keep the first occurrence only
                    && (other.prefix_len() < target.prefix_len() || other_index < index)
            })
        })
        .map(|(_, target)| *target)
        .collect()
}

impl NetworkPolicy {
    pub fn static_ip_sets(&self) -> StaticIpSets {
        StaticIpSets::from_policy(self)
    }

    /// Pairs of (allow, deny) targets whose address ranges intersect.
    ///
    /// Deny wins for such addresses; callers use this for diagnostics.
    pub fn overlapping_targets(&self) -> Vec<(Target, Target)> {
        let mut overlaps = Vec::new();
        for allow in self.egress().iter().filter(|r| r.action == Action::Allow) {
            for deny in self.egress().iter().filter(|r| r.action == Action::Deny) {
                if allow.target.contains(&deny.target) || deny.target.contains(&allow.target) {
                    overlaps.push((allow.target, deny.target));
                }
            }
        }
        overlaps
    }
}
