use crate::{
    net::Target,
    policy::{Action, NetworkPolicy, sets::split_by_family},
};

use super::{
    ALLOW_V4_SET, ALLOW_V6_SET, BYPASS_MARK, CHAIN_NAME, DENY_V4_SET, DENY_V6_SET, DOH_PORT,
    DOH_V4_SET, DOH_V6_SET, TABLE_NAME,
};

/// Render the nftables program for a policy.
///
/// The program recreates the dedicated table from scratch and fills it with
/// interval sets plus one output-hook chain. Rule order:
///
/// 1. established/related connections are accepted
/// 2. packets carrying the bypass mark are accepted
/// 3. port 443 to DoH resolvers is dropped (only with a non-empty `doh_blocklist`)
/// 4. destinations in a deny set are dropped
/// 5. destinations in an allow set are accepted
/// 6. with a drop policy, the remainder hits a counting drop rule
///
/// Empty sets get no `add element` statement.
pub fn build_ruleset(policy: &NetworkPolicy, doh_blocklist: &[Target]) -> String {
    let sets = policy.static_ip_sets();
    let (doh_v4, doh_v6) = split_by_family(doh_blocklist);
    let block_doh = !doh_blocklist.is_empty();

    let mut script = String::new();

    // Reset and re-create table, sets, and chain.
    script.push_str(&format!("delete table inet {TABLE_NAME}\n"));
    script.push_str(&format!("add table inet {TABLE_NAME}\n"));

    push_set(&mut script, ALLOW_V4_SET, "ipv4_addr");
    push_set(&mut script, DENY_V4_SET, "ipv4_addr");
    push_set(&mut script, ALLOW_V6_SET, "ipv6_addr");
    push_set(&mut script, DENY_V6_SET, "ipv6_addr");
    if block_doh {
        push_set(&mut script, DOH_V4_SET, "ipv4_addr");
        push_set(&mut script, DOH_V6_SET, "ipv6_addr");
    }

    push_elements(&mut script, ALLOW_V4_SET, &sets.allow_v4);
    push_elements(&mut script, DENY_V4_SET, &sets.deny_v4);
    push_elements(&mut script, ALLOW_V6_SET, &sets.allow_v6);
    push_elements(&mut script, DENY_V6_SET, &sets.deny_v6);
    if block_doh {
        push_elements(&mut script, DOH_V4_SET, &doh_v4);
        push_elements(&mut script, DOH_V6_SET, &doh_v6);
    }

    let chain_policy = match policy.default_action() {
        Action::Allow => "accept",
        Action::Deny => "drop",
    };
    script.push_str(&format!(
        "add chain inet {TABLE_NAME} {CHAIN_NAME} {{ type filter hook output priority 0; policy {chain_policy}; }}\n"
    ));

    push_rule(&mut script, "ct state established,related accept");
    push_rule(&mut script, &format!("meta mark {BYPASS_MARK} accept"));
    if block_doh {
        push_rule(
            &mut script,
            &format!("ip daddr @{DOH_V4_SET} tcp dport {DOH_PORT} drop"),
        );
        push_rule(
            &mut script,
            &format!("ip6 daddr @{DOH_V6_SET} tcp dport {DOH_PORT} drop"),
        );
    }
    push_rule(&mut script, &format!("ip daddr @{DENY_V4_SET} drop"));
    push_rule(&mut script, &format!("ip6 daddr @{DENY_V6_SET} drop"));
    push_rule(&mut script, &format!("ip daddr @{ALLOW_V4_SET} accept"));
    push_rule(&mut script, &format!("ip6 daddr @{ALLOW_V6_SET} accept"));
    if chain_policy == "drop" {
        push_rule(&mut script, "counter drop");
    }

    script
}

fn push_set(script: &mut String, name: &str, addr_type: &str) {
    script.push_str(&format!(
        "add set inet {TABLE_NAME} {name} {{ type {addr_type}; flags interval; }}\n"
    ));
}

fn push_elements(script: &mut String, name: &str, elements: &[Target]) {
    if elements.is_empty() {
        return;
    }
    let joined = elements
        .iter()
        .map(Target::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    script.push_str(&format!(
        "add element inet {TABLE_NAME} {name} {{ {joined} }}\n"
    ));
}

fn push_rule(script: &mut String, statement: &str) {
    script.push_str(&format!(
        "add rule inet {TABLE_NAME} {CHAIN_NAME} {statement}\n"
    ));
}
