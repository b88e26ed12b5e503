use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::EgressError,
    net::{Target, parse_target},
};

/// Disposition of matching traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    #[default]
    Deny,
}

impl Action {
    /// Parse the exact wire names "allow" / "deny"
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "allow" => Some(Action::Allow),
            "deny" => Some(Action::Deny),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRule {
    pub action: Action,
    pub target: Target,
}

impl EgressRule {
    pub fn allow(target: Target) -> Self {
        Self {
            action: Action::Allow,
            target,
        }
    }

    pub fn deny(target: Target) -> Self {
        Self {
            action: Action::Deny,
            target,
        }
    }
}

/// Egress policy enforced for the sandbox.
///
/// Values are immutable: an update replaces the whole policy. Rule order is
/// kept for display but does not change enforcement, which works on sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPolicy")]
pub struct NetworkPolicy {
    default_action: Action,
    egress: Vec<EgressRule>,
}

impl NetworkPolicy {
    pub fn new(default_action: Action, egress: Vec<EgressRule>) -> Self {
        Self {
            default_action,
            egress,
        }
    }

    /// Fail-closed policy used whenever nothing has been supplied
    pub fn default_deny() -> Self {
        Self::new(Action::Deny, Vec::new())
    }

    pub fn default_action(&self) -> Action {
        self.default_action
    }

    pub fn egress(&self) -> &[EgressRule] {
        &self.egress
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::default_deny()
    }
}

/// Wire shape of a policy before validation.
///
/// Accepts `defaultAction` (JSON) or `default_action` (TOML config).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPolicy {
    #[serde(default, rename = "defaultAction", alias = "default_action")]
    pub default_action: Option<String>,
    #[serde(default)]
    pub egress: Option<Vec<RawRule>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRule {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: String,
}

impl TryFrom<RawPolicy> for NetworkPolicy {
    type Error = EgressError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let default_action = match raw.default_action.as_deref() {
            None | Some("") => Action::Deny,
            Some(value) => Action::parse(value).ok_or_else(|| EgressError::InvalidPolicy {
                reason: format!("invalid defaultAction '{value}': expected allow or deny"),
            })?,
        };

        let egress = raw
            .egress
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                let action =
                    Action::parse(&rule.action).ok_or_else(|| EgressError::InvalidPolicy {
                        reason: format!(
                            "egress[{index}]: invalid action '{}': expected allow or deny",
                            rule.action
                        ),
                    })?;
                let target = parse_target(&rule.target)?;
                Ok(EgressRule { action, target })
            })
            .collect::<Result<Vec<_>, EgressError>>()?;

        Ok(Self::new(default_action, egress))
    }
}

/// Parse and validate a JSON policy document
///
/// Every target must be an IP address or CIDR; an unset default action
/// means deny.
///
/// # Examples
/// ```
/// use egressd::policy::{Action, parse_policy};
///
/// let policy = parse_policy(r#"{"egress":[{"action":"allow","target":"1.1.1.1"}]}"#).unwrap();
/// assert_eq!(policy.default_action(), Action::Deny);
/// assert_eq!(policy.egress().len(), 1);
/// ```
pub fn parse_policy(input: impl AsRef<[u8]>) -> Result<NetworkPolicy, EgressError> {
    let raw: RawPolicy =
        serde_json::from_slice(input.as_ref()).map_err(|err| EgressError::InvalidPolicy {
            reason: err.to_string(),
        })?;
    NetworkPolicy::try_from(raw)
}
