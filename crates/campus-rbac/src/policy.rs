//! Position policies
//!
//! A policy grants the holders of one position a set of actions. It is
//! anchored at an org prefix: only memberships at or below the prefix pick
//! it up. The scope decides how far the grant reaches from the membership:
//!
//! ```text
//! Policy { position: head, org_prefix: /club, scope: subtree, actions: [event:create] }
//!
//! membership head @ /club/cpsk
//!   event:create @ /club/cpsk       granted
//!   event:create @ /club/cpsk/sub   granted (subtree only)
//!   event:create @ /club            denied  (ancestor of the membership)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_org::path::normalize;
use campus_org::{AccessError, AccessResult, Membership, OrgPath, PositionKey};

use crate::actions::{ActionKey, ActionSet};

/// How far a grant reaches from the membership's org node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    /// Only the membership's own node
    Exact,
    /// The membership's node and everything below it
    #[default]
    Subtree,
}

impl PolicyScope {
    /// Get the string representation of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyScope::Exact => "exact",
            PolicyScope::Subtree => "subtree",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> AccessResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(PolicyScope::Exact),
            "subtree" => Ok(PolicyScope::Subtree),
            other => Err(AccessError::validation(format!(
                "policy scope must be exact or subtree: {:?}",
                other
            ))),
        }
    }
}

/// A stored policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    /// Policy ID
    pub id: Uuid,

    /// Position the policy applies to
    pub position_key: PositionKey,

    /// Memberships at or below this path pick the policy up
    pub org_prefix: OrgPath,

    /// Reach of the grant
    pub scope: PolicyScope,

    /// Granted actions
    pub actions: ActionSet,

    /// Disabled policies are ignored by the evaluator
    pub enabled: bool,

    /// Last write
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Create an enabled policy.
    pub fn new(
        position_key: PositionKey,
        org_prefix: OrgPath,
        scope: PolicyScope,
        actions: ActionSet,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            position_key,
            org_prefix,
            scope,
            actions,
            enabled: true,
            updated_at: Utc::now(),
        }
    }

    /// Check whether the policy applies to this membership at all.
    pub fn applies_to(&self, membership: &Membership) -> bool {
        membership.active
            && self.enabled
            && self.position_key == membership.position_key
            && membership.org_path.is_descendant_or_self(&self.org_prefix)
    }

    /// Check whether this policy, through `membership`, grants `action`
    /// on `resource`.
    pub fn grants(&self, membership: &Membership, action: &ActionKey, resource: &OrgPath) -> bool {
        if !self.applies_to(membership) || !self.actions.has(action) {
            return false;
        }
        match self.scope {
            PolicyScope::Exact => membership.org_path == *resource,
            PolicyScope::Subtree => resource.is_descendant_or_self(&membership.org_path),
        }
    }
}

/// Unvalidated policy input from an org admin.
///
/// Everything is plain strings so callers can hand over request bodies
/// as they are; [`PolicyDraft::validate`] turns it into a [`Policy`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDraft {
    /// Replace this policy when set; create a new one otherwise
    #[serde(default)]
    pub id: Option<Uuid>,
    pub position_key: String,
    pub org_prefix: String,
    #[serde(default)]
    pub scope: PolicyScope,
    pub actions: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PolicyDraft {
    /// Create a draft for a new enabled policy.
    pub fn new(
        position_key: impl Into<String>,
        org_prefix: impl Into<String>,
        scope: PolicyScope,
        actions: &[&str],
    ) -> Self {
        Self {
            id: None,
            position_key: position_key.into(),
            org_prefix: org_prefix.into(),
            scope,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            enabled: true,
        }
    }

    /// Validate every field.
    ///
    /// The org prefix is normalized first, then checked segment by segment
    /// since it is persisted.
    pub fn validate(&self) -> AccessResult<Policy> {
        let position_key = PositionKey::parse(&self.position_key)?;
        let org_prefix = OrgPath::parse(&normalize(&self.org_prefix))?;
        let actions = self
            .actions
            .iter()
            .map(|a| ActionKey::parse(a))
            .collect::<AccessResult<ActionSet>>()?;
        if actions.is_empty() {
            return Err(AccessError::validation("policy must grant at least one action"));
        }

        let mut policy = Policy::new(position_key, org_prefix, self.scope, actions);
        if let Some(id) = self.id {
            policy.id = id;
        }
        policy.enabled = self.enabled;
        Ok(policy)
    }
}
