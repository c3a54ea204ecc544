//! Membership domain models
//!
//! A membership assigns a user a position at an org node. Memberships are
//! the basis of every authorization decision and of content reachability.
//! Rows are never deleted: ending a membership flips it inactive and stamps
//! `ended_at`, which keeps the audit history intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::OrgPath;
use crate::positions::PositionKey;

/// A user's (org, position) assignment.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use campus_org::{Membership, OrgPath, PositionKey};
///
/// let user_id = Uuid::now_v7();
/// let membership = Membership::new(
///     user_id,
///     OrgPath::parse("/club/cpsk").unwrap(),
///     PositionKey::parse("head").unwrap(),
/// );
/// assert!(membership.active);
/// assert!(membership.ended_at.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    /// Unique membership ID
    pub id: Uuid,

    /// User ID
    pub user_id: Uuid,

    /// Org node the position is held at
    pub org_path: OrgPath,

    /// Position held at the node
    pub position_key: PositionKey,

    /// Whether the membership is active
    pub active: bool,

    /// When the membership was created
    pub created_at: DateTime<Utc>,

    /// When the membership was deactivated
    pub ended_at: Option<DateTime<Utc>>,
}

impl Membership {
    /// Creates a new active membership.
    pub fn new(user_id: Uuid, org_path: OrgPath, position_key: PositionKey) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            org_path,
            position_key,
            active: true,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Mark the membership as ended.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.ended_at = Some(Utc::now());
    }

    /// Check if this membership has the same (user, org, position) tuple.
    pub fn same_assignment(&self, other: &Membership) -> bool {
        self.user_id == other.user_id
            && self.org_path == other.org_path
            && self.position_key == other.position_key
    }

    /// Check if this membership is the superuser signal.
    ///
    /// Only an active `root_admin` membership at `/` qualifies. A
    /// `root_admin` position anywhere else is an ordinary position.
    pub fn is_superuser(&self) -> bool {
        self.active && self.org_path.is_root() && self.position_key.is_root_admin()
    }

    /// Summary used inside viewer access.
    pub fn summary(&self) -> MembershipSummary {
        MembershipSummary {
            membership_id: self.id,
            org_path: self.org_path.clone(),
            position_key: self.position_key.clone(),
        }
    }
}

/// Check if any membership carries the superuser signal.
pub fn has_superuser(memberships: &[Membership]) -> bool {
    memberships.iter().any(Membership::is_superuser)
}

/// Lightweight view of a membership for viewer access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct MembershipSummary {
    /// Membership ID
    pub membership_id: Uuid,

    /// Org node path
    pub org_path: OrgPath,

    /// Position held
    pub position_key: PositionKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(path: &str, position: &str) -> Membership {
        Membership::new(
            Uuid::now_v7(),
            OrgPath::parse(path).unwrap(),
            PositionKey::parse(position).unwrap(),
        )
    }

    #[test]
    fn test_membership_creation() {
        let m = membership("/fac/eng", "member");
        assert!(m.active);
        assert!(m.ended_at.is_none());
        assert_eq!(m.org_path.as_str(), "/fac/eng");
    }

    #[test]
    fn test_deactivate_keeps_row() {
        let mut m = membership("/fac/eng", "member");
        let id = m.id;
        m.deactivate();
        assert!(!m.active);
        assert!(m.ended_at.is_some());
        assert_eq!(m.id, id);
    }

    #[test]
    fn test_superuser_signal() {
        assert!(membership("/", "root_admin").is_superuser());
        assert!(!membership("/fac", "root_admin").is_superuser());
        assert!(!membership("/", "head").is_superuser());

        let mut ended = membership("/", "root_admin");
        ended.deactivate();
        assert!(!ended.is_superuser());
        assert!(!has_superuser(&[ended]));
    }

    #[test]
    fn test_same_assignment() {
        let a = membership("/club", "head");
        let mut b = a.clone();
        b.id = Uuid::now_v7();
        assert!(a.same_assignment(&b));

        b.position_key = PositionKey::parse("member").unwrap();
        assert!(!a.same_assignment(&b));
    }
}
