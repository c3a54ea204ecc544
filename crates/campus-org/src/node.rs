//! Org node domain models
//!
//! An org node is one unit of the organizational hierarchy (faculty,
//! department, club, ...). Nodes carry their materialized ancestor chain so
//! subtree lookups never have to walk the tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::OrgPath;

/// Lifecycle status of an org node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrgStatus {
    /// Node is in use
    #[default]
    Active,

    /// Node is hidden from admin listings but still resolves
    Archived,
}

impl OrgStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// A node in the org hierarchy.
///
/// # Invariants
///
/// - `ancestors == parent.ancestors + [parent.path]`
/// - `depth == ancestors.len()`
/// - the root has no parent, no ancestors and depth 0
///
/// # Examples
///
/// ```
/// use campus_org::{OrgNode, OrgPath};
///
/// let node = OrgNode::new(OrgPath::parse("/fac/eng").unwrap(), "Engineering");
/// assert_eq!(node.depth, 2);
/// assert_eq!(node.parent_path.as_ref().map(|p| p.as_str()), Some("/fac"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgNode {
    /// Unique node ID, referenced by content audiences
    pub id: Uuid,

    /// Canonical path (unique)
    pub path: OrgPath,

    /// Parent path, `None` for the root
    pub parent_path: Option<OrgPath>,

    /// Ancestor paths ordered root first
    pub ancestors: Vec<OrgPath>,

    /// Number of ancestors
    pub depth: usize,

    /// Lifecycle status
    pub status: OrgStatus,

    /// Display name
    pub name: String,

    /// When the node was created
    pub created_at: DateTime<Utc>,

    /// When the node was last updated
    pub updated_at: DateTime<Utc>,
}

impl OrgNode {
    /// Creates a new active node at `path`.
    ///
    /// The parent path, ancestor chain and depth are derived from the path.
    pub fn new(path: OrgPath, name: impl Into<String>) -> Self {
        let now = Utc::now();
        let ancestors = path.ancestors();
        Self {
            id: Uuid::now_v7(),
            parent_path: path.parent(),
            depth: ancestors.len(),
            ancestors,
            path,
            status: OrgStatus::Active,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates the root node `/`.
    pub fn root() -> Self {
        Self::new(OrgPath::root(), "root")
    }

    /// Check if this is the root node.
    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    /// Check if the node is active.
    pub fn is_active(&self) -> bool {
        self.status == OrgStatus::Active
    }

    /// Check if this node equals `anchor` or lies beneath it.
    pub fn is_within(&self, anchor: &OrgPath) -> bool {
        self.path.is_descendant_or_self(anchor)
    }
}
