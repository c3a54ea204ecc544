//! Viewer access
//!
//! [`ViewerAccess`] is everything the read path needs to know about a user:
//! whether they are the superuser and which org nodes they can reach. A
//! user reaches a node when one of their active memberships sits at that
//! node or at one of its ancestors.
//!
//! Viewer access is derived, never persisted, and rebuilt for every request
//! so membership changes apply on the next call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AccessResult;
use crate::membership::{has_superuser, Membership, MembershipSummary};
use crate::path::OrgPath;
use crate::store::{bounded, MembershipStore, OrgStore, DEFAULT_STORE_TIMEOUT};

/// The reachable org subtree of one viewer.
///
/// Paths and node IDs are de-duplicated and sorted.
///
/// # Examples
///
/// ```
/// use campus_org::ViewerAccess;
///
/// let anonymous = ViewerAccess::anonymous();
/// assert!(anonymous.user_id.is_none());
/// assert!(anonymous.reachable_node_ids.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewerAccess {
    /// Viewer's user ID, `None` for anonymous readers
    pub user_id: Option<Uuid>,

    /// Whether the viewer carries the superuser signal
    pub superuser: bool,

    /// Active memberships the access was built from
    pub memberships: Vec<MembershipSummary>,

    /// Reachable org paths, sorted
    pub reachable_paths: Vec<OrgPath>,

    /// Reachable org node IDs, sorted
    pub reachable_node_ids: Vec<Uuid>,
}

impl ViewerAccess {
    /// Access for a reader without identity: public content only.
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            superuser: false,
            memberships: Vec::new(),
            reachable_paths: Vec::new(),
            reachable_node_ids: Vec::new(),
        }
    }

    /// Check if the viewer is `user_id`.
    pub fn is_user(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }

    /// Check if the viewer reaches the node with this ID.
    pub fn reaches_node(&self, node_id: &Uuid) -> bool {
        self.reachable_node_ids.binary_search(node_id).is_ok()
    }

    /// Check if the viewer reaches this path.
    pub fn reaches_path(&self, path: &OrgPath) -> bool {
        self.reachable_paths.binary_search(path).is_ok()
    }

    /// Check if the viewer reaches any of the given nodes.
    pub fn reaches_any(&self, node_ids: &[Uuid]) -> bool {
        node_ids.iter().any(|id| self.reaches_node(id))
    }
}

/// Builds [`ViewerAccess`] from the membership and org stores.
pub struct ViewerAccessBuilder {
    memberships: Arc<dyn MembershipStore>,
    orgs: Arc<dyn OrgStore>,
    timeout: Duration,
}

impl std::fmt::Debug for ViewerAccessBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerAccessBuilder")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ViewerAccessBuilder {
    /// Create a builder over the given stores.
    pub fn new(memberships: Arc<dyn MembershipStore>, orgs: Arc<dyn OrgStore>) -> Self {
        Self {
            memberships,
            orgs,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the access of `user_id` from their active memberships.
    pub async fn build(&self, user_id: Uuid) -> AccessResult<ViewerAccess> {
        let memberships = bounded(
            self.timeout,
            "membership.find_active_by_user",
            self.memberships.find_active_by_user(user_id),
        )
        .await?;
        self.build_from(user_id, &memberships).await
    }

    /// Build access from memberships the caller already loaded.
    ///
    /// Inactive rows are ignored. A membership whose org node no longer
    /// exists contributes nothing; the rest of the access is still built.
    pub async fn build_from(
        &self,
        user_id: Uuid,
        memberships: &[Membership],
    ) -> AccessResult<ViewerAccess> {
        let active: Vec<&Membership> = memberships.iter().filter(|m| m.active).collect();

        // Shallow anchors first so nested memberships are covered by a
        // subtree that was already fetched.
        let mut anchors: Vec<&OrgPath> = active.iter().map(|m| &m.org_path).collect();
        anchors.sort_by_key(|path| (path.depth(), path.as_str().to_string()));
        anchors.dedup();

        let mut covered: Vec<&OrgPath> = Vec::new();
        let mut paths = BTreeSet::new();
        let mut node_ids = BTreeSet::new();

        for anchor in anchors {
            if covered.iter().any(|c| anchor.is_descendant_or_self(c)) {
                continue;
            }

            let resolved = bounded(self.timeout, "org.get_by_path", self.orgs.get_by_path(anchor))
                .await?;
            if resolved.is_none() {
                tracing::warn!(
                    user_id = %user_id,
                    org_path = %anchor,
                    "Membership points at a missing org node, skipping"
                );
                continue;
            }

            let subtree = bounded(self.timeout, "org.subtree", self.orgs.subtree(anchor)).await?;
            for node in subtree {
                node_ids.insert(node.id);
                paths.insert(node.path);
            }
            covered.push(anchor);
        }

        let mut summaries: Vec<MembershipSummary> = active.iter().map(|m| m.summary()).collect();
        summaries.sort();

        let access = ViewerAccess {
            user_id: Some(user_id),
            superuser: has_superuser(memberships),
            memberships: summaries,
            reachable_paths: paths.into_iter().collect(),
            reachable_node_ids: node_ids.into_iter().collect(),
        };

        tracing::debug!(
            user_id = %user_id,
            superuser = access.superuser,
            memberships = access.memberships.len(),
            reachable_nodes = access.reachable_node_ids.len(),
            "Built viewer access"
        );
        Ok(access)
    }
}
