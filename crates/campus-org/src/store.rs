//! Store interfaces for org nodes and memberships
//!
//! Components never reach for global store handles: each service receives
//! `Arc<dyn ...Store>` in its constructor. The in-memory implementations
//! here back single-process deployments and double as test doubles, with
//! [`Faults`] to simulate outages and slow stores.
//!
//! Every store call made by a service goes through [`bounded`], so a hung
//! store surfaces as [`AccessError::TransientStore`] instead of hanging the
//! request. Dropping the request future drops the in-flight store call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};
use crate::membership::Membership;
use crate::node::{OrgNode, OrgStatus};
use crate::path::OrgPath;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a store call with a timeout.
///
/// An elapsed timeout becomes a retryable [`AccessError::TransientStore`].
pub async fn bounded<T, F>(timeout: Duration, operation: &'static str, fut: F) -> AccessResult<T>
where
    F: Future<Output = AccessResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Store call timed out"
            );
            Err(AccessError::transient(format!(
                "{} timed out after {}ms",
                operation,
                timeout.as_millis()
            )))
        }
    }
}

/// Fault injection for in-memory stores.
///
/// Lets tests and local setups exercise the outage paths: an unavailable
/// store fails every call with a transient error, and a latency delays
/// every call before it runs.
#[derive(Debug, Default)]
pub struct Faults {
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl Faults {
    /// Make every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Apply the configured faults to one call.
    pub async fn check(&self, operation: &str) -> AccessResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AccessError::transient(format!(
                "{}: store unavailable",
                operation
            )));
        }
        Ok(())
    }
}

/// Persistence for org nodes.
#[async_trait]
pub trait OrgStore: Send + Sync {
    /// Insert a node; fails with `Conflict` when the path is taken.
    async fn insert_node(&self, node: OrgNode) -> AccessResult<()>;

    /// Look a node up by path.
    async fn get_by_path(&self, path: &OrgPath) -> AccessResult<Option<OrgNode>>;

    /// Look a node up by ID.
    async fn get_by_id(&self, id: Uuid) -> AccessResult<Option<OrgNode>>;

    /// Look several nodes up by ID; missing IDs are skipped.
    async fn get_many(&self, ids: &[Uuid]) -> AccessResult<Vec<OrgNode>>;

    /// The node at `anchor` and all of its descendants, sorted by path.
    async fn subtree(&self, anchor: &OrgPath) -> AccessResult<Vec<OrgNode>>;

    /// Update a node's status; fails with `NotFound` for unknown paths.
    async fn set_status(&self, path: &OrgPath, status: OrgStatus) -> AccessResult<OrgNode>;
}

/// Persistence for memberships.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Insert a membership unless an active row with the same
    /// (user, org, position) exists. Check and insert are one atomic unit.
    async fn insert_unique_active(&self, membership: Membership) -> AccessResult<Membership>;

    /// Active memberships of a user.
    async fn find_active_by_user(&self, user_id: Uuid) -> AccessResult<Vec<Membership>>;

    /// All memberships of a user, inactive ones included.
    async fn find_by_user(&self, user_id: Uuid) -> AccessResult<Vec<Membership>>;

    /// Look a membership up by ID.
    async fn get(&self, id: Uuid) -> AccessResult<Option<Membership>>;

    /// Flip a membership inactive and stamp `ended_at`.
    ///
    /// Fails with `NotFound` for unknown IDs and `Conflict` when the row
    /// is already inactive.
    async fn deactivate(&self, id: Uuid, ended_at: DateTime<Utc>) -> AccessResult<Membership>;
}

/// In-memory org store.
#[derive(Debug, Default)]
pub struct MemoryOrgStore {
    /// Nodes keyed by canonical path
    nodes: RwLock<BTreeMap<String, OrgNode>>,
    /// Injected faults
    faults: Arc<Faults>,
}

impl MemoryOrgStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection handle.
    pub fn faults(&self) -> Arc<Faults> {
        self.faults.clone()
    }

    /// Remove a node outright, simulating an org deleted behind the
    /// directory's back.
    pub async fn remove_node(&self, path: &OrgPath) -> Option<OrgNode> {
        self.nodes.write().await.remove(path.as_str())
    }
}

#[async_trait]
impl OrgStore for MemoryOrgStore {
    async fn insert_node(&self, node: OrgNode) -> AccessResult<()> {
        self.faults.check("org.insert_node").await?;
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(node.path.as_str()) {
            return Err(AccessError::conflict(format!(
                "org path {} already exists",
                node.path
            )));
        }
        nodes.insert(node.path.as_str().to_string(), node);
        Ok(())
    }

    async fn get_by_path(&self, path: &OrgPath) -> AccessResult<Option<OrgNode>> {
        self.faults.check("org.get_by_path").await?;
        Ok(self.nodes.read().await.get(path.as_str()).cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> AccessResult<Option<OrgNode>> {
        self.faults.check("org.get_by_id").await?;
        Ok(self
            .nodes
            .read()
            .await
            .values()
            .find(|node| node.id == id)
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> AccessResult<Vec<OrgNode>> {
        self.faults.check("org.get_many").await?;
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .filter(|node| ids.contains(&node.id))
            .cloned()
            .collect())
    }

    async fn subtree(&self, anchor: &OrgPath) -> AccessResult<Vec<OrgNode>> {
        self.faults.check("org.subtree").await?;
        let nodes = self.nodes.read().await;
        // Keys sharing the anchor as a string prefix are contiguous; the
        // segment-aware check then drops siblings like `/ab` under `/a`.
        Ok(nodes
            .range(anchor.as_str().to_string()..)
            .take_while(|(key, _)| key.starts_with(anchor.as_str()))
            .map(|(_, node)| node)
            .filter(|node| node.is_within(anchor))
            .cloned()
            .collect())
    }

    async fn set_status(&self, path: &OrgPath, status: OrgStatus) -> AccessResult<OrgNode> {
        self.faults.check("org.set_status").await?;
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(path.as_str())
            .ok_or_else(|| AccessError::not_found(format!("org node {}", path)))?;
        node.status = status;
        node.updated_at = Utc::now();
        Ok(node.clone())
    }
}

/// In-memory membership store.
#[derive(Debug, Default)]
pub struct MemoryMembershipStore {
    /// Memberships keyed by ID
    rows: RwLock<HashMap<Uuid, Membership>>,
    /// Injected faults
    faults: Arc<Faults>,
}

impl MemoryMembershipStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection handle.
    pub fn faults(&self) -> Arc<Faults> {
        self.faults.clone()
    }
}

fn sorted_by_creation(mut rows: Vec<Membership>) -> Vec<Membership> {
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    rows
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn insert_unique_active(&self, membership: Membership) -> AccessResult<Membership> {
        self.faults.check("membership.insert").await?;
        // Held across check and insert so concurrent creates serialize.
        let mut rows = self.rows.write().await;
        let duplicate = rows
            .values()
            .any(|row| row.active && row.same_assignment(&membership));
        if duplicate {
            return Err(AccessError::conflict(format!(
                "user {} already holds {} at {}",
                membership.user_id, membership.position_key, membership.org_path
            )));
        }
        rows.insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> AccessResult<Vec<Membership>> {
        self.faults.check("membership.find_active_by_user").await?;
        let rows = self.rows.read().await;
        Ok(sorted_by_creation(
            rows.values()
                .filter(|row| row.user_id == user_id && row.active)
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_user(&self, user_id: Uuid) -> AccessResult<Vec<Membership>> {
        self.faults.check("membership.find_by_user").await?;
        let rows = self.rows.read().await;
        Ok(sorted_by_creation(
            rows.values()
                .filter(|row| row.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get(&self, id: Uuid) -> AccessResult<Option<Membership>> {
        self.faults.check("membership.get").await?;
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn deactivate(&self, id: Uuid, ended_at: DateTime<Utc>) -> AccessResult<Membership> {
        self.faults.check("membership.deactivate").await?;
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| AccessError::not_found(format!("membership {}", id)))?;
        if !row.active {
            return Err(AccessError::conflict(format!(
                "membership {} is already inactive",
                id
            )));
        }
        row.active = false;
        row.ended_at = Some(ended_at);
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::PositionKey;

    fn path(raw: &str) -> OrgPath {
        OrgPath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_subtree_is_segment_aware() {
        let store = MemoryOrgStore::new();
        for raw in ["/", "/a", "/a/b", "/a-b", "/ab", "/a/b/c", "/b"] {
            store.insert_node(OrgNode::new(path(raw), raw)).await.unwrap();
        }

        let paths: Vec<String> = store
            .subtree(&path("/a"))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.path.to_string())
            .collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/b/c"]);

        let all = store.subtree(&OrgPath::root()).await.unwrap();
        assert_eq!(all.len(), 7);
    }

    #[tokio::test]
    async fn test_duplicate_path_conflicts() {
        let store = MemoryOrgStore::new();
        store.insert_node(OrgNode::new(path("/a"), "A")).await.unwrap();
        let err = store
            .insert_node(OrgNode::new(path("/a"), "A again"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unique_active_membership() {
        let store = MemoryMembershipStore::new();
        let user = Uuid::now_v7();
        let first = Membership::new(user, path("/a"), PositionKey::parse("head").unwrap());
        let dup = Membership::new(user, path("/a"), PositionKey::parse("head").unwrap());

        let first = store.insert_unique_active(first).await.unwrap();
        let err = store.insert_unique_active(dup.clone()).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));

        store.deactivate(first.id, Utc::now()).await.unwrap();
        store.insert_unique_active(dup).await.unwrap();

        assert_eq!(store.find_by_user(user).await.unwrap().len(), 2);
        assert_eq!(store.find_active_by_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_twice_conflicts() {
        let store = MemoryMembershipStore::new();
        let m = Membership::new(Uuid::now_v7(), path("/a"), PositionKey::parse("x").unwrap());
        let m = store.insert_unique_active(m).await.unwrap();
        store.deactivate(m.id, Utc::now()).await.unwrap();
        let err = store.deactivate(m.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));

        let err = store.deactivate(Uuid::now_v7(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_transient() {
        let store = MemoryOrgStore::new();
        store.faults().set_unavailable(true);
        let err = store.get_by_path(&OrgPath::root()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let store = MemoryMembershipStore::new();
        store.faults().set_latency(Duration::from_secs(30));
        let err = bounded(
            Duration::from_millis(50),
            "membership.find_active_by_user",
            store.find_active_by_user(Uuid::now_v7()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AccessError::TransientStore(_)));
    }
}
