//! Org tree administration
//!
//! Creating nodes is where path validation happens. Once a node exists its
//! path is trusted everywhere else, and query-time paths are only
//! normalized.

use std::sync::Arc;
use std::time::Duration;

use campus_events::{publish_best_effort, EventBus, OrgNodeEvent};
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};
use crate::node::{OrgNode, OrgStatus};
use crate::path::OrgPath;
use crate::store::{bounded, OrgStore, DEFAULT_STORE_TIMEOUT};

/// Org tree service.
pub struct OrgTree {
    store: Arc<dyn OrgStore>,
    events: Option<Arc<dyn EventBus>>,
    timeout: Duration,
}

impl std::fmt::Debug for OrgTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgTree")
            .field("timeout", &self.timeout)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl OrgTree {
    /// Create a tree service over `store`.
    pub fn new(store: Arc<dyn OrgStore>) -> Self {
        Self {
            store,
            events: None,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Publish node events to `bus`.
    pub fn with_events(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create the root node unless it exists.
    pub async fn ensure_root(&self) -> AccessResult<OrgNode> {
        let root = OrgPath::root();
        if let Some(node) = self.get(&root).await? {
            return Ok(node);
        }
        match self.insert(OrgNode::root()).await {
            Ok(node) => Ok(node),
            // Lost a race with another creator; theirs is as good as ours.
            Err(AccessError::Conflict(_)) => self
                .get(&root)
                .await?
                .ok_or_else(|| AccessError::Internal("root vanished after conflict".into())),
            Err(e) => Err(e),
        }
    }

    /// Create a node at `raw_path`.
    ///
    /// The path is strictly validated, the parent must exist, and the path
    /// must be free. Use [`OrgTree::ensure_root`] for the root itself.
    pub async fn create_node(&self, raw_path: &str, name: &str) -> AccessResult<OrgNode> {
        let path = OrgPath::parse(raw_path)?;
        let parent = path
            .parent()
            .ok_or_else(|| AccessError::conflict("the root node is created by ensure_root"))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(AccessError::validation("org node name must not be empty"));
        }

        if self.get(&parent).await?.is_none() {
            return Err(AccessError::not_found(format!(
                "parent org node {} of {}",
                parent, path
            )));
        }

        self.insert(OrgNode::new(path, name)).await
    }

    async fn insert(&self, node: OrgNode) -> AccessResult<OrgNode> {
        bounded(self.timeout, "org.insert_node", self.store.insert_node(node.clone())).await?;
        tracing::info!(path = %node.path, node_id = %node.id, "Created org node");

        publish_best_effort(
            self.events.as_ref(),
            OrgNodeEvent::Created {
                node_id: node.id,
                path: node.path.to_string(),
            }
            .to_event(),
        )
        .await;
        Ok(node)
    }

    /// Archive or reactivate a node.
    pub async fn set_status(&self, raw_path: &str, status: OrgStatus) -> AccessResult<OrgNode> {
        let path = OrgPath::normalized(raw_path);
        let node = bounded(
            self.timeout,
            "org.set_status",
            self.store.set_status(&path, status),
        )
        .await?;
        tracing::info!(path = %node.path, status = status.as_str(), "Changed org node status");

        publish_best_effort(
            self.events.as_ref(),
            OrgNodeEvent::StatusChanged {
                node_id: node.id,
                path: node.path.to_string(),
                status: status.as_str().to_string(),
            }
            .to_event(),
        )
        .await;
        Ok(node)
    }

    /// Look a node up by path.
    pub async fn get(&self, path: &OrgPath) -> AccessResult<Option<OrgNode>> {
        bounded(self.timeout, "org.get_by_path", self.store.get_by_path(path)).await
    }

    /// Look a node up by ID.
    pub async fn get_by_id(&self, id: Uuid) -> AccessResult<Option<OrgNode>> {
        bounded(self.timeout, "org.get_by_id", self.store.get_by_id(id)).await
    }

    /// Resolve node IDs; fails with `NotFound` naming the first unknown ID.
    pub async fn resolve_ids(&self, ids: &[Uuid]) -> AccessResult<Vec<OrgNode>> {
        let nodes = bounded(self.timeout, "org.get_many", self.store.get_many(ids)).await?;
        if let Some(missing) = ids.iter().find(|id| !nodes.iter().any(|n| n.id == **id)) {
            return Err(AccessError::not_found(format!("org node {}", missing)));
        }
        Ok(nodes)
    }

    /// The node at `raw_path` and all of its descendants, sorted by path.
    pub async fn subtree(&self, raw_path: &str) -> AccessResult<Vec<OrgNode>> {
        let anchor = OrgPath::normalized(raw_path);
        bounded(self.timeout, "org.subtree", self.store.subtree(&anchor)).await
    }
}
