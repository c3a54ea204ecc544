//! Policy administration
//!
//! Validated writes to the policy store. The evaluator picks changes up on
//! its next call; there is no cache to invalidate.

use std::sync::Arc;
use std::time::Duration;

use campus_events::{publish_best_effort, EventBus, PolicyEvent};
use uuid::Uuid;

use campus_org::{bounded, AccessError, AccessResult, DEFAULT_STORE_TIMEOUT};

use crate::policy::{Policy, PolicyDraft};
use crate::store::PolicyStore;

/// Policy administration service.
pub struct PolicyAdmin {
    store: Arc<dyn PolicyStore>,
    events: Option<Arc<dyn EventBus>>,
    timeout: Duration,
}

impl std::fmt::Debug for PolicyAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyAdmin")
            .field("timeout", &self.timeout)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl PolicyAdmin {
    /// Create an admin service over the given store.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            events: None,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Publish policy events to `bus`.
    pub fn with_events(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate and store a policy.
    ///
    /// A draft carrying an ID replaces that policy, which must exist.
    pub async fn upsert(&self, draft: &PolicyDraft) -> AccessResult<Policy> {
        let policy = draft.validate()?;
        if let Some(id) = draft.id {
            self.get(id).await?;
        }

        let policy = bounded(self.timeout, "policy.upsert", self.store.upsert(policy)).await?;

        tracing::info!(
            policy_id = %policy.id,
            position = %policy.position_key,
            org_prefix = %policy.org_prefix,
            scope = policy.scope.as_str(),
            actions = policy.actions.len(),
            enabled = policy.enabled,
            "Upserted policy"
        );

        publish_best_effort(
            self.events.as_ref(),
            PolicyEvent::Upserted {
                policy_id: policy.id,
                position_key: policy.position_key.to_string(),
                org_prefix: policy.org_prefix.to_string(),
                enabled: policy.enabled,
            }
            .to_event(),
        )
        .await;

        Ok(policy)
    }

    /// Switch a policy on or off.
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> AccessResult<Policy> {
        let policy = bounded(
            self.timeout,
            "policy.set_enabled",
            self.store.set_enabled(id, enabled),
        )
        .await?;

        tracing::info!(policy_id = %id, enabled, "Toggled policy");

        publish_best_effort(
            self.events.as_ref(),
            PolicyEvent::Toggled {
                policy_id: id,
                enabled,
            }
            .to_event(),
        )
        .await;

        Ok(policy)
    }

    /// Look a policy up by ID.
    pub async fn get(&self, id: Uuid) -> AccessResult<Policy> {
        bounded(self.timeout, "policy.get", self.store.get(id))
            .await?
            .ok_or_else(|| AccessError::not_found(format!("policy {}", id)))
    }

    /// Every policy, enabled or not.
    pub async fn list(&self) -> AccessResult<Vec<Policy>> {
        bounded(self.timeout, "policy.list", self.store.list()).await
    }
}
