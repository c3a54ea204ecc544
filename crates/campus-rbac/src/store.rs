//! Policy store
//!
//! The evaluator only ever reads enabled policies for a set of position
//! keys. Admin writes replace a policy wholesale or flip its enabled flag.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use campus_org::{AccessError, AccessResult, Faults, PositionKey};

use crate::policy::Policy;

/// Persistence for policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Enabled policies whose position is one of `positions`.
    ///
    /// Results are ordered by policy ID so evaluation is deterministic.
    async fn find_enabled_by_positions(&self, positions: &[PositionKey])
        -> AccessResult<Vec<Policy>>;

    /// Insert or replace a policy by ID.
    async fn upsert(&self, policy: Policy) -> AccessResult<Policy>;

    /// Switch a policy on or off; `NotFound` for unknown IDs.
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> AccessResult<Policy>;

    /// Look a policy up by ID.
    async fn get(&self, id: Uuid) -> AccessResult<Option<Policy>>;

    /// Every policy, enabled or not, ordered by ID.
    async fn list(&self) -> AccessResult<Vec<Policy>>;
}

/// In-memory policy store.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    /// Policies by ID
    policies: RwLock<HashMap<Uuid, Policy>>,
    /// Injected faults
    faults: Arc<Faults>,
}

impl MemoryPolicyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection handle.
    pub fn faults(&self) -> Arc<Faults> {
        self.faults.clone()
    }
}

fn sorted_by_id(mut policies: Vec<Policy>) -> Vec<Policy> {
    policies.sort_by_key(|p| p.id);
    policies
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn find_enabled_by_positions(
        &self,
        positions: &[PositionKey],
    ) -> AccessResult<Vec<Policy>> {
        self.faults.check("policy.find_enabled_by_positions").await?;
        let policies = self.policies.read().await;
        Ok(sorted_by_id(
            policies
                .values()
                .filter(|p| p.enabled && positions.contains(&p.position_key))
                .cloned()
                .collect(),
        ))
    }

    async fn upsert(&self, mut policy: Policy) -> AccessResult<Policy> {
        self.faults.check("policy.upsert").await?;
        policy.updated_at = Utc::now();
        self.policies
            .write()
            .await
            .insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> AccessResult<Policy> {
        self.faults.check("policy.set_enabled").await?;
        let mut policies = self.policies.write().await;
        let policy = policies
            .get_mut(&id)
            .ok_or_else(|| AccessError::not_found(format!("policy {}", id)))?;
        policy.enabled = enabled;
        policy.updated_at = Utc::now();
        Ok(policy.clone())
    }

    async fn get(&self, id: Uuid) -> AccessResult<Option<Policy>> {
        self.faults.check("policy.get").await?;
        Ok(self.policies.read().await.get(&id).cloned())
    }

    async fn list(&self) -> AccessResult<Vec<Policy>> {
        self.faults.check("policy.list").await?;
        let policies = self.policies.read().await;
        Ok(sorted_by_id(policies.values().cloned().collect()))
    }
}
