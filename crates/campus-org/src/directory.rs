//! Membership directory
//!
//! Grants and ends memberships. The directory validates the assignment
//! (the org node must exist, the position key must be well formed) and
//! delegates the duplicate check plus insert to the store as one atomic
//! operation.

use std::sync::Arc;
use std::time::Duration;

use campus_events::{publish_best_effort, EventBus, MembershipEvent};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};
use crate::membership::Membership;
use crate::path::OrgPath;
use crate::positions::PositionKey;
use crate::store::{bounded, MembershipStore, OrgStore, DEFAULT_STORE_TIMEOUT};

/// Membership directory service.
pub struct MembershipDirectory {
    memberships: Arc<dyn MembershipStore>,
    orgs: Arc<dyn OrgStore>,
    events: Option<Arc<dyn EventBus>>,
    timeout: Duration,
}

impl std::fmt::Debug for MembershipDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipDirectory")
            .field("timeout", &self.timeout)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl MembershipDirectory {
    /// Create a directory over the given stores.
    pub fn new(memberships: Arc<dyn MembershipStore>, orgs: Arc<dyn OrgStore>) -> Self {
        Self {
            memberships,
            orgs,
            events: None,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Publish membership events to `bus`.
    pub fn with_events(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Active memberships of a user, oldest first.
    pub async fn find_active_by_user(&self, user_id: Uuid) -> AccessResult<Vec<Membership>> {
        bounded(
            self.timeout,
            "membership.find_active_by_user",
            self.memberships.find_active_by_user(user_id),
        )
        .await
    }

    /// Every membership a user ever held, inactive rows included.
    pub async fn history(&self, user_id: Uuid) -> AccessResult<Vec<Membership>> {
        bounded(
            self.timeout,
            "membership.find_by_user",
            self.memberships.find_by_user(user_id),
        )
        .await
    }

    /// Look a membership up by ID.
    pub async fn get(&self, id: Uuid) -> AccessResult<Membership> {
        bounded(self.timeout, "membership.get", self.memberships.get(id))
            .await?
            .ok_or_else(|| AccessError::not_found(format!("membership {}", id)))
    }

    /// Grant `position` at `org_path` to a user.
    ///
    /// Fails with `Conflict` when the user already holds the same active
    /// assignment. Granting an assignment that was previously ended is
    /// allowed and creates a fresh row; the ended row stays as history.
    pub async fn create(
        &self,
        user_id: Uuid,
        org_path: &str,
        position: &str,
    ) -> AccessResult<Membership> {
        let position_key = PositionKey::parse(position)?;
        let org_path = OrgPath::normalized(org_path);

        let node = bounded(self.timeout, "org.get_by_path", self.orgs.get_by_path(&org_path))
            .await?
            .ok_or_else(|| AccessError::not_found(format!("org node {}", org_path)))?;

        let membership = Membership::new(user_id, node.path, position_key);
        let membership = bounded(
            self.timeout,
            "membership.insert",
            self.memberships.insert_unique_active(membership),
        )
        .await?;

        tracing::info!(
            membership_id = %membership.id,
            user_id = %user_id,
            org_path = %membership.org_path,
            position = %membership.position_key,
            "Granted membership"
        );

        publish_best_effort(
            self.events.as_ref(),
            MembershipEvent::Created {
                membership_id: membership.id,
                user_id,
                org_path: membership.org_path.to_string(),
                position_key: membership.position_key.to_string(),
            }
            .to_event(),
        )
        .await;

        Ok(membership)
    }

    /// End a membership without deleting it.
    pub async fn deactivate(&self, id: Uuid) -> AccessResult<Membership> {
        let membership = bounded(
            self.timeout,
            "membership.deactivate",
            self.memberships.deactivate(id, Utc::now()),
        )
        .await?;

        tracing::info!(
            membership_id = %membership.id,
            user_id = %membership.user_id,
            org_path = %membership.org_path,
            "Deactivated membership"
        );

        if let Some(ended_at) = membership.ended_at {
            publish_best_effort(
                self.events.as_ref(),
                MembershipEvent::Deactivated {
                    membership_id: membership.id,
                    user_id: membership.user_id,
                    org_path: membership.org_path.to_string(),
                    position_key: membership.position_key.to_string(),
                    ended_at,
                }
                .to_event(),
            )
            .await;
        }

        Ok(membership)
    }
}
