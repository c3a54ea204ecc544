//! Authorization evaluator
//!
//! Answers "may this user perform this action at this org path?" from the
//! user's active memberships and the enabled policies of their positions.
//! Nothing is cached between calls: every decision loads fresh rows, so a
//! deactivated membership or disabled policy stops granting on the next
//! call.
//!
//! Store failures are returned as errors. A decision is never defaulted to
//! deny (or allow) because a store could not be read.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_org::{
    bounded, has_superuser, AccessError, AccessResult, Membership, MembershipStore, OrgPath,
    PositionKey, DEFAULT_STORE_TIMEOUT,
};

use crate::actions::ActionKey;
use crate::policy::Policy;
use crate::store::PolicyStore;

/// Outcome of one authorization check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    /// Whether the action is allowed
    pub allowed: bool,

    /// Allowed through the superuser signal
    pub superuser: bool,

    /// Policy that produced the grant, if any
    pub policy_id: Option<Uuid>,
}

impl Decision {
    fn deny() -> Self {
        Self {
            allowed: false,
            superuser: false,
            policy_id: None,
        }
    }

    fn superuser() -> Self {
        Self {
            allowed: true,
            superuser: true,
            policy_id: None,
        }
    }

    fn granted_by(policy_id: Uuid) -> Self {
        Self {
            allowed: true,
            superuser: false,
            policy_id: Some(policy_id),
        }
    }
}

/// Memberships and policies of one user, loaded once per request.
///
/// Lets a batch of checks reuse the same rows instead of hitting the
/// stores per action.
#[derive(Debug, Clone, Default)]
pub struct Grants {
    memberships: Vec<Membership>,
    policies: Vec<Policy>,
    superuser: bool,
}

impl Grants {
    /// Build grants from rows the caller already loaded.
    pub fn new(memberships: Vec<Membership>, policies: Vec<Policy>) -> Self {
        let memberships: Vec<Membership> = memberships.into_iter().filter(|m| m.active).collect();
        let superuser = has_superuser(&memberships);
        Self {
            memberships,
            policies,
            superuser,
        }
    }

    /// Whether the user carries the superuser signal.
    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    /// Active memberships the grants were built from.
    pub fn memberships(&self) -> &[Membership] {
        &self.memberships
    }

    /// Evaluate one action against one resource path.
    ///
    /// The path is normalized, never rejected. A malformed action grants
    /// nothing.
    pub fn check(&self, action: &str, resource_path: &str) -> Decision {
        if self.superuser {
            return Decision::superuser();
        }
        let Ok(action) = ActionKey::parse(action) else {
            return Decision::deny();
        };
        let resource = OrgPath::normalized(resource_path);

        for membership in &self.memberships {
            for policy in &self.policies {
                if policy.grants(membership, &action, &resource) {
                    return Decision::granted_by(policy.id);
                }
            }
        }
        Decision::deny()
    }
}

/// Authorization evaluator over the membership and policy stores.
pub struct Authorizer {
    memberships: Arc<dyn MembershipStore>,
    policies: Arc<dyn PolicyStore>,
    timeout: Duration,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Authorizer {
    /// Create an evaluator over the given stores.
    pub fn new(memberships: Arc<dyn MembershipStore>, policies: Arc<dyn PolicyStore>) -> Self {
        Self {
            memberships,
            policies,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the memberships and relevant policies of a user.
    ///
    /// Policies are skipped entirely for the superuser and for users
    /// without memberships.
    pub async fn load(&self, user_id: Uuid) -> AccessResult<Grants> {
        let memberships = bounded(
            self.timeout,
            "membership.find_active_by_user",
            self.memberships.find_active_by_user(user_id),
        )
        .await?;

        if memberships.is_empty() || has_superuser(&memberships) {
            return Ok(Grants::new(memberships, Vec::new()));
        }

        let positions: Vec<PositionKey> = memberships
            .iter()
            .map(|m| m.position_key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let policies = bounded(
            self.timeout,
            "policy.find_enabled_by_positions",
            self.policies.find_enabled_by_positions(&positions),
        )
        .await?;

        Ok(Grants::new(memberships, policies))
    }

    /// Full decision for one action, including the granting policy.
    pub async fn decide(
        &self,
        user_id: Uuid,
        action: &str,
        resource_path: &str,
    ) -> AccessResult<Decision> {
        let grants = self.load(user_id).await?;
        let decision = grants.check(action, resource_path);
        log_decision(user_id, action, resource_path, &decision);
        Ok(decision)
    }

    /// Check if a user may perform `action` at `resource_path`.
    pub async fn can(
        &self,
        user_id: Uuid,
        action: &str,
        resource_path: &str,
    ) -> AccessResult<bool> {
        Ok(self.decide(user_id, action, resource_path).await?.allowed)
    }

    /// Evaluate several actions at one path with a single load.
    ///
    /// Returns one entry per requested action string.
    pub async fn abilities_for(
        &self,
        user_id: Uuid,
        org_path: &str,
        actions: &[&str],
    ) -> AccessResult<BTreeMap<String, bool>> {
        let grants = self.load(user_id).await?;
        Ok(actions
            .iter()
            .map(|action| {
                let decision = grants.check(action, org_path);
                log_decision(user_id, action, org_path, &decision);
                (action.to_string(), decision.allowed)
            })
            .collect())
    }

    /// Like [`Authorizer::can`] but a deny becomes `Forbidden`.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        action: &str,
        resource_path: &str,
    ) -> AccessResult<Decision> {
        let decision = self.decide(user_id, action, resource_path).await?;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(AccessError::forbidden(format!(
                "{} at {}",
                action,
                OrgPath::normalized(resource_path)
            )))
        }
    }
}

fn log_decision(user_id: Uuid, action: &str, resource_path: &str, decision: &Decision) {
    tracing::debug!(
        user_id = %user_id,
        action,
        resource_path,
        allowed = decision.allowed,
        superuser = decision.superuser,
        policy_id = ?decision.policy_id,
        "Authorization decision"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PolicyDraft, PolicyScope};
    use crate::store::MemoryPolicyStore;
    use campus_org::MemoryMembershipStore;
    use chrono::Utc;

    struct Fixture {
        memberships: Arc<MemoryMembershipStore>,
        policies: Arc<MemoryPolicyStore>,
        authorizer: Authorizer,
    }

    fn fixture() -> Fixture {
        let memberships = Arc::new(MemoryMembershipStore::new());
        let policies = Arc::new(MemoryPolicyStore::new());
        let authorizer = Authorizer::new(memberships.clone(), policies.clone());
        Fixture {
            memberships,
            policies,
            authorizer,
        }
    }

    async fn grant(f: &Fixture, user: Uuid, path: &str, position: &str) -> Membership {
        f.memberships
            .insert_unique_active(Membership::new(
                user,
                OrgPath::parse(path).unwrap(),
                PositionKey::parse(position).unwrap(),
            ))
            .await
            .unwrap()
    }

    async fn policy(
        f: &Fixture,
        position: &str,
        prefix: &str,
        scope: PolicyScope,
        actions: &[&str],
    ) -> Policy {
        f.policies
            .upsert(PolicyDraft::new(position, prefix, scope, actions).validate().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_subtree_policy() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/club/cpsk", "head").await;
        let p = policy(&f, "head", "/club", PolicyScope::Subtree, &["event:create"]).await;

        assert!(f.authorizer.can(user, "event:create", "/club/cpsk/sub").await.unwrap());
        assert!(f.authorizer.can(user, "event:create", "/club/cpsk").await.unwrap());
        assert!(!f.authorizer.can(user, "event:create", "/other").await.unwrap());

        let decision = f.authorizer.decide(user, "event:create", "/club/cpsk").await.unwrap();
        assert_eq!(decision.policy_id, Some(p.id));
    }

    #[tokio::test]
    async fn test_exact_policy() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/club/cpsk", "head").await;
        policy(&f, "head", "/club", PolicyScope::Exact, &["event:create"]).await;

        assert!(f.authorizer.can(user, "event:create", "/club/cpsk").await.unwrap());
        assert!(!f.authorizer.can(user, "event:create", "/club/cpsk/sub").await.unwrap());
        assert!(!f.authorizer.can(user, "event:create", "/club").await.unwrap());
    }

    #[tokio::test]
    async fn test_ancestor_resource_denied() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/fac/eng", "member").await;
        policy(&f, "member", "/fac", PolicyScope::Subtree, &["post:create"]).await;

        assert!(f.authorizer.can(user, "post:create", "/fac/eng").await.unwrap());
        assert!(!f.authorizer.can(user, "post:create", "/fac").await.unwrap());
    }

    #[tokio::test]
    async fn test_resource_path_is_normalized() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/fac/eng", "member").await;
        policy(&f, "member", "/fac", PolicyScope::Subtree, &["post:create"]).await;

        assert!(f.authorizer.can(user, "post:create", " /FAC//eng/ ").await.unwrap());
        assert!(f.authorizer.can(user, "post:create", "/fac/eng/./lab").await.unwrap());
        assert!(!f.authorizer.can(user, "post:create", "/fac/eng/../sci").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_actions_deny() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/fac", "member").await;
        policy(&f, "member", "/", PolicyScope::Subtree, &["post:manage"]).await;

        assert!(!f.authorizer.can(user, "post:create", "/fac").await.unwrap());
        assert!(!f.authorizer.can(user, "post:*", "/fac").await.unwrap());
        assert!(!f.authorizer.can(user, "garbage", "/fac").await.unwrap());
        assert!(f.authorizer.authorize(user, "garbage", "/fac").await.is_err());
    }

    #[tokio::test]
    async fn test_no_memberships_deny() {
        let f = fixture();
        policy(&f, "member", "/", PolicyScope::Subtree, &["post:create"]).await;
        assert!(!f.authorizer.can(Uuid::now_v7(), "post:create", "/").await.unwrap());
    }

    #[tokio::test]
    async fn test_superuser_bypass() {
        let f = fixture();
        let admin = Uuid::now_v7();
        grant(&f, admin, "/", "root_admin").await;

        let decision = f.authorizer.decide(admin, "anything:at-all", "/fac/eng").await.unwrap();
        assert!(decision.allowed);
        assert!(decision.superuser);

        // Superuser checks never touch the policy store.
        f.policies.faults().set_unavailable(true);
        assert!(f.authorizer.can(admin, "post:create", "/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_root_admin_elsewhere_is_not_superuser() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/club", "root_admin").await;
        assert!(!f.authorizer.can(user, "post:create", "/club").await.unwrap());
    }

    #[tokio::test]
    async fn test_deactivation_flips_grant() {
        let f = fixture();
        let user = Uuid::now_v7();
        let m = grant(&f, user, "/club/cpsk", "head").await;
        policy(&f, "head", "/club", PolicyScope::Subtree, &["event:create"]).await;
        assert!(f.authorizer.can(user, "event:create", "/club/cpsk").await.unwrap());

        f.memberships.deactivate(m.id, Utc::now()).await.unwrap();
        assert!(!f.authorizer.can(user, "event:create", "/club/cpsk").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_policy_stops_granting() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/club", "head").await;
        let p = policy(&f, "head", "/club", PolicyScope::Subtree, &["event:create"]).await;
        f.policies.set_enabled(p.id, false).await.unwrap();
        assert!(!f.authorizer.can(user, "event:create", "/club").await.unwrap());
    }

    #[tokio::test]
    async fn test_abilities_for_batch() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/fac/eng", "member").await;
        let actions = ["post:create", "comment:create"];
        policy(&f, "member", "/fac", PolicyScope::Subtree, &actions).await;

        let abilities = f
            .authorizer
            .abilities_for(
                user,
                "/fac/eng",
                &["post:create", "comment:create", "event:create", "bad"],
            )
            .await
            .unwrap();
        assert_eq!(abilities.len(), 4);
        assert!(abilities["post:create"]);
        assert!(abilities["comment:create"]);
        assert!(!abilities["event:create"]);
        assert!(!abilities["bad"]);
    }

    #[tokio::test]
    async fn test_abilities_for_superuser_all_true() {
        let f = fixture();
        let admin = Uuid::now_v7();
        grant(&f, admin, "/", "root_admin").await;
        let abilities = f
            .authorizer
            .abilities_for(admin, "/fac", &["post:create", "policy:manage"])
            .await
            .unwrap();
        assert!(abilities.values().all(|allowed| *allowed));
    }

    #[tokio::test]
    async fn test_authorize_forbidden() {
        let f = fixture();
        let err = f
            .authorizer
            .authorize(Uuid::now_v7(), "post:create", "/fac")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden(_)));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let f = fixture();
        let user = Uuid::now_v7();
        grant(&f, user, "/club", "head").await;
        policy(&f, "head", "/club", PolicyScope::Subtree, &["event:create"]).await;

        f.policies.faults().set_unavailable(true);
        let err = f.authorizer.can(user, "event:create", "/club").await.unwrap_err();
        assert!(matches!(err, AccessError::TransientStore(_)));

        f.policies.faults().set_unavailable(false);
        f.memberships.faults().set_unavailable(true);
        let err = f.authorizer.authorize(user, "event:create", "/club").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let f = fixture();
        let authorizer = Authorizer::new(f.memberships.clone(), f.policies.clone())
            .with_timeout(Duration::from_millis(50));
        f.memberships.faults().set_latency(Duration::from_secs(5));

        let err = authorizer.can(Uuid::now_v7(), "post:create", "/").await.unwrap_err();
        assert!(matches!(err, AccessError::TransientStore(_)));
    }

    #[test]
    fn test_grants_check_first_grant_wins() {
        let user = Uuid::now_v7();
        let membership = Membership::new(
            user,
            OrgPath::parse("/fac/eng").unwrap(),
            PositionKey::parse("member").unwrap(),
        );
        let first = PolicyDraft::new("member", "/fac", PolicyScope::Subtree, &["post:create"])
            .validate()
            .unwrap();
        let second = PolicyDraft::new("member", "/", PolicyScope::Subtree, &["post:create"])
            .validate()
            .unwrap();
        let grants = Grants::new(vec![membership], vec![first.clone(), second]);
        assert_eq!(grants.check("post:create", "/fac/eng").policy_id, Some(first.id));
    }
}
