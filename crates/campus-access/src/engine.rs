//! Access engine facade
//!
//! Wires the org tree, membership directory, policy evaluator and feed
//! service over one set of stores and one event bus. Reads are retried on
//! transient store errors; writes are not.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use campus_content::{
    ContentDraft, ContentItem, ContentStore, FeedFilter, FeedPage, FeedService,
    MemoryContentStore,
};
use campus_events::{EventBus, MemoryEventBus};
use campus_org::{
    AccessError, AccessResult, MemoryMembershipStore, MemoryOrgStore, Membership,
    MembershipDirectory, MembershipStore, OrgNode, OrgPath, OrgStatus, OrgStore, OrgTree,
    PositionKey, ViewerAccess, ViewerAccessBuilder, ROOT_ADMIN,
};
use campus_rbac::{
    ActionKey, Authorizer, MemoryPolicyStore, Policy, PolicyAdmin, PolicyDraft, PolicyStore,
    Resource, Verb,
};

use crate::config::{ConfigError, EngineConfig};
use crate::retry::{with_retry_if, RetryConfig};

/// Store handles the engine runs over.
#[derive(Clone)]
pub struct Stores {
    pub orgs: Arc<dyn OrgStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub content: Arc<dyn ContentStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            orgs: Arc::new(MemoryOrgStore::new()),
            memberships: Arc::new(MemoryMembershipStore::new()),
            policies: Arc::new(MemoryPolicyStore::new()),
            content: Arc::new(MemoryContentStore::new()),
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

/// Access control and content visibility over one campus org hierarchy.
pub struct AccessEngine {
    config: EngineConfig,
    retry: RetryConfig,
    events: Arc<dyn EventBus>,
    tree: OrgTree,
    directory: MembershipDirectory,
    viewers: ViewerAccessBuilder,
    authorizer: Arc<Authorizer>,
    policies: PolicyAdmin,
    feed: FeedService,
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AccessEngine {
    /// Build an engine over `stores`, publishing domain events to `events`.
    pub fn new(
        config: EngineConfig,
        stores: Stores,
        events: Arc<dyn EventBus>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = config.store_timeout();

        let authorizer = Arc::new(
            Authorizer::new(stores.memberships.clone(), stores.policies.clone())
                .with_timeout(timeout),
        );

        let engine = Self {
            retry: config.read_retry(),
            tree: OrgTree::new(stores.orgs.clone())
                .with_events(events.clone())
                .with_timeout(timeout),
            directory: MembershipDirectory::new(stores.memberships.clone(), stores.orgs.clone())
                .with_events(events.clone())
                .with_timeout(timeout),
            viewers: ViewerAccessBuilder::new(stores.memberships.clone(), stores.orgs.clone())
                .with_timeout(timeout),
            policies: PolicyAdmin::new(stores.policies.clone())
                .with_events(events.clone())
                .with_timeout(timeout),
            feed: FeedService::new(stores.content.clone(), stores.orgs.clone(), authorizer.clone())
                .with_events(events.clone())
                .with_timeout(timeout)
                .with_limits(config.page_limits()),
            authorizer,
            events,
            config,
        };

        tracing::info!(
            store_timeout_ms = engine.config.store_timeout_ms,
            max_attempts = engine.retry.max_attempts,
            max_page_limit = engine.config.max_page_limit,
            "Access engine ready"
        );

        Ok(engine)
    }

    /// Engine over fresh in-memory stores and an in-memory event bus.
    pub fn in_memory(config: EngineConfig) -> Result<Self, ConfigError> {
        let events: Arc<dyn EventBus> =
            Arc::new(MemoryEventBus::with_capacity(config.event_channel_capacity));
        Self::new(config, Stores::in_memory(), events)
    }

    /// Event bus the engine publishes to.
    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- reads ----

    /// Whether `user_id` may perform `action` at `org_path`.
    #[instrument(skip(self))]
    pub async fn can(&self, user_id: Uuid, action: &str, org_path: &str) -> AccessResult<bool> {
        with_retry_if(
            &self.retry,
            || self.authorizer.can(user_id, action, org_path),
            AccessError::is_retryable,
        )
        .await
    }

    /// Allow flags for each of `actions` at `org_path`.
    #[instrument(skip(self))]
    pub async fn abilities_for(
        &self,
        user_id: Uuid,
        org_path: &str,
        actions: &[&str],
    ) -> AccessResult<BTreeMap<String, bool>> {
        with_retry_if(
            &self.retry,
            || self.authorizer.abilities_for(user_id, org_path, actions),
            AccessError::is_retryable,
        )
        .await
    }

    /// Reachable org scope of a signed-in user.
    #[instrument(skip(self))]
    pub async fn build_viewer_access(&self, user_id: Uuid) -> AccessResult<ViewerAccess> {
        with_retry_if(
            &self.retry,
            || self.viewers.build(user_id),
            AccessError::is_retryable,
        )
        .await
    }

    /// Viewer access for an optional identity; `None` reads as anonymous.
    pub async fn viewer(&self, user_id: Option<Uuid>) -> AccessResult<ViewerAccess> {
        match user_id {
            Some(user_id) => self.build_viewer_access(user_id).await,
            None => Ok(ViewerAccess::anonymous()),
        }
    }

    /// One page of the content `viewer` may see, newest first.
    #[instrument(skip(self, viewer), fields(user_id = ?viewer.user_id))]
    pub async fn list_visible(
        &self,
        viewer: &ViewerAccess,
        cursor: Option<&str>,
        limit: Option<usize>,
        filter: &FeedFilter,
    ) -> AccessResult<FeedPage> {
        with_retry_if(
            &self.retry,
            || self.feed.list_visible(viewer, cursor, limit, filter),
            AccessError::is_retryable,
        )
        .await
    }

    /// Load one item if `viewer` may see it.
    #[instrument(skip(self, viewer), fields(user_id = ?viewer.user_id))]
    pub async fn get_content(&self, viewer: &ViewerAccess, id: Uuid) -> AccessResult<ContentItem> {
        with_retry_if(
            &self.retry,
            || self.feed.get(viewer, id),
            AccessError::is_retryable,
        )
        .await
    }

    /// Active memberships of a user.
    #[instrument(skip(self))]
    pub async fn memberships(&self, user_id: Uuid) -> AccessResult<Vec<Membership>> {
        with_retry_if(
            &self.retry,
            || self.directory.find_active_by_user(user_id),
            AccessError::is_retryable,
        )
        .await
    }

    /// Every membership a user ever held.
    #[instrument(skip(self))]
    pub async fn membership_history(&self, user_id: Uuid) -> AccessResult<Vec<Membership>> {
        with_retry_if(
            &self.retry,
            || self.directory.history(user_id),
            AccessError::is_retryable,
        )
        .await
    }

    /// Node and descendants at `org_path`, sorted by path.
    #[instrument(skip(self))]
    pub async fn subtree(&self, org_path: &str) -> AccessResult<Vec<OrgNode>> {
        with_retry_if(
            &self.retry,
            || self.tree.subtree(org_path),
            AccessError::is_retryable,
        )
        .await
    }

    /// All policies, for an actor allowed to manage policies at the root.
    #[instrument(skip(self))]
    pub async fn list_policies(&self, actor_id: Uuid) -> AccessResult<Vec<Policy>> {
        self.require(actor_id, Resource::Policy, &OrgPath::root()).await?;
        with_retry_if(
            &self.retry,
            || self.policies.list(),
            AccessError::is_retryable,
        )
        .await
    }

    // ---- writes ----

    /// Ensure the root node exists and make `user_id` a superuser.
    ///
    /// Runs without an authorization check; meant for first-run setup.
    /// Granting again to a current superuser returns the existing row.
    #[instrument(skip(self))]
    pub async fn bootstrap_superuser(&self, user_id: Uuid) -> AccessResult<Membership> {
        self.tree.ensure_root().await?;
        match self.directory.create(user_id, "/", ROOT_ADMIN).await {
            Err(AccessError::Conflict(_)) => self
                .directory
                .find_active_by_user(user_id)
                .await?
                .into_iter()
                .find(Membership::is_superuser)
                .ok_or_else(|| AccessError::Internal("superuser grant vanished".to_string())),
            other => other,
        }
    }

    /// Create an org node under an existing parent.
    #[instrument(skip(self))]
    pub async fn create_org_node(
        &self,
        actor_id: Uuid,
        org_path: &str,
        name: &str,
    ) -> AccessResult<OrgNode> {
        let path = OrgPath::parse(org_path)?;
        let parent = path
            .parent()
            .ok_or_else(|| AccessError::conflict("root node already exists"))?;
        self.require(actor_id, Resource::Org, &parent).await?;
        self.tree.create_node(path.as_str(), name).await
    }

    /// Archive or reactivate an org node.
    #[instrument(skip(self))]
    pub async fn set_org_status(
        &self,
        actor_id: Uuid,
        org_path: &str,
        status: OrgStatus,
    ) -> AccessResult<OrgNode> {
        let path = OrgPath::normalized(org_path);
        self.require(actor_id, Resource::Org, &path).await?;
        self.tree.set_status(path.as_str(), status).await
    }

    /// Grant `position` at `org_path` to `user_id`.
    ///
    /// `root_admin` can only be granted by a superuser, whatever policies
    /// the actor holds.
    #[instrument(skip(self))]
    pub async fn grant_membership(
        &self,
        actor_id: Uuid,
        user_id: Uuid,
        org_path: &str,
        position: &str,
    ) -> AccessResult<Membership> {
        let path = OrgPath::normalized(org_path);
        let position_key = PositionKey::parse(position)?;
        if position_key.is_root_admin() {
            self.require_superuser(actor_id, "grant root_admin").await?;
        } else {
            self.require(actor_id, Resource::Membership, &path).await?;
        }
        self.directory
            .create(user_id, path.as_str(), position_key.as_str())
            .await
    }

    /// End a membership, keeping the row as history.
    ///
    /// Ending a `root_admin` membership needs a superuser.
    #[instrument(skip(self))]
    pub async fn end_membership(
        &self,
        actor_id: Uuid,
        membership_id: Uuid,
    ) -> AccessResult<Membership> {
        let membership = self.directory.get(membership_id).await?;
        if membership.position_key.is_root_admin() {
            self.require_superuser(actor_id, "end root_admin").await?;
        } else {
            self.require(actor_id, Resource::Membership, &membership.org_path)
                .await?;
        }
        self.directory.deactivate(membership_id).await
    }

    /// Create or replace a policy.
    ///
    /// Replacing needs `policy:manage` at both the old and the new prefix.
    #[instrument(
        skip(self, draft),
        fields(position = %draft.position_key, org_prefix = %draft.org_prefix)
    )]
    pub async fn upsert_policy(&self, actor_id: Uuid, draft: &PolicyDraft) -> AccessResult<Policy> {
        let proposed = draft.validate()?;
        if let Some(id) = draft.id {
            let existing = self.policies.get(id).await?;
            self.require(actor_id, Resource::Policy, &existing.org_prefix)
                .await?;
        }
        self.require(actor_id, Resource::Policy, &proposed.org_prefix)
            .await?;
        self.policies.upsert(draft).await
    }

    /// Enable or disable a policy.
    #[instrument(skip(self))]
    pub async fn set_policy_enabled(
        &self,
        actor_id: Uuid,
        policy_id: Uuid,
        enabled: bool,
    ) -> AccessResult<Policy> {
        let policy = self.policies.get(policy_id).await?;
        self.require(actor_id, Resource::Policy, &policy.org_prefix)
            .await?;
        self.policies.set_enabled(policy_id, enabled).await
    }

    /// Publish content as `author_id`.
    #[instrument(skip(self, draft), fields(kind = draft.kind.as_str(), org_path = %draft.org_path))]
    pub async fn create_content(
        &self,
        author_id: Uuid,
        draft: ContentDraft,
    ) -> AccessResult<ContentItem> {
        self.feed.create(author_id, draft).await
    }

    async fn require(
        &self,
        actor_id: Uuid,
        resource: Resource,
        path: &OrgPath,
    ) -> AccessResult<()> {
        let action = ActionKey::new(resource, Verb::Manage);
        self.authorizer
            .authorize(actor_id, action.as_str(), path.as_str())
            .await
            .map(|_| ())
    }

    async fn require_superuser(&self, actor_id: Uuid, operation: &str) -> AccessResult<()> {
        if self.authorizer.load(actor_id).await?.is_superuser() {
            return Ok(());
        }
        tracing::warn!(actor_id = %actor_id, operation, "Superuser-only operation refused");
        Err(AccessError::forbidden(format!(
            "{} requires a superuser",
            operation
        )))
    }
}
