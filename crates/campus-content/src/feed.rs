//! Feed service
//!
//! One read path and one write path for every content kind:
//!
//! - [`FeedService::list_visible`] pages through the items a viewer may
//!   see, newest first, with an opaque cursor.
//! - [`FeedService::create`] checks `<kind>:create` for the author at the
//!   target org node, validates the audience and writes the item with its
//!   side records in one transaction.

use std::sync::Arc;
use std::time::Duration;

use campus_events::{publish_best_effort, ContentEvent, EventBus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_org::{
    bounded, AccessError, AccessResult, OrgPath, OrgStore, ViewerAccess, DEFAULT_STORE_TIMEOUT,
};
use campus_rbac::Authorizer;

use crate::content::{ContentDraft, ContentItem};
use crate::cursor::{self, Position};
use crate::predicate::{FeedFilter, Predicate, VisibilityFilter};
use crate::store::{ContentQuery, ContentStore};
use crate::visibility::{can_view, ContentVisibility};

/// Default number of items per page.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Largest page a caller can ask for.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Page size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    /// Used when the caller gives no limit
    pub default_limit: usize,
    /// Larger limits are clamped to this
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl PageLimits {
    /// Resolve a requested limit.
    pub fn resolve(&self, requested: Option<usize>) -> AccessResult<usize> {
        match requested {
            Some(0) => Err(AccessError::validation("limit must be at least 1")),
            Some(limit) => Ok(limit.min(self.max_limit)),
            None => Ok(self.default_limit.min(self.max_limit)),
        }
    }
}

/// One page of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<ContentItem>,
    /// Present iff more items follow
    pub next_cursor: Option<String>,
}

/// Feed service over the content and org stores.
pub struct FeedService {
    content: Arc<dyn ContentStore>,
    orgs: Arc<dyn OrgStore>,
    authorizer: Arc<Authorizer>,
    events: Option<Arc<dyn EventBus>>,
    timeout: Duration,
    limits: PageLimits,
}

impl std::fmt::Debug for FeedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedService")
            .field("timeout", &self.timeout)
            .field("limits", &self.limits)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl FeedService {
    /// Create a feed service.
    pub fn new(
        content: Arc<dyn ContentStore>,
        orgs: Arc<dyn OrgStore>,
        authorizer: Arc<Authorizer>,
    ) -> Self {
        Self {
            content,
            orgs,
            authorizer,
            events: None,
            timeout: DEFAULT_STORE_TIMEOUT,
            limits: PageLimits::default(),
        }
    }

    /// Publish content events to `bus`.
    pub fn with_events(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the page size bounds.
    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Page through the items `viewer` may see.
    ///
    /// Fetches one row more than the page size to learn whether another
    /// page exists. A malformed cursor is a validation error.
    pub async fn list_visible(
        &self,
        viewer: &ViewerAccess,
        cursor: Option<&str>,
        limit: Option<usize>,
        filter: &FeedFilter,
    ) -> AccessResult<FeedPage> {
        let limit = self.limits.resolve(limit)?;
        let after: Option<Position> = cursor.map(cursor::decode).transpose()?;

        let mut predicate = VisibilityFilter::for_viewer(viewer).and(filter.to_predicate());
        if let Some(position) = after {
            predicate = predicate.and(Predicate::Before(position));
        }

        let query = ContentQuery {
            predicate,
            limit: limit + 1,
        };
        let mut items = bounded(self.timeout, "content.query", self.content.query(&query)).await?;

        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|last| cursor::encode(&last.position()))
        } else {
            None
        };

        tracing::debug!(
            user_id = ?viewer.user_id,
            superuser = viewer.superuser,
            limit,
            returned = items.len(),
            has_more = next_cursor.is_some(),
            "Listed visible content"
        );

        Ok(FeedPage { items, next_cursor })
    }

    /// Load one item, if `viewer` may see it.
    ///
    /// Missing items are `NotFound`; hidden ones are `Forbidden`.
    pub async fn get(&self, viewer: &ViewerAccess, id: Uuid) -> AccessResult<ContentItem> {
        let item = bounded(self.timeout, "content.get", self.content.get(id))
            .await?
            .ok_or_else(|| AccessError::not_found(format!("content {}", id)))?;
        if !can_view(viewer, &item) {
            return Err(AccessError::forbidden(format!("content {}", id)));
        }
        Ok(item)
    }

    /// Publish an item as `author_id`.
    pub async fn create(&self, author_id: Uuid, draft: ContentDraft) -> AccessResult<ContentItem> {
        draft.validate()?;

        let org_path = OrgPath::normalized(&draft.org_path);
        let node = bounded(self.timeout, "org.get_by_path", self.orgs.get_by_path(&org_path))
            .await?
            .ok_or_else(|| AccessError::not_found(format!("org node {}", org_path)))?;

        self.authorizer
            .authorize(author_id, draft.kind.create_action().as_str(), node.path.as_str())
            .await?;

        self.check_audience(&draft.visibility).await?;
        if let Some(parent_id) = draft.parent_id {
            bounded(self.timeout, "content.get", self.content.get(parent_id))
                .await?
                .ok_or_else(|| AccessError::not_found(format!("parent content {}", parent_id)))?;
        }

        let item = draft.into_item(author_id, node.path)?;
        let (record, visibility, categories) = item.clone().into_records();

        let mut tx = bounded(self.timeout, "content.begin", self.content.begin()).await?;
        tx.insert_item(record);
        tx.insert_visibility(item.id, visibility);
        tx.insert_categories(item.id, categories);
        bounded(self.timeout, "content.commit", tx.commit()).await?;

        tracing::info!(
            content_id = %item.id,
            kind = item.kind.as_str(),
            author_id = %author_id,
            org_path = %item.org_path,
            access = %item.visibility.access(),
            "Published content"
        );

        publish_best_effort(
            self.events.as_ref(),
            ContentEvent::Published {
                content_id: item.id,
                kind: item.kind.as_str().to_string(),
                author_id,
                org_path: item.org_path.to_string(),
                access: item.visibility.access().to_string(),
                audience: item.visibility.audience().to_vec(),
                categories: item.categories.clone(),
            }
            .to_event(),
        )
        .await;

        Ok(item)
    }

    /// Every audience node must exist.
    async fn check_audience(&self, visibility: &ContentVisibility) -> AccessResult<()> {
        let audience = visibility.audience();
        if audience.is_empty() {
            return Ok(());
        }
        let nodes = bounded(self.timeout, "org.get_many", self.orgs.get_many(audience)).await?;
        let missing: Vec<String> = audience
            .iter()
            .filter(|id| !nodes.iter().any(|node| node.id == **id))
            .map(Uuid::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AccessError::not_found(format!(
                "audience org nodes {}",
                missing.join(", ")
            )))
        }
    }
}
