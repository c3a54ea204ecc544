//! Content store
//!
//! Items are persisted as three records: the item itself, its visibility
//! row and its category rows. Writes go through a [`ContentTransaction`]
//! that stages all three and applies them together on `commit`; a
//! transaction dropped before `commit` (for example because the request
//! was cancelled) leaves no trace.
//!
//! Reads take a [`ContentQuery`]: the predicate is evaluated by the store
//! during its scan, rows come back in `(sort_at DESC, id DESC)` order and
//! at most `limit` of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use campus_org::{AccessError, AccessResult, Faults, OrgPath};

use crate::content::{ContentItem, ContentKind};
use crate::cursor::Position;
use crate::predicate::Predicate;
use crate::visibility::ContentVisibility;

/// A listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    /// Rows must match this
    pub predicate: Predicate,
    /// Maximum number of rows returned
    pub limit: usize,
}

/// Core columns of an item, without its side records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: Uuid,
    pub kind: ContentKind,
    pub author_id: Uuid,
    pub org_path: OrgPath,
    pub title: String,
    pub body: String,
    pub sort_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub starts_at: Option<DateTime<Utc>>,
    pub parent_id: Option<Uuid>,
}

impl ItemRecord {
    /// Reassemble the item from its side records.
    pub fn join(&self, visibility: &ContentVisibility, categories: &[String]) -> ContentItem {
        ContentItem {
            id: self.id,
            kind: self.kind,
            author_id: self.author_id,
            org_path: self.org_path.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            categories: categories.to_vec(),
            visibility: visibility.clone(),
            sort_at: self.sort_at,
            created_at: self.created_at,
            starts_at: self.starts_at,
            parent_id: self.parent_id,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.sort_at, self.id)
    }
}

impl ContentItem {
    /// Split into the item record and its side records.
    pub fn into_records(self) -> (ItemRecord, ContentVisibility, Vec<String>) {
        let record = ItemRecord {
            id: self.id,
            kind: self.kind,
            author_id: self.author_id,
            org_path: self.org_path,
            title: self.title,
            body: self.body,
            sort_at: self.sort_at,
            created_at: self.created_at,
            starts_at: self.starts_at,
            parent_id: self.parent_id,
        };
        (record, self.visibility, self.categories)
    }
}

/// A multi-record write applied all at once.
#[async_trait]
pub trait ContentTransaction: Send {
    /// Stage an item record.
    fn insert_item(&mut self, record: ItemRecord);

    /// Stage the visibility row of an item.
    fn insert_visibility(&mut self, content_id: Uuid, visibility: ContentVisibility);

    /// Stage the category rows of an item.
    fn insert_categories(&mut self, content_id: Uuid, categories: Vec<String>);

    /// Apply every staged record, or none of them.
    async fn commit(self: Box<Self>) -> AccessResult<()>;
}

/// Persistence for content items.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Rows matching the query, newest first.
    async fn query(&self, query: &ContentQuery) -> AccessResult<Vec<ContentItem>>;

    /// Look an item up by ID.
    async fn get(&self, id: Uuid) -> AccessResult<Option<ContentItem>>;

    /// Start a write transaction.
    async fn begin(&self) -> AccessResult<Box<dyn ContentTransaction>>;
}

#[derive(Debug, Default)]
struct Tables {
    items: BTreeMap<Position, ItemRecord>,
    positions: HashMap<Uuid, Position>,
    visibility: HashMap<Uuid, ContentVisibility>,
    categories: HashMap<Uuid, Vec<String>>,
}

impl Tables {
    fn joined(&self, record: &ItemRecord) -> Option<ContentItem> {
        let Some(visibility) = self.visibility.get(&record.id) else {
            tracing::warn!(content_id = %record.id, "Item without visibility row, hiding it");
            return None;
        };
        let categories = self
            .categories
            .get(&record.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Some(record.join(visibility, categories))
    }
}

/// In-memory content store.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryContentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection handle.
    pub fn faults(&self) -> Arc<Faults> {
        self.faults.clone()
    }

    /// Number of committed item records.
    pub async fn len(&self) -> usize {
        self.tables.read().await.items.len()
    }

    /// Check if no item was committed.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn query(&self, query: &ContentQuery) -> AccessResult<Vec<ContentItem>> {
        self.faults.check("content.query").await?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let tables = self.tables.read().await;
        let rows: Box<dyn Iterator<Item = &ItemRecord>> = match query.predicate.upper_bound() {
            Some(bound) => Box::new(tables.items.range(..bound).rev().map(|(_, r)| r)),
            None => Box::new(tables.items.values().rev()),
        };

        Ok(rows
            .filter_map(|record| tables.joined(record))
            .filter(|item| query.predicate.matches(item))
            .take(query.limit)
            .collect())
    }

    async fn get(&self, id: Uuid) -> AccessResult<Option<ContentItem>> {
        self.faults.check("content.get").await?;
        let tables = self.tables.read().await;
        Ok(tables
            .positions
            .get(&id)
            .and_then(|position| tables.items.get(position))
            .and_then(|record| tables.joined(record)))
    }

    async fn begin(&self) -> AccessResult<Box<dyn ContentTransaction>> {
        self.faults.check("content.begin").await?;
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            faults: self.faults.clone(),
            items: Vec::new(),
            visibility: Vec::new(),
            categories: Vec::new(),
            committed: false,
        }))
    }
}

struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
    items: Vec<ItemRecord>,
    visibility: Vec<(Uuid, ContentVisibility)>,
    categories: Vec<(Uuid, Vec<String>)>,
    committed: bool,
}

impl MemoryTransaction {
    fn staged(&self) -> usize {
        self.items.len() + self.visibility.len() + self.categories.len()
    }

    /// Reject a write set that would leave the tables inconsistent.
    fn check(&self, tables: &Tables) -> AccessResult<()> {
        for record in &self.items {
            if tables.positions.contains_key(&record.id) {
                return Err(AccessError::conflict(format!("content {} already exists", record.id)));
            }
            if !self.visibility.iter().any(|(id, _)| *id == record.id) {
                return Err(AccessError::Internal(format!(
                    "content {} staged without a visibility row",
                    record.id
                )));
            }
        }
        let known = |id: &Uuid| {
            tables.positions.contains_key(id) || self.items.iter().any(|r| r.id == *id)
        };
        for id in self
            .visibility
            .iter()
            .map(|(id, _)| id)
            .chain(self.categories.iter().map(|(id, _)| id))
        {
            if !known(id) {
                return Err(AccessError::not_found(format!("content {}", id)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContentTransaction for MemoryTransaction {
    fn insert_item(&mut self, record: ItemRecord) {
        self.items.push(record);
    }

    fn insert_visibility(&mut self, content_id: Uuid, visibility: ContentVisibility) {
        self.visibility.push((content_id, visibility));
    }

    fn insert_categories(&mut self, content_id: Uuid, categories: Vec<String>) {
        self.categories.push((content_id, categories));
    }

    async fn commit(mut self: Box<Self>) -> AccessResult<()> {
        self.faults.check("content.commit").await?;

        let tables = self.tables.clone();
        let mut tables = tables.write().await;
        self.check(&tables)?;

        for record in self.items.drain(..) {
            let position = record.position();
            tables.positions.insert(record.id, position);
            tables.items.insert(position, record);
        }
        for (id, visibility) in self.visibility.drain(..) {
            tables.visibility.insert(id, visibility);
        }
        for (id, categories) in self.categories.drain(..) {
            tables.categories.insert(id, categories);
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.committed && self.staged() > 0 {
            tracing::debug!(staged = self.staged(), "Content transaction aborted");
        }
    }
}
