//! # Campus Content
//!
//! Content visibility and the feed of the campus access engine.
//!
//! ## Overview
//!
//! The campus-content crate handles:
//! - **Content**: Posts, events and comments under an org node
//! - **Visibility**: Public items, or private items with an org-node
//!   audience
//! - **Predicates**: A typed filter tree the store evaluates during its
//!   scan, so page sizes count visible rows only
//! - **Cursors**: Opaque, checksummed `(sort_at, id)` tokens
//! - **Feed**: `list_visible`, `get` and `create`
//!
//! ## Visibility rule
//!
//! ```text
//! visible(viewer, item) =
//!     item is public
//!  || item.audience ∩ viewer.reachable_node_ids ≠ ∅
//!  || viewer is the author
//!  || viewer is the superuser
//! ```
//!
//! ## Pagination
//!
//! Feeds are ordered by `(sort_at DESC, id DESC)`. Each page asks the
//! store for `limit + 1` rows strictly before the cursor; the extra row
//! only signals that a next page exists.

pub mod content;
pub mod cursor;
pub mod feed;
pub mod predicate;
pub mod store;
pub mod visibility;

// Re-export main types for convenience
pub use content::{normalize_categories, ContentDraft, ContentItem, ContentKind};
pub use cursor::Position;
pub use feed::{FeedPage, FeedService, PageLimits, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use predicate::{FeedFilter, Predicate, VisibilityFilter};
pub use store::{
    ContentQuery, ContentStore, ContentTransaction, ItemRecord, MemoryContentStore,
};
pub use visibility::{can_view, Access, ContentVisibility};
