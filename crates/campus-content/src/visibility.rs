//! Content visibility
//!
//! Public content is visible to everyone, anonymous readers included.
//! Private content is visible to viewers who reach at least one audience
//! node, to its author and to the superuser.
//!
//! The same rule is expressed twice: [`can_view`] for one item in hand,
//! and [`crate::predicate::VisibilityFilter`] as a predicate the store
//! evaluates while it scans, so limits and pagination count only visible
//! rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use campus_org::{AccessError, AccessResult, ViewerAccess};

use crate::content::ContentItem;

/// Access level of an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Private,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Public => write!(f, "public"),
            Access::Private => write!(f, "private"),
        }
    }
}

/// Visibility embedded on every content item.
///
/// Only private content has an audience, so a public item can never carry
/// a stale audience constraint.
///
/// # Examples
///
/// ```
/// use campus_content::{Access, ContentVisibility};
/// use uuid::Uuid;
///
/// let node = Uuid::now_v7();
/// let private = ContentVisibility::private([node, node]);
/// assert_eq!(private.access(), Access::Private);
/// assert_eq!(private.audience(), &[node]);
/// assert!(ContentVisibility::Public.audience().is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum ContentVisibility {
    /// Everyone
    #[default]
    Public,
    /// Viewers reaching one of the audience org nodes
    Private { audience: Vec<Uuid> },
}

impl ContentVisibility {
    /// Private visibility for the given org node IDs, sorted and
    /// de-duplicated.
    pub fn private(audience: impl IntoIterator<Item = Uuid>) -> Self {
        ContentVisibility::Private {
            audience: audience.into_iter().collect(),
        }
        .canonical()
    }

    /// Access level.
    pub fn access(&self) -> Access {
        match self {
            ContentVisibility::Public => Access::Public,
            ContentVisibility::Private { .. } => Access::Private,
        }
    }

    /// Audience node IDs; empty for public content.
    pub fn audience(&self) -> &[Uuid] {
        match self {
            ContentVisibility::Public => &[],
            ContentVisibility::Private { audience } => audience,
        }
    }

    /// Check if the item is public.
    pub fn is_public(&self) -> bool {
        matches!(self, ContentVisibility::Public)
    }

    /// A private item nobody but its author could see is rejected.
    pub fn validate(&self) -> AccessResult<()> {
        match self {
            ContentVisibility::Private { audience } if audience.is_empty() => Err(
                AccessError::validation("private content needs at least one audience node"),
            ),
            _ => Ok(()),
        }
    }

    /// Sorted, de-duplicated form.
    pub fn canonical(self) -> Self {
        match self {
            ContentVisibility::Public => ContentVisibility::Public,
            ContentVisibility::Private { mut audience } => {
                audience.sort();
                audience.dedup();
                ContentVisibility::Private { audience }
            }
        }
    }
}

/// Check if `viewer` may see `item`.
pub fn can_view(viewer: &ViewerAccess, item: &ContentItem) -> bool {
    if viewer.superuser || viewer.is_user(item.author_id) {
        return true;
    }
    match &item.visibility {
        ContentVisibility::Public => true,
        ContentVisibility::Private { audience } => viewer.reaches_any(audience),
    }
}
