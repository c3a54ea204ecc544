//! Content items
//!
//! Posts, events and comments share one model and one visibility rule.
//! Every item carries the org node it was published under and a
//! [`ContentVisibility`].

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use campus_org::{AccessError, AccessResult, OrgPath};
use campus_rbac::{ActionKey, Resource, Verb};

use crate::cursor::Position;
use crate::visibility::ContentVisibility;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum number of categories on one item.
pub const MAX_CATEGORIES: usize = 16;

/// Kind of content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Feed post
    Post,
    /// Event with a start time
    Event,
    /// Comment on another item
    Comment,
}

impl ContentKind {
    /// Get the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Event => "event",
            ContentKind::Comment => "comment",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> AccessResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "post" => Ok(ContentKind::Post),
            "event" => Ok(ContentKind::Event),
            "comment" => Ok(ContentKind::Comment),
            other => Err(AccessError::validation(format!("unknown content kind: {:?}", other))),
        }
    }

    /// Resource name used in action keys.
    pub fn resource(&self) -> Resource {
        match self {
            ContentKind::Post => Resource::Post,
            ContentKind::Event => Resource::Event,
            ContentKind::Comment => Resource::Comment,
        }
    }

    /// Action required to publish this kind, e.g. `post:create`.
    pub fn create_action(&self) -> ActionKey {
        ActionKey::new(self.resource(), Verb::Create)
    }
}

/// A published content item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentItem {
    /// Unique ID
    pub id: Uuid,

    /// Kind of content
    pub kind: ContentKind,

    /// Author's user ID
    pub author_id: Uuid,

    /// Org node the item was published under
    pub org_path: OrgPath,

    /// Title
    pub title: String,

    /// Body text
    pub body: String,

    /// Category tags, lowercase and sorted
    pub categories: Vec<String>,

    /// Who may see the item
    pub visibility: ContentVisibility,

    /// Feed ordering key, microsecond precision
    pub sort_at: DateTime<Utc>,

    /// When the item was created
    pub created_at: DateTime<Utc>,

    /// Start of an event
    pub starts_at: Option<DateTime<Utc>>,

    /// Item a comment belongs to
    pub parent_id: Option<Uuid>,
}

impl ContentItem {
    /// The item's place in the feed ordering.
    pub fn position(&self) -> Position {
        Position::new(self.sort_at, self.id)
    }

    /// Check if the item carries `category`.
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.binary_search_by(|c| c.as_str().cmp(category)).is_ok()
    }
}

/// Input for publishing an item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentDraft {
    pub kind: ContentKind,
    pub org_path: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub visibility: ContentVisibility,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl ContentDraft {
    /// Draft of a public post.
    pub fn post(org_path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Post,
            org_path: org_path.into(),
            title: title.into(),
            body: String::new(),
            categories: Vec::new(),
            visibility: ContentVisibility::Public,
            starts_at: None,
            parent_id: None,
        }
    }

    /// Draft of a public event.
    pub fn event(
        org_path: impl Into<String>,
        title: impl Into<String>,
        starts_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ContentKind::Event,
            starts_at: Some(starts_at),
            ..Self::post(org_path, title)
        }
    }

    /// Draft of a comment on `parent_id`.
    pub fn comment(org_path: impl Into<String>, parent_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Comment,
            body: body.into(),
            parent_id: Some(parent_id),
            ..Self::post(org_path, "")
        }
    }

    /// Set the visibility.
    pub fn with_visibility(mut self, visibility: ContentVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Add a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Check the fields that need no store.
    ///
    /// Audience nodes and comment parents are checked by the feed service.
    pub fn validate(&self) -> AccessResult<()> {
        match self.kind {
            ContentKind::Post | ContentKind::Event => {
                let title = self.title.trim();
                if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
                    return Err(AccessError::validation(format!(
                        "title must be 1..={} characters",
                        MAX_TITLE_LEN
                    )));
                }
            }
            ContentKind::Comment => {
                if self.body.trim().is_empty() {
                    return Err(AccessError::validation("comment body must not be empty"));
                }
            }
        }

        match (self.kind, self.starts_at) {
            (ContentKind::Event, None) => {
                return Err(AccessError::validation("event needs a start time"));
            }
            (ContentKind::Post | ContentKind::Comment, Some(_)) => {
                return Err(AccessError::validation("only events have a start time"));
            }
            _ => {}
        }

        match (self.kind, self.parent_id) {
            (ContentKind::Comment, None) => {
                return Err(AccessError::validation("comment needs a parent item"));
            }
            (ContentKind::Post | ContentKind::Event, Some(_)) => {
                return Err(AccessError::validation("only comments have a parent item"));
            }
            _ => {}
        }

        self.visibility.validate()?;
        normalize_categories(&self.categories)?;
        Ok(())
    }

    /// Turn a validated draft into an item.
    pub fn into_item(self, author_id: Uuid, org_path: OrgPath) -> AccessResult<ContentItem> {
        let categories = normalize_categories(&self.categories)?;
        let now = Utc::now().trunc_subsecs(6);
        Ok(ContentItem {
            id: Uuid::now_v7(),
            kind: self.kind,
            author_id,
            org_path,
            title: self.title.trim().to_string(),
            body: self.body,
            categories,
            visibility: self.visibility.canonical(),
            sort_at: now,
            created_at: now,
            starts_at: self.starts_at,
            parent_id: self.parent_id,
        })
    }
}

/// Lowercase, de-duplicate and sort category tags.
pub fn normalize_categories(categories: &[String]) -> AccessResult<Vec<String>> {
    let mut normalized: Vec<String> = categories
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    if let Some(bad) = normalized
        .iter()
        .find(|c| c.is_empty() || c.len() > 64 || c.chars().any(char::is_whitespace))
    {
        return Err(AccessError::validation(format!("invalid category: {:?}", bad)));
    }
    normalized.sort();
    normalized.dedup();
    if normalized.len() > MAX_CATEGORIES {
        return Err(AccessError::validation(format!(
            "at most {} categories",
            MAX_CATEGORIES
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_actions() {
        assert_eq!(ContentKind::Post.create_action().as_str(), "post:create");
        assert_eq!(ContentKind::Event.create_action().as_str(), "event:create");
        assert_eq!(ContentKind::Comment.create_action().as_str(), "comment:create");
        assert_eq!(ContentKind::parse("EVENT").unwrap(), ContentKind::Event);
        assert!(ContentKind::parse("form").is_err());
    }

    #[test]
    fn test_draft_rules() {
        assert!(ContentDraft::post("/fac", "Hello").validate().is_ok());
        assert!(ContentDraft::post("/fac", "   ").validate().is_err());
        assert!(ContentDraft::post("/fac", "x".repeat(MAX_TITLE_LEN + 1)).validate().is_err());

        let mut post = ContentDraft::post("/fac", "Hello");
        post.starts_at = Some(Utc::now());
        assert!(post.validate().is_err());

        let mut event = ContentDraft::event("/fac", "Fair", Utc::now());
        assert!(event.validate().is_ok());
        event.starts_at = None;
        assert!(event.validate().is_err());

        assert!(ContentDraft::comment("/fac", Uuid::now_v7(), "nice").validate().is_ok());
        assert!(ContentDraft::comment("/fac", Uuid::now_v7(), " ").validate().is_err());
    }

    #[test]
    fn test_private_draft_needs_audience() {
        let draft = ContentDraft::post("/fac", "Secret")
            .with_visibility(ContentVisibility::Private { audience: Vec::new() });
        assert!(matches!(draft.validate(), Err(AccessError::Validation(_))));
    }

    #[test]
    fn test_categories_normalized() {
        let categories = normalize_categories(&[
            "Sports".to_string(),
            "music".to_string(),
            "sports ".to_string(),
        ])
        .unwrap();
        assert_eq!(categories, vec!["music", "sports"]);
        assert!(normalize_categories(&["two words".to_string()]).is_err());
        assert!(normalize_categories(&[String::new()]).is_err());
    }

    #[test]
    fn test_into_item() {
        let author = Uuid::now_v7();
        let item = ContentDraft::post("/fac", "  Hello ")
            .with_category("News")
            .into_item(author, OrgPath::parse("/fac").unwrap())
            .unwrap();
        assert_eq!(item.title, "Hello");
        assert_eq!(item.author_id, author);
        assert!(item.has_category("news"));
        assert!(!item.has_category("sports"));
        assert_eq!(item.sort_at.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(item.position(), Position::new(item.sort_at, item.id));
    }
}
