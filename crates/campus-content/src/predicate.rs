//! Typed content predicates
//!
//! Listing queries are described by a [`Predicate`] tree instead of ad hoc
//! filter maps. A store translates the tree into its own query language
//! (or, for the in-memory store, evaluates it row by row during the scan);
//! [`Predicate::matches`] is the reference semantics every translation must
//! agree with.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use campus_org::{OrgPath, ViewerAccess};

use crate::content::{ContentItem, ContentKind};
use crate::cursor::Position;
use crate::visibility::ContentVisibility;

/// A boolean condition over content items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Predicate {
    /// Every item
    True,
    /// Public items
    Public,
    /// Private items whose audience shares a node with the given set;
    /// the IDs are kept sorted, see [`Predicate::audience_any`]
    AudienceAny(#[serde(deserialize_with = "sorted_ids")] Vec<Uuid>),
    /// Items by this author
    AuthoredBy(Uuid),
    /// Items of this kind
    KindIs(ContentKind),
    /// Items published at or below this org path
    OrgWithin(OrgPath),
    /// Items tagged with this category
    HasCategory(String),
    /// Items strictly before this position in `(sort_at, id)` order
    Before(Position),
    /// All clauses hold; empty is true
    And(Vec<Predicate>),
    /// Any clause holds; empty is false
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate against one item.
    pub fn matches(&self, item: &ContentItem) -> bool {
        match self {
            Predicate::True => true,
            Predicate::Public => item.visibility.is_public(),
            Predicate::AudienceAny(nodes) => match &item.visibility {
                ContentVisibility::Public => false,
                ContentVisibility::Private { audience } => {
                    audience.iter().any(|node| nodes.binary_search(node).is_ok())
                }
            },
            Predicate::AuthoredBy(author) => item.author_id == *author,
            Predicate::KindIs(kind) => item.kind == *kind,
            Predicate::OrgWithin(anchor) => item.org_path.is_descendant_or_self(anchor),
            Predicate::HasCategory(category) => item.has_category(category),
            Predicate::Before(position) => item.position() < *position,
            Predicate::And(clauses) => clauses.iter().all(|c| c.matches(item)),
            Predicate::Or(clauses) => clauses.iter().any(|c| c.matches(item)),
        }
    }

    /// Items in the audience of any of `nodes`; the IDs are sorted so
    /// matching can binary search.
    pub fn audience_any(nodes: impl IntoIterator<Item = Uuid>) -> Self {
        let mut nodes: Vec<Uuid> = nodes.into_iter().collect();
        nodes.sort();
        nodes.dedup();
        Predicate::AudienceAny(nodes)
    }

    /// Conjunction, flattening nested `And` and dropping `True`.
    pub fn and(self, other: Predicate) -> Predicate {
        let mut clauses = Vec::new();
        for p in [self, other] {
            match p {
                Predicate::True => {}
                Predicate::And(inner) => clauses.extend(inner),
                p => clauses.push(p),
            }
        }
        match clauses.len() {
            0 => Predicate::True,
            1 => clauses.remove(0),
            _ => Predicate::And(clauses),
        }
    }

    /// Upper bound a store can seek to before scanning backwards.
    ///
    /// Only a `Before` at the top level, or directly inside a top-level
    /// `And`, bounds every match.
    pub fn upper_bound(&self) -> Option<Position> {
        match self {
            Predicate::Before(position) => Some(*position),
            Predicate::And(clauses) => clauses
                .iter()
                .filter_map(|c| match c {
                    Predicate::Before(position) => Some(*position),
                    _ => None,
                })
                .min(),
            _ => None,
        }
    }
}

fn sorted_ids<'de, D>(deserializer: D) -> Result<Vec<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut ids = Vec::<Uuid>::deserialize(deserializer)?;
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Builds the visibility predicate of a viewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityFilter;

impl VisibilityFilter {
    /// Predicate admitting exactly the items `viewer` may see.
    ///
    /// ```
    /// use campus_content::{Predicate, VisibilityFilter};
    /// use campus_org::ViewerAccess;
    ///
    /// assert_eq!(VisibilityFilter::for_viewer(&ViewerAccess::anonymous()), Predicate::Public);
    /// ```
    pub fn for_viewer(viewer: &ViewerAccess) -> Predicate {
        if viewer.superuser {
            return Predicate::True;
        }
        let Some(user_id) = viewer.user_id else {
            return Predicate::Public;
        };

        let mut clauses = vec![Predicate::Public];
        if !viewer.reachable_node_ids.is_empty() {
            clauses.push(Predicate::audience_any(viewer.reachable_node_ids.iter().copied()));
        }
        clauses.push(Predicate::AuthoredBy(user_id));
        Predicate::Or(clauses)
    }
}

/// Optional listing filters on top of visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFilter {
    #[serde(default)]
    pub kind: Option<ContentKind>,
    #[serde(default)]
    pub author_id: Option<Uuid>,
    /// Org subtree; normalized, so malformed input cannot widen the scope
    #[serde(default)]
    pub org_subtree: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl FeedFilter {
    pub fn kind(mut self, kind: ContentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn author(mut self, author_id: Uuid) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn org_subtree(mut self, path: impl Into<String>) -> Self {
        self.org_subtree = Some(path.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Conjunction of the set filters; `True` when none is set.
    pub fn to_predicate(&self) -> Predicate {
        let mut predicate = Predicate::True;
        if let Some(kind) = self.kind {
            predicate = predicate.and(Predicate::KindIs(kind));
        }
        if let Some(author_id) = self.author_id {
            predicate = predicate.and(Predicate::AuthoredBy(author_id));
        }
        if let Some(path) = &self.org_subtree {
            predicate = predicate.and(Predicate::OrgWithin(OrgPath::normalized(path)));
        }
        if let Some(category) = &self.category {
            predicate = predicate.and(Predicate::HasCategory(category.trim().to_lowercase()));
        }
        predicate
    }
}
