//! # Actions
//!
//! An action key names an operation as `resource:verb`, e.g. `post:create`
//! or `event:update`. Policies grant sets of action keys. Matching is exact:
//! there are no wildcards and no implied verbs, so `post:manage` does not
//! grant `post:create`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use campus_org::{AccessError, AccessResult};

/// Well-known resources of the campus platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Feed posts
    Post,
    /// Events with a start time
    Event,
    /// Comments on posts and events
    Comment,
    /// Org nodes
    Org,
    /// Memberships
    Membership,
    /// Position policies
    Policy,
}

impl Resource {
    /// Get the string representation of the resource.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Post => "post",
            Resource::Event => "event",
            Resource::Comment => "comment",
            Resource::Org => "org",
            Resource::Membership => "membership",
            Resource::Policy => "policy",
        }
    }
}

/// Well-known verbs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// View a single resource
    Read,
    /// Create a resource
    Create,
    /// Modify a resource
    Update,
    /// Remove a resource
    Delete,
    /// Hide or pin other users' resources
    Moderate,
    /// Administer the resource type
    Manage,
}

impl Verb {
    /// Get the string representation of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Read => "read",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Moderate => "moderate",
            Verb::Manage => "manage",
        }
    }
}

/// A validated `resource:verb` action key.
///
/// Keys are lowercase; each half is 1..=32 characters of `[a-z0-9_-]`.
/// Custom keys outside the well-known resources are accepted so policies
/// can name new actions without a release.
///
/// # Example
///
/// ```
/// use campus_rbac::actions::{ActionKey, Resource, Verb};
///
/// let key = ActionKey::new(Resource::Post, Verb::Create);
/// assert_eq!(key.as_str(), "post:create");
/// assert_eq!(ActionKey::parse("Post:Create").unwrap(), key);
/// assert!(ActionKey::parse("post").is_err());
/// assert!(ActionKey::parse("post:*").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionKey(String);

impl ActionKey {
    /// Build a key from a well-known resource and verb.
    pub fn new(resource: Resource, verb: Verb) -> Self {
        Self(format!("{}:{}", resource.as_str(), verb.as_str()))
    }

    /// Parse a key.
    pub fn parse(raw: &str) -> AccessResult<Self> {
        let key = raw.trim().to_lowercase();
        let (resource, verb) = key.split_once(':').ok_or_else(|| {
            AccessError::validation(format!("action must look like resource:verb: {:?}", raw))
        })?;
        for part in [resource, verb] {
            let valid = !part.is_empty()
                && part.len() <= 32
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
            if !valid {
                return Err(AccessError::validation(format!(
                    "action parts may only contain [a-z0-9_-]: {:?}",
                    raw
                )));
            }
        }
        Ok(Self(key))
    }

    /// Get the string representation of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The resource half of the key.
    pub fn resource(&self) -> &str {
        self.0.split_once(':').map_or("", |(resource, _)| resource)
    }

    /// The verb half of the key.
    pub fn verb(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, verb)| verb)
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ActionKey {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ActionKey::parse(&value)
    }
}

impl From<ActionKey> for String {
    fn from(key: ActionKey) -> Self {
        key.0
    }
}

/// A set of action keys granted by one policy.
///
/// # Example
///
/// ```
/// use campus_rbac::actions::{ActionKey, ActionSet};
///
/// let set = ActionSet::from_strings(&["post:create", "event:create"]).unwrap();
/// assert!(set.has(&ActionKey::parse("post:create").unwrap()));
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    actions: BTreeSet<ActionKey>,
}

impl ActionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every string; the first malformed one fails the whole set.
    pub fn from_strings(actions: &[&str]) -> AccessResult<Self> {
        actions.iter().map(|a| ActionKey::parse(a)).collect()
    }

    /// Add an action.
    pub fn add(&mut self, action: ActionKey) {
        self.actions.insert(action);
    }

    /// Remove an action, returning whether it was present.
    pub fn remove(&mut self, action: &ActionKey) -> bool {
        self.actions.remove(action)
    }

    /// Exact membership test.
    pub fn has(&self, action: &ActionKey) -> bool {
        self.actions.contains(action)
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionKey> {
        self.actions.iter()
    }

    /// Get the count of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<ActionKey> for ActionSet {
    fn from_iter<T: IntoIterator<Item = ActionKey>>(iter: T) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}
