//! Position keys
//!
//! A position is the role a user holds at an org node (`head`, `member`,
//! `staff`, ...). Positions are data, not code: policies bind actions to
//! position keys, so new positions need no release.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AccessError, AccessResult};

/// Position key of the platform superuser.
///
/// An active membership with this position at the root path `/` is the one
/// and only superuser signal.
pub const ROOT_ADMIN: &str = "root_admin";

/// A validated position key.
///
/// Keys are 1..=64 characters of `[a-z0-9_-]`. Parsing is case-insensitive
/// and stores the lowercase form.
///
/// # Examples
///
/// ```
/// use campus_org::PositionKey;
///
/// let head = PositionKey::parse("Head").unwrap();
/// assert_eq!(head.as_str(), "head");
/// assert!(PositionKey::parse("").is_err());
/// assert!(PositionKey::root_admin().is_root_admin());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PositionKey(String);

impl PositionKey {
    /// Parse a position key.
    pub fn parse(raw: &str) -> AccessResult<Self> {
        let key = raw.trim().to_lowercase();
        if key.is_empty() || key.len() > 64 {
            return Err(AccessError::validation(format!(
                "position key must be 1..=64 characters: {:?}",
                raw
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(AccessError::validation(format!(
                "position key may only contain [a-z0-9_-]: {:?}",
                raw
            )));
        }
        Ok(Self(key))
    }

    /// The superuser position.
    pub fn root_admin() -> Self {
        Self(ROOT_ADMIN.to_string())
    }

    /// Check if this is the superuser position.
    pub fn is_root_admin(&self) -> bool {
        self.0 == ROOT_ADMIN
    }

    /// Get string representation of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PositionKey {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PositionKey::parse(&value)
    }
}

impl From<PositionKey> for String {
    fn from(key: PositionKey) -> Self {
        key.0
    }
}
