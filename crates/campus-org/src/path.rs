//! Org path utilities
//!
//! Org paths are slash-delimited identifiers for organizational units,
//! e.g. `/fac/eng`. The canonical form has a leading `/`, no trailing slash
//! (except the root `/`), no empty or `.` segments, and lowercase segments.
//!
//! Two flavours of input handling exist:
//! - [`normalize`] is lenient and never fails. Query-time paths (the
//!   resource path of an authorization check) go through it.
//! - [`OrgPath::parse`] is strict. Node creation goes through it, so
//!   malformed paths never make it into the tree.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AccessError, AccessResult};

/// The root path.
pub const ROOT: &str = "/";

/// Maximum number of segments below the root.
pub const MAX_DEPTH: usize = 32;

/// Maximum length of a single segment.
pub const MAX_SEGMENT_LEN: usize = 64;

/// Canonicalize a path.
///
/// Surrounding whitespace is trimmed, repeated slashes collapse, `.`
/// segments are dropped and `..` pops the previous segment (never above the
/// root). Empty input yields the root.
///
/// # Examples
///
/// ```
/// use campus_org::path::normalize;
///
/// assert_eq!(normalize("fac//eng/"), "/fac/eng");
/// assert_eq!(normalize(""), "/");
/// assert_eq!(normalize("/fac/../club"), "/club");
/// ```
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.trim().split('/') {
        match segment.trim() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s.to_lowercase()),
        }
    }

    if segments.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Ancestors of a path, ordered root first, excluding the path itself.
///
/// ```
/// use campus_org::path::ancestors_of;
///
/// assert_eq!(ancestors_of("/fac/eng/cpe"), vec!["/", "/fac", "/fac/eng"]);
/// assert!(ancestors_of("/").is_empty());
/// ```
pub fn ancestors_of(path: &str) -> Vec<String> {
    let canonical = normalize(path);
    if canonical == ROOT {
        return Vec::new();
    }

    let mut ancestors = vec![ROOT.to_string()];
    let mut current = String::new();
    let segments: Vec<&str> = canonical[1..].split('/').collect();
    for segment in &segments[..segments.len() - 1] {
        current.push('/');
        current.push_str(segment);
        ancestors.push(current.clone());
    }
    ancestors
}

/// Parent of a path; the root has none.
pub fn parent_of(path: &str) -> Option<String> {
    ancestors_of(path).pop()
}

/// Number of segments below the root.
pub fn depth_of(path: &str) -> usize {
    ancestors_of(path).len()
}

/// True iff `candidate` equals `anchor` or lies beneath it.
///
/// Matching is segment-aware: `/ab` is not beneath `/a`. The root anchor
/// matches every path.
///
/// ```
/// use campus_org::path::is_descendant_or_self;
///
/// assert!(is_descendant_or_self("/a/b", "/a"));
/// assert!(is_descendant_or_self("/a", "/a"));
/// assert!(!is_descendant_or_self("/ab", "/a"));
/// assert!(!is_descendant_or_self("/a", "/a/b"));
/// ```
pub fn is_descendant_or_self(candidate: &str, anchor: &str) -> bool {
    let candidate = normalize(candidate);
    let anchor = normalize(anchor);
    subtree_contains(&anchor, &candidate)
}

/// Segment-aware prefix check on paths that are already canonical.
fn subtree_contains(anchor: &str, candidate: &str) -> bool {
    if anchor == ROOT || candidate == anchor {
        return true;
    }
    candidate
        .strip_prefix(anchor)
        .map_or(false, |rest| rest.starts_with('/'))
}

/// A validated, canonical org path.
///
/// # Examples
///
/// ```
/// use campus_org::OrgPath;
///
/// let path = OrgPath::parse("/club/cpsk").unwrap();
/// assert_eq!(path.as_str(), "/club/cpsk");
/// assert_eq!(path.depth(), 2);
/// assert!(OrgPath::parse("/club/../x").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrgPath(String);

impl OrgPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self(ROOT.to_string())
    }

    /// Strictly parse a path.
    ///
    /// Unlike [`normalize`], this rejects `.`/`..` segments, characters
    /// outside `[a-z0-9_-]`, overlong segments and overly deep paths.
    /// Repeated or trailing slashes are still tolerated.
    pub fn parse(raw: &str) -> AccessResult<Self> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return Err(AccessError::validation(format!(
                "org path must start with '/': {:?}",
                raw
            )));
        }

        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() > MAX_DEPTH {
            return Err(AccessError::validation(format!(
                "org path deeper than {} segments",
                MAX_DEPTH
            )));
        }

        for segment in &segments {
            validate_segment(segment)?;
        }

        if segments.is_empty() {
            Ok(Self::root())
        } else {
            Ok(Self(format!("/{}", segments.join("/"))))
        }
    }

    /// Build a path from a query-time string without validation.
    pub fn normalized(raw: &str) -> Self {
        Self(normalize(raw))
    }

    /// Append a validated child segment.
    pub fn join(&self, segment: &str) -> AccessResult<Self> {
        validate_segment(segment)?;
        if self.is_root() {
            Ok(Self(format!("/{}", segment)))
        } else {
            Ok(Self(format!("{}/{}", self.0, segment)))
        }
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT
    }

    /// The parent path, `None` for the root.
    pub fn parent(&self) -> Option<OrgPath> {
        parent_of(&self.0).map(OrgPath)
    }

    /// Ancestors ordered root first, excluding this path.
    pub fn ancestors(&self) -> Vec<OrgPath> {
        ancestors_of(&self.0).into_iter().map(OrgPath).collect()
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        depth_of(&self.0)
    }

    /// Path segments below the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// True iff this path equals `anchor` or lies beneath it.
    pub fn is_descendant_or_self(&self, anchor: &OrgPath) -> bool {
        subtree_contains(&anchor.0, &self.0)
    }
}

fn validate_segment(segment: &str) -> AccessResult<()> {
    if segment.is_empty() || segment.len() > MAX_SEGMENT_LEN {
        return Err(AccessError::validation(format!(
            "org path segment must be 1..={} characters: {:?}",
            MAX_SEGMENT_LEN, segment
        )));
    }
    let valid = segment
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(AccessError::validation(format!(
            "org path segment may only contain [a-z0-9_-]: {:?}",
            segment
        )));
    }
    Ok(())
}

impl fmt::Display for OrgPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrgPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrgPath {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OrgPath::parse(&value)
    }
}

impl From<OrgPath> for String {
    fn from(path: OrgPath) -> Self {
        path.0
    }
}
