//! # Campus Org Hierarchy
//!
//! This crate provides the organizational hierarchy and membership
//! directory of the campus access engine.
//!
//! ## Overview
//!
//! The campus-org crate handles:
//! - **Paths**: Canonical org paths and segment-aware subtree matching
//! - **Nodes**: Org nodes with materialized ancestor chains
//! - **Memberships**: User (org, position) assignments with an
//!   active/inactive lifecycle
//! - **Viewer access**: The reachable org subtree of a user
//! - **Errors**: The error taxonomy shared by every engine component
//! - **Stores**: Injected store interfaces with bounded calls
//!
//! ## Architecture
//!
//! ```text
//! User
//!   └─ Membership (org_path, position_key, active)
//!         └─ OrgNode (path, ancestors, depth)
//!               └─ descendants ──→ ViewerAccess.reachable_node_ids
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use campus_org::{
//!     MemoryMembershipStore, MemoryOrgStore, MembershipDirectory, OrgTree, ViewerAccessBuilder,
//! };
//! use uuid::Uuid;
//!
//! async fn example() -> campus_org::AccessResult<()> {
//!     let orgs = Arc::new(MemoryOrgStore::new());
//!     let memberships = Arc::new(MemoryMembershipStore::new());
//!
//!     let tree = OrgTree::new(orgs.clone());
//!     tree.ensure_root().await?;
//!     tree.create_node("/fac", "Faculties").await?;
//!     tree.create_node("/fac/eng", "Engineering").await?;
//!
//!     let directory = MembershipDirectory::new(memberships.clone(), orgs.clone());
//!     let user_id = Uuid::now_v7();
//!     directory.create(user_id, "/fac/eng", "member").await?;
//!
//!     let access = ViewerAccessBuilder::new(memberships, orgs).build(user_id).await?;
//!     assert_eq!(access.reachable_paths.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Subtree semantics
//!
//! "Subtree" always includes the anchor node. The same
//! [`path::is_descendant_or_self`] check drives policy scoping in
//! `campus-rbac` and audience reachability in `campus-content`.

pub mod directory;
pub mod error;
pub mod membership;
pub mod node;
pub mod path;
pub mod positions;
pub mod store;
pub mod tree;
pub mod viewer;

// Re-export main types for convenience
pub use directory::MembershipDirectory;
pub use error::{AccessError, AccessResult};
pub use membership::{has_superuser, Membership, MembershipSummary};
pub use node::{OrgNode, OrgStatus};
pub use path::OrgPath;
pub use positions::{PositionKey, ROOT_ADMIN};
pub use store::{
    bounded, Faults, MemoryMembershipStore, MemoryOrgStore, MembershipStore, OrgStore,
    DEFAULT_STORE_TIMEOUT,
};
pub use tree::OrgTree;
pub use viewer::{ViewerAccess, ViewerAccessBuilder};
