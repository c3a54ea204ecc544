//! # Campus RBAC
//!
//! Position policies and the authorization evaluator of the campus access
//! engine.
//!
//! ## Overview
//!
//! The campus-rbac crate handles:
//! - **Actions**: `resource:verb` keys such as `post:create`
//! - **Policies**: Grants of actions to a position, anchored at an org
//!   prefix with an `exact` or `subtree` scope
//! - **Evaluation**: `can`, `abilities_for` and `authorize` over the
//!   user's active memberships
//! - **Administration**: Validated policy writes with domain events
//!
//! ## Architecture
//!
//! ```text
//! Can(user, action, path)
//!   ├─ superuser (root_admin @ /)          → allow
//!   ├─ active memberships                  → none: deny
//!   ├─ enabled policies of their positions
//!   └─ first (membership, policy) grant    → allow, else deny
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use campus_org::{MemoryMembershipStore, MemoryOrgStore, MembershipDirectory, OrgTree};
//! use campus_rbac::{Authorizer, MemoryPolicyStore, PolicyAdmin, PolicyDraft, PolicyScope};
//! use uuid::Uuid;
//!
//! async fn example() -> campus_org::AccessResult<()> {
//!     let orgs = Arc::new(MemoryOrgStore::new());
//!     let memberships = Arc::new(MemoryMembershipStore::new());
//!     let policies = Arc::new(MemoryPolicyStore::new());
//!
//!     let tree = OrgTree::new(orgs.clone());
//!     tree.ensure_root().await?;
//!     tree.create_node("/club", "Clubs").await?;
//!     tree.create_node("/club/cpsk", "CPSK").await?;
//!
//!     let user = Uuid::now_v7();
//!     MembershipDirectory::new(memberships.clone(), orgs)
//!         .create(user, "/club/cpsk", "head")
//!         .await?;
//!
//!     PolicyAdmin::new(policies.clone())
//!         .upsert(&PolicyDraft::new("head", "/club", PolicyScope::Subtree, &["event:create"]))
//!         .await?;
//!
//!     let authorizer = Authorizer::new(memberships, policies);
//!     assert!(authorizer.can(user, "event:create", "/club/cpsk/sub").await?);
//!     assert!(!authorizer.can(user, "event:create", "/other").await?);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod admin;
pub mod evaluator;
pub mod policy;
pub mod store;

// Re-export main types for convenience
pub use actions::{ActionKey, ActionSet, Resource, Verb};
pub use admin::PolicyAdmin;
pub use evaluator::{Authorizer, Decision, Grants};
pub use policy::{Policy, PolicyDraft, PolicyScope};
pub use store::{MemoryPolicyStore, PolicyStore};
