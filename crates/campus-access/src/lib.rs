//! # Campus Access
//!
//! One entry point for the campus access engine.
//!
//! ## Overview
//!
//! [`AccessEngine`] composes the other campus crates over a single set of
//! stores:
//! - **campus-org**: org tree, memberships, viewer access
//! - **campus-rbac**: position policies and `can` / `abilities_for`
//! - **campus-content**: visibility-filtered, cursor-paginated feeds
//! - **campus-events**: domain events after successful writes
//!
//! Every call is evaluated fresh; nothing about a user's access is cached
//! between requests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use campus_access::{AccessEngine, EngineConfig};
//! use campus_content::FeedFilter;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AccessEngine::in_memory(EngineConfig::from_env())?;
//! let admin = Uuid::now_v7();
//! engine.bootstrap_superuser(admin).await?;
//!
//! let viewer = engine.viewer(None).await?;
//! let page = engine.list_visible(&viewer, None, Some(20), &FeedFilter::default()).await?;
//! println!("{} public items", page.items.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod retry;

pub use config::{ConfigError, EngineConfig};
pub use engine::{AccessEngine, Stores};
pub use retry::{with_retry_if, RetryConfig};
