//! # Campus Events
//!
//! Domain event bus for the campus access engine.
//!
//! ## Overview
//!
//! Writes in the org directory, the policy store and the content feed
//! announce themselves here once they are committed. Consumers (search
//! indexing, notification fan-out, audit trails) subscribe by topic.
//! Publication is best-effort: a failed publish is logged and the write it
//! follows stays committed.
//!
//! ## Topics
//!
//! Topics are structured as `{source}.{event_type}`:
//! - `org.membership.created`, `org.membership.deactivated`
//! - `org.node.created`, `org.node.status_changed`
//! - `rbac.policy.upserted`, `rbac.policy.toggled`
//! - `content.item.published`
//!
//! Wildcards:
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments
//!
//! ## Usage
//!
//! ```rust,no_run
//! use campus_events::{EventBus, MemoryEventBus, MembershipEvent};
//! use uuid::Uuid;
//!
//! async fn example() {
//!     let bus = MemoryEventBus::new();
//!     let mut sub = bus.subscribe("org.membership.*").await.unwrap();
//!
//!     let event = MembershipEvent::Created {
//!         membership_id: Uuid::now_v7(),
//!         user_id: Uuid::now_v7(),
//!         org_path: "/fac/eng".to_string(),
//!         position_key: "member".to_string(),
//!     };
//!     bus.publish(event.to_event()).await.unwrap();
//!
//!     let received = sub.recv().await.unwrap();
//!     assert_eq!(received.event_type, "membership.created");
//! }
//! ```

pub mod bus;
pub mod types;

// Re-export main types
pub use bus::{
    publish_best_effort, EventBus, EventBusError, EventBusResult, EventBusStats, EventHandler,
    MemoryEventBus, Subscription,
};
pub use types::{ContentEvent, Event, EventSource, MembershipEvent, OrgNodeEvent, PolicyEvent};
