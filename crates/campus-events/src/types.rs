//! Domain event types
//!
//! Events announce completed writes (a membership was granted, a policy
//! changed, content was published) so secondary consumers such as search
//! indexing or notification fan-out can react. They are never part of the
//! write itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Component that emitted an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Org tree and membership directory
    Org,
    /// Policy administration
    Rbac,
    /// Content feed
    Content,
}

impl EventSource {
    /// Get the topic prefix for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Org => "org",
            EventSource::Rbac => "rbac",
            EventSource::Content => "content",
        }
    }
}

/// Event envelope.
///
/// All events are wrapped in this envelope which provides metadata
/// for routing, tracing, and processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Event type (e.g., "membership.created", "item.published")
    pub event_type: String,

    /// Emitting component
    pub source: EventSource,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// User who triggered the event
    pub actor_id: Option<Uuid>,

    /// Org path the event concerns
    pub org_path: Option<String>,

    /// Correlation ID for tracing
    pub correlation_id: Option<String>,

    /// Event version for schema evolution
    pub version: u32,

    /// Event payload
    pub payload: serde_json::Value,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    /// Create a new event.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event type string
    /// * `source` - The emitting component
    /// * `payload` - The event payload
    pub fn new(
        event_type: impl Into<String>,
        source: EventSource,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            source,
            timestamp: Utc::now(),
            actor_id: None,
            org_path: None,
            correlation_id: None,
            version: 1,
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Set the acting user.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set the org path context.
    pub fn with_org_path(mut self, org_path: impl Into<String>) -> Self {
        self.org_path = Some(org_path.into());
        self
    }

    /// Set correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Get the topic for this event.
    ///
    /// Topics are structured as: `{source}.{event_type}`
    pub fn topic(&self) -> String {
        format!("{}.{}", self.source.as_str(), self.event_type)
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Membership directory events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipEvent {
    /// A membership was granted
    Created {
        membership_id: Uuid,
        user_id: Uuid,
        org_path: String,
        position_key: String,
    },
    /// A membership was ended
    Deactivated {
        membership_id: Uuid,
        user_id: Uuid,
        org_path: String,
        position_key: String,
        ended_at: DateTime<Utc>,
    },
}

impl MembershipEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        let (event_type, user_id, org_path) = match self {
            MembershipEvent::Created {
                user_id, org_path, ..
            } => ("membership.created", *user_id, org_path),
            MembershipEvent::Deactivated {
                user_id, org_path, ..
            } => ("membership.deactivated", *user_id, org_path),
        };
        Event::new(
            event_type,
            EventSource::Org,
            serde_json::to_value(self).unwrap_or_default(),
        )
        .with_org_path(org_path.clone())
        .with_metadata("user_id", serde_json::json!(user_id))
    }
}

/// Org tree events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrgNodeEvent {
    /// A node was created
    Created { node_id: Uuid, path: String },
    /// A node's status changed
    StatusChanged {
        node_id: Uuid,
        path: String,
        status: String,
    },
}

impl OrgNodeEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        let (event_type, path) = match self {
            OrgNodeEvent::Created { path, .. } => ("node.created", path),
            OrgNodeEvent::StatusChanged { path, .. } => ("node.status_changed", path),
        };
        Event::new(
            event_type,
            EventSource::Org,
            serde_json::to_value(self).unwrap_or_default(),
        )
        .with_org_path(path.clone())
    }
}

/// Policy administration events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyEvent {
    /// A policy was created or replaced
    Upserted {
        policy_id: Uuid,
        position_key: String,
        org_prefix: String,
        enabled: bool,
    },
    /// A policy was switched on or off
    Toggled { policy_id: Uuid, enabled: bool },
}

impl PolicyEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        match self {
            PolicyEvent::Upserted { org_prefix, .. } => Event::new(
                "policy.upserted",
                EventSource::Rbac,
                serde_json::to_value(self).unwrap_or_default(),
            )
            .with_org_path(org_prefix.clone()),
            PolicyEvent::Toggled { .. } => Event::new(
                "policy.toggled",
                EventSource::Rbac,
                serde_json::to_value(self).unwrap_or_default(),
            ),
        }
    }
}

/// Content feed events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent {
    /// A content item and its visibility rows were committed
    Published {
        content_id: Uuid,
        kind: String,
        author_id: Uuid,
        org_path: String,
        access: String,
        audience: Vec<Uuid>,
        categories: Vec<String>,
    },
}

impl ContentEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        match self {
            ContentEvent::Published {
                author_id, org_path, ..
            } => Event::new(
                "item.published",
                EventSource::Content,
                serde_json::to_value(self).unwrap_or_default(),
            )
            .with_actor(*author_id)
            .with_org_path(org_path.clone()),
        }
    }
}
