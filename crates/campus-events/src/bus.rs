//! Event bus implementation
//!
//! This module provides the event bus abstraction, the in-memory
//! implementation, and [`publish_best_effort`], which write paths use so a
//! failed publication never undoes the write that preceded it.

use crate::types::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Event bus error types.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Failed to publish event
    #[error("Failed to publish event: {0}")]
    PublishError(String),

    /// Failed to subscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Unknown subscription
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Subscription handle for receiving events.
pub struct Subscription {
    /// Subscription ID
    pub id: String,
    /// Topic pattern
    pub topic: String,
    /// Event receiver
    pub receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event.
    pub async fn recv(&mut self) -> EventBusResult<Event> {
        self.receiver
            .recv()
            .await
            .map_err(|_| EventBusError::ChannelClosed)
    }
}

/// Event handler trait for processing events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: Event) -> EventBusResult<()>;

    /// Get the topics this handler is interested in.
    fn topics(&self) -> Vec<String>;
}

/// Event bus trait for publish/subscribe operations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> EventBusResult<()>;

    /// Subscribe to a topic pattern.
    ///
    /// Topic patterns support wildcards:
    /// - `*` matches any single segment
    /// - `#` matches zero or more segments
    ///
    /// Examples:
    /// - `org.membership.*` matches `org.membership.created`
    /// - `#.published` matches `content.item.published`
    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription>;

    /// Register an event handler.
    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()>;

    /// Unsubscribe from a topic.
    async fn unsubscribe(&self, subscription_id: &str) -> EventBusResult<()>;

    /// Get event bus stats.
    async fn stats(&self) -> EventBusStats;
}

/// Publish an event whose delivery is not part of the caller's write.
///
/// Failures are logged and swallowed.
pub async fn publish_best_effort(bus: Option<&Arc<dyn EventBus>>, event: Event) {
    let Some(bus) = bus else {
        return;
    };
    let topic = event.topic();
    let event_id = event.id;
    if let Err(e) = bus.publish(event).await {
        tracing::warn!(
            topic = %topic,
            event_id = %event_id,
            error = %e,
            "Failed to publish event, primary write kept"
        );
    }
}

/// Event bus statistics.
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    /// Total events published
    pub events_published: u64,
    /// Total events delivered to subscribers
    pub events_delivered: u64,
    /// Active subscriptions
    pub active_subscriptions: usize,
    /// Registered handlers
    pub registered_handlers: usize,
}

/// In-memory event bus implementation.
///
/// Suitable for single-process deployments and tests.
pub struct MemoryEventBus {
    /// Topic pattern senders
    senders: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
    /// Subscription ID to topic pattern
    subscriptions: Arc<RwLock<HashMap<String, String>>>,
    /// Registered handlers
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    /// Statistics
    stats: Arc<RwLock<EventBusStats>>,
    /// Default channel capacity
    channel_capacity: usize,
}

impl std::fmt::Debug for MemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventBus")
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl MemoryEventBus {
    /// Create a new in-memory event bus.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            channel_capacity: capacity.max(1),
        }
    }

    /// Drop channels whose receivers are all gone, with their subscription IDs.
    async fn prune(&self, patterns: &[String]) {
        let mut senders = self.senders.write().await;
        let mut subscriptions = self.subscriptions.write().await;
        for pattern in patterns {
            // A subscribe may have raced in since the read.
            if senders
                .get(pattern)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                senders.remove(pattern);
                tracing::debug!(pattern = %pattern, "Pruned idle topic channel");
            }
        }
        subscriptions.retain(|_, pattern| senders.contains_key(pattern));
    }

    /// Check if a topic matches a pattern.
    pub fn topic_matches(pattern: &str, topic: &str) -> bool {
        let pattern_parts: Vec<&str> = pattern.split('.').collect();
        let topic_parts: Vec<&str> = topic.split('.').collect();
        Self::parts_match(&pattern_parts, &topic_parts)
    }

    fn parts_match(pattern: &[&str], topic: &[&str]) -> bool {
        match pattern.split_first() {
            None => topic.is_empty(),
            Some((&"#", rest)) => {
                (0..=topic.len()).any(|skip| Self::parts_match(rest, &topic[skip..]))
            }
            Some((&"*", rest)) => !topic.is_empty() && Self::parts_match(rest, &topic[1..]),
            Some((segment, rest)) => {
                topic.first() == Some(segment) && Self::parts_match(rest, &topic[1..])
            }
        }
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: Event) -> EventBusResult<()> {
        let topic = event.topic();
        let mut delivered = 0u64;
        let mut idle = Vec::new();

        {
            let senders = self.senders.read().await;
            for (pattern, sender) in senders.iter() {
                if sender.receiver_count() == 0 {
                    idle.push(pattern.clone());
                    continue;
                }
                if Self::topic_matches(pattern, &topic) {
                    // No live receivers is not an error for a broadcast.
                    if let Ok(count) = sender.send(event.clone()) {
                        delivered += count as u64;
                    }
                }
            }
        }

        if !idle.is_empty() {
            self.prune(&idle).await;
        }

        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if handler
                .topics()
                .iter()
                .any(|handler_topic| Self::topic_matches(handler_topic, &topic))
            {
                let handler = handler.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(event).await {
                        tracing::error!(error = %e, "Event handler failed");
                    }
                });
            }
        }

        let mut stats = self.stats.write().await;
        stats.events_published += 1;
        stats.events_delivered += delivered;

        tracing::debug!(topic = %topic, event_id = %event.id, delivered, "Published event");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription> {
        if topic.is_empty() {
            return Err(EventBusError::SubscribeError(
                "topic pattern must not be empty".to_string(),
            ));
        }
        let id = uuid::Uuid::now_v7().to_string();

        let receiver = {
            let mut senders = self.senders.write().await;
            senders
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
                .subscribe()
        };

        self.subscriptions
            .write()
            .await
            .insert(id.clone(), topic.to_string());

        Ok(Subscription {
            id,
            topic: topic.to_string(),
            receiver,
        })
    }

    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()> {
        self.handlers.write().await.push(handler);
        self.stats.write().await.registered_handlers += 1;
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> EventBusResult<()> {
        let mut senders = self.senders.write().await;
        let mut subscriptions = self.subscriptions.write().await;

        let Some(pattern) = subscriptions.remove(subscription_id) else {
            return Err(EventBusError::UnknownSubscription(
                subscription_id.to_string(),
            ));
        };

        // Last subscription on the pattern closes its channel.
        if !subscriptions.values().any(|p| *p == pattern) {
            senders.remove(&pattern);
        }
        Ok(())
    }

    async fn stats(&self) -> EventBusStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_subscriptions = self
            .senders
            .read()
            .await
            .values()
            .map(|sender| sender.receiver_count())
            .sum();
        stats
    }
}
