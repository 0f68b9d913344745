//! In-memory event bus implementation for testing.
//!
//! Provides synchronous, deterministic event capture for unit and
//! integration tests. Billing publishes fire-and-forget announcements
//! (`billing.purchase_recorded.v1`, `subscription.*`); consumers live in other
//! services, so the test bus only needs to record what was published.
//!
//! # Security Note
//!
//! This adapter is for **testing only** and should not be used in production.
//! It uses `.expect()` on lock operations which will panic if locks are poisoned.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

/// In-memory event bus for testing.
///
/// Features:
/// - Synchronous delivery (deterministic for tests)
/// - Event capture for assertions
///
/// # Panics
///
/// Methods may panic if internal locks are poisoned. This is acceptable
/// for test code but this adapter should NOT be used in production.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
///
/// // Publish events
/// bus.publish(envelope).await?;
///
/// // Assert in tests
/// assert_eq!(bus.event_count(), 1);
/// assert!(bus.has_event("billing.purchase_recorded.v1"));
/// ```
pub struct InMemoryEventBus {
    published: RwLock<Vec<EventEnvelope>>,
}

impl InMemoryEventBus {
    /// Creates a new empty event bus.
    pub fn new() -> Self {
        Self {
            published: RwLock::new(Vec::new()),
        }
    }

    // === Test Helpers ===

    /// Returns all published events (for test assertions).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .clone()
    }

    /// Returns events of a specific type.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Returns events for a specific aggregate.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn events_for_aggregate(&self, aggregate_id: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .collect()
    }

    /// Clears all published events (for test isolation).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.published
            .write()
            .expect("InMemoryEventBus: published write lock poisoned")
            .clear();
    }

    /// Returns count of published events.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .len()
    }

    /// Checks if a specific event type was published.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .expect("InMemoryEventBus: published lock poisoned")
            .iter()
            .any(|e| e.event_type == event_type)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.published
            .write()
            .expect("InMemoryEventBus: published write lock poisoned")
            .push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{EventId, EventMetadata, Timestamp};
    use serde_json::json;

    fn test_envelope(event_type: &str, aggregate_id: &str) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            schema_version: EventEnvelope::extract_version(event_type),
            aggregate_id: aggregate_id.to_string(),
            aggregate_type: "Purchase".to_string(),
            occurred_at: Timestamp::now(),
            payload: json!({}),
            metadata: EventMetadata::default(),
        }
    }

    #[tokio::test]
    async fn publish_stores_event() {
        let bus = InMemoryEventBus::new();
        let event = test_envelope("billing.purchase_recorded.v1", "purchase-1");

        bus.publish(event).await.unwrap();

        assert_eq!(bus.event_count(), 1);
        assert!(bus.has_event("billing.purchase_recorded.v1"));
    }

    #[tokio::test]
    async fn events_of_type_filters_correctly() {
        let bus = InMemoryEventBus::new();

        bus.publish(test_envelope("billing.purchase_recorded.v1", "1"))
            .await
            .unwrap();
        bus.publish(test_envelope("subscription.renewed.v1", "2"))
            .await
            .unwrap();
        bus.publish(test_envelope("billing.purchase_recorded.v1", "3"))
            .await
            .unwrap();

        let recorded = bus.events_of_type("billing.purchase_recorded.v1");
        assert_eq!(recorded.len(), 2);
    }

    #[tokio::test]
    async fn events_for_aggregate_filters_correctly() {
        let bus = InMemoryEventBus::new();

        bus.publish(test_envelope("billing.purchase_recorded.v1", "agg-1"))
            .await
            .unwrap();
        bus.publish(test_envelope("subscription.renewed.v1", "agg-2"))
            .await
            .unwrap();
        bus.publish(test_envelope("subscription.canceled.v1", "agg-1"))
            .await
            .unwrap();

        let agg_events = bus.events_for_aggregate("agg-1");
        assert_eq!(agg_events.len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_all_events() {
        let bus = InMemoryEventBus::new();

        bus.publish(test_envelope("billing.purchase_recorded.v1", "1"))
            .await
            .unwrap();
        bus.publish(test_envelope("billing.purchase_recorded.v1", "2"))
            .await
            .unwrap();

        assert_eq!(bus.event_count(), 2);

        bus.clear();

        assert_eq!(bus.event_count(), 0);
    }

    #[tokio::test]
    async fn publish_all_publishes_events() {
        let bus = InMemoryEventBus::new();

        let events = vec![
            test_envelope("billing.purchase_recorded.v1", "1"),
            test_envelope("subscription.renewed.v1", "2"),
            test_envelope("subscription.expired.v1", "3"),
        ];

        bus.publish_all(events).await.unwrap();

        assert_eq!(bus.event_count(), 3);
    }
}
