//! EventPublisher port - Interface for publishing domain events.
//!
//! This port defines how billing publishes events without knowing
//! about the underlying transport mechanism (in-memory, message broker).

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Port for publishing domain events.
///
/// Implementations must ensure:
/// - Events are delivered at-least-once (consumers may receive duplicates)
/// - `publish_all` is atomic where supported by the adapter
/// - Errors are propagated to the caller
///
/// # Example
///
/// ```ignore
/// let envelope = event
///     .to_envelope()
///     .with_correlation_id(metadata.correlation_id());
/// publisher.publish(envelope).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    ///
    /// The event is wrapped in an `EventEnvelope` containing:
    /// - Event ID for deduplication
    /// - Event type for routing
    /// - Aggregate context for correlation
    /// - Metadata for tracing
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Publish multiple events atomically.
    ///
    /// All events are published or none are (where supported by adapter).
    /// For adapters that don't support atomic publishing, events are
    /// published sequentially with best-effort delivery.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError>;
}
