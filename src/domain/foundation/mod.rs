//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, error types, and the event
//! infrastructure that form the vocabulary of the billing domain.

mod command;
mod errors;
mod events;
mod ids;
mod money;
mod timestamp;

pub use command::CommandMetadata;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{
    domain_event, DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent,
};
pub use ids::{BuyableId, ChangeRecordId, PurchaseId, SubscriptionId, TransactionId, UserId};
pub use money::{Currency, Money};
pub use timestamp::Timestamp;
