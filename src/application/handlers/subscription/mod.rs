//! Subscription handlers - entitlement writes and reads.

pub mod apply_paid_transaction;
pub mod get_subscription;

pub use apply_paid_transaction::{
    ApplyOutcome, ApplyPaidTransactionCommand, ApplyPaidTransactionHandler,
};
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView};
