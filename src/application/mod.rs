//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;

pub use handlers::{
    // Purchase handlers
    MakePurchaseCommand, MakePurchaseHandler, MakePurchaseResult,
    // Subscription handlers
    ApplyPaidTransactionHandler, GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView,
    // Store notification handlers
    AppStoreWebhookHandler, GooglePlayWebhookHandler,
};
