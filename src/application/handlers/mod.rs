//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod notifications;
pub mod purchase;
pub mod subscription;

pub use notifications::{
    AppStoreWebhookHandler, GooglePlayWebhookHandler, HandleAppStoreNotificationCommand,
    HandleGooglePlayNotificationCommand, WebhookOutcome,
};
pub use purchase::{MakePurchaseCommand, MakePurchaseHandler, MakePurchaseResult};
pub use subscription::{
    ApplyPaidTransactionHandler, GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView,
};
