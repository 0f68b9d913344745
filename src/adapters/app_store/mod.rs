//! App Store integration.
//!
//! The notification verifier decodes the signed webhook payload, and
//! the API client talks to the App Store Server API (transaction
//! lookups) and the App Store Connect API (catalog price data).

mod client;
mod verifier;

pub use client::AppStoreApiClient;
pub use verifier::AppStoreNotificationVerifier;
