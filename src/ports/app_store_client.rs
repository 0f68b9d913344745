//! App Store API client port.
//!
//! Covers the two Apple APIs billing talks to: the App Store Server API
//! for transaction lookups and the App Store Connect API for catalog
//! price data. Responses are passed through as JSON; callers navigate
//! the vendor shapes themselves.
//!
//! # Design
//!
//! - **Decoded claims**: implementations decode signed JWS parts before
//!   returning, so callers never see encoded tokens
//! - **Environment retry**: implementations retry against the sandbox
//!   host when Apple reports the transaction lives in the other
//!   environment

use crate::domain::foundation::DomainError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Client port for the App Store Server and Connect APIs.
#[async_trait]
pub trait AppStoreClient: Send + Sync {
    /// Fetch a transaction's decoded claims by vendor transaction id.
    ///
    /// # Errors
    ///
    /// - `StoreProviderError` on transport or decoding failure
    async fn get_transaction_info(&self, transaction_id: &str) -> Result<JsonValue, DomainError>;

    /// List the subscriptions in a subscription group.
    async fn list_group_subscriptions(
        &self,
        subscription_group_id: &str,
    ) -> Result<JsonValue, DomainError>;

    /// List a subscription's price points for a territory.
    ///
    /// `apple_product_id` is Apple's internal id, not the product key.
    async fn list_subscription_prices(
        &self,
        apple_product_id: &str,
        country_code: &str,
    ) -> Result<JsonValue, DomainError>;
}
