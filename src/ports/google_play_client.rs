//! Google Play API client port.
//!
//! Wraps the androidpublisher `purchases.subscriptions.get` call that
//! notification handling and live receipt verification rely on. The
//! raw vendor response is passed through as JSON.

use crate::domain::foundation::DomainError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Client port for the Google Play Developer API.
#[async_trait]
pub trait GooglePlayClient: Send + Sync {
    /// Fetch the vendor-side state of a subscription purchase.
    ///
    /// `product_name` is the catalog product key (`subscriptionId` on
    /// the wire); `purchase_token` identifies the purchase.
    ///
    /// # Errors
    ///
    /// - `StoreProviderError` on transport or authentication failure
    async fn get_subscription_info(
        &self,
        product_name: &str,
        purchase_token: &str,
    ) -> Result<JsonValue, DomainError>;
}
