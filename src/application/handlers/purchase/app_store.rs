//! App Store receipt verification strategy.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::domain::foundation::{Currency, Money, Timestamp};
use crate::domain::ledger::{PaymentVendor, PurchaseError};
use crate::ports::AppStoreClient;
use async_trait::async_trait;

use super::strategy::{
    clean_receipt, json_i64, stage_for_receipt, ConfirmedPricing, PurchaseStrategy,
    ReceiptSubmission, StagedPurchase, StrategyServices, VerifiedReceipt,
};

/// Strategy for receipts issued by the App Store.
///
/// The receipt must carry `TransactionID`, checked at construction.
/// Live verification fetches the transaction's decoded claims from the
/// App Store Server API, requires the expiry to be ahead of now, and
/// prices the transaction from the App Store Connect subscription
/// group for the transaction's storefront. Fresh purchases are stamped
/// with the lineage's original transaction id so later notifications
/// can find them.
pub struct AppStoreStrategy {
    services: StrategyServices,
    client: Arc<dyn AppStoreClient>,
    live_verification: bool,
    submission: ReceiptSubmission,
    receipt: JsonValue,
    verified: Option<VerifiedReceipt>,
    staged: Option<StagedPurchase>,
}

impl AppStoreStrategy {
    pub fn new(
        services: StrategyServices,
        client: Arc<dyn AppStoreClient>,
        live_verification: bool,
        submission: ReceiptSubmission,
    ) -> Result<Self, PurchaseError> {
        let receipt = clean_receipt(submission.receipt_blob().unwrap_or("{}"))?;

        let has_transaction_id = receipt
            .get("TransactionID")
            .and_then(JsonValue::as_str)
            .map(|id| !id.is_empty())
            .unwrap_or(false);
        if !has_transaction_id {
            return Err(PurchaseError::invalid_receipt(
                "Apple receipt data has missing fields.",
            ));
        }

        Ok(Self {
            services,
            client,
            live_verification,
            submission,
            receipt,
            verified: None,
            staged: None,
        })
    }

    /// Vendor round-trip: fetch the transaction claims and the Connect
    /// price for its storefront.
    async fn verify_with_vendor(&self) -> Result<VerifiedReceipt, PurchaseError> {
        let transaction_info = self
            .client
            .get_transaction_info(&self.submission.transaction_id)
            .await?;

        let expires_at = json_i64(transaction_info.get("expiresDate")).unwrap_or(0);
        let valid = Timestamp::now().as_unix_millis() < expires_at;

        let group_id = claim(&transaction_info, "subscriptionGroupIdentifier")?;
        let product_key = claim(&transaction_info, "productId")?;
        let storefront = claim(&transaction_info, "storefront")?;
        let subscription_data = self
            .subscription_details(group_id, product_key, storefront)
            .await?;

        Ok(VerifiedReceipt {
            response: json!({
                "transaction_data": transaction_info,
                "subscription_data": subscription_data,
            }),
            valid,
        })
    }

    /// Resolve the Connect-side price of `product_key` in its
    /// subscription group for one storefront.
    async fn subscription_details(
        &self,
        group_id: &str,
        product_key: &str,
        country_code: &str,
    ) -> Result<JsonValue, PurchaseError> {
        let listing = self.client.list_group_subscriptions(group_id).await?;
        let subscriptions = listing
            .get("data")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        let product_id = subscriptions
            .iter()
            .find(|p| {
                p.get("attributes")
                    .and_then(|a| a.get("productId"))
                    .and_then(JsonValue::as_str)
                    == Some(product_key)
            })
            .and_then(|p| p.get("id"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::internal(format!(
                    "No product can be resolved for product key {} in subscription group {}",
                    product_key, group_id
                ))
            })?;

        let price_info = self
            .client
            .list_subscription_prices(product_id, country_code)
            .await?;
        let included = price_info
            .get("included")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        let currency = included
            .iter()
            .find(|item| item.get("type").and_then(JsonValue::as_str) == Some("territories"))
            .and_then(|t| t.get("attributes"))
            .and_then(|a| a.get("currency"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::internal(format!(
                    "No currency can be resolved for product {} in {}",
                    product_id, country_code
                ))
            })?;
        let price = included
            .iter()
            .find(|item| {
                item.get("type").and_then(JsonValue::as_str) == Some("subscriptionPricePoints")
            })
            .and_then(|p| p.get("attributes"))
            .and_then(|a| a.get("customerPrice"))
            .cloned()
            .ok_or_else(|| {
                PurchaseError::internal(format!(
                    "No price can be resolved for product {} in {}",
                    product_id, country_code
                ))
            })?;

        Ok(json!({
            "product_id": product_id,
            "product_key": product_key,
            "subscription_group_id": group_id,
            "country_code": country_code,
            "currency": currency,
            "price": price,
        }))
    }

    /// Metadata path: trust the price the store client reported.
    fn verify_from_metadata(&self) -> Result<VerifiedReceipt, PurchaseError> {
        let metadata = self.submission.metadata().ok_or_else(|| {
            PurchaseError::validation("metadata", "Purchase payload carries no metadata")
        })?;
        let price = metadata.get("localizedPrice").cloned().ok_or_else(|| {
            PurchaseError::validation(
                "localizedPrice",
                "Purchase metadata carries no localized price",
            )
        })?;
        let currency_code = metadata
            .get("isoCurrencyCode")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::validation(
                    "isoCurrencyCode",
                    "Purchase metadata carries no currency code",
                )
            })?;

        Ok(VerifiedReceipt {
            response: json!({
                "transaction_data": {
                    "originalTransactionId": self.submission.transaction_id,
                },
                "subscription_data": {
                    "country_code": currency_code,
                    "price": price,
                    "currency": currency_code,
                },
            }),
            valid: true,
        })
    }
}

#[async_trait]
impl PurchaseStrategy for AppStoreStrategy {
    fn vendor(&self) -> PaymentVendor {
        PaymentVendor::AppleAppStore
    }

    async fn verify(&mut self) -> Result<bool, PurchaseError> {
        let verified = if self.live_verification {
            self.verify_with_vendor().await?
        } else {
            self.verify_from_metadata()?
        };
        let valid = verified.valid;
        self.verified = Some(verified);
        Ok(valid)
    }

    async fn prepare(&mut self) -> Result<(), PurchaseError> {
        let verified = self
            .verified
            .as_ref()
            .ok_or_else(PurchaseError::verification_not_satisfied)?;

        let original_transaction_id = verified.response["transaction_data"]
            .get("originalTransactionId")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::store_provider(
                    PaymentVendor::AppleAppStore,
                    "Transaction claims carry no originalTransactionId",
                )
            })?
            .to_string();

        let subscription_data = &verified.response["subscription_data"];
        let currency_code = subscription_data
            .get("currency")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::validation("currency", "Verified response carries no currency")
            })?;
        let currency = Currency::new(currency_code)
            .map_err(|e| PurchaseError::validation("currency", e.to_string()))?;
        let charge = match subscription_data.get("price") {
            Some(JsonValue::Number(n)) => Money::from_json_number(n, currency)
                .map_err(|e| PurchaseError::validation("price", e.to_string()))?,
            Some(JsonValue::String(s)) => Money::from_major_str(s, currency)
                .map_err(|e| PurchaseError::validation("price", e.to_string()))?,
            _ => {
                return Err(PurchaseError::validation(
                    "price",
                    "Verified response carries no price",
                ))
            }
        };
        let valid = verified.valid;

        let staged = stage_for_receipt(
            &self.services,
            &self.submission,
            PaymentVendor::AppleAppStore,
            &self.receipt,
            ConfirmedPricing { charge },
            Some(original_transaction_id),
            valid,
        )
        .await?;
        self.staged = Some(staged);
        Ok(())
    }

    fn staged(&self) -> Result<&StagedPurchase, PurchaseError> {
        self.staged.as_ref().ok_or_else(|| {
            tracing::error!(
                user_id = %self.submission.user_id,
                vendor = %PaymentVendor::AppleAppStore,
                "Commit requested before prepare"
            );
            PurchaseError::internal("Commit requested before prepare")
        })
    }
}

/// A required string claim from the decoded transaction payload.
fn claim<'a>(claims: &'a JsonValue, key: &str) -> Result<&'a str, PurchaseError> {
    claims.get(key).and_then(JsonValue::as_str).ok_or_else(|| {
        PurchaseError::store_provider(
            PaymentVendor::AppleAppStore,
            format!("Transaction claims carry no {}", key),
        )
    })
}
