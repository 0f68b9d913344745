//! Google Play receipt verification strategy.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::domain::foundation::{Currency, Money, Timestamp};
use crate::domain::ledger::{PaymentVendor, PurchaseError};
use crate::ports::GooglePlayClient;
use async_trait::async_trait;

use super::strategy::{
    clean_receipt, json_i64, stage_for_receipt, ConfirmedPricing, PurchaseStrategy,
    ReceiptSubmission, StagedPurchase, StrategyServices, VerifiedReceipt,
};

/// Strategy for receipts issued by Google Play.
///
/// The receipt blob nests the vendor payload under `Payload.json`;
/// `purchaseToken` and `productId` in there are mandatory and checked
/// at construction. Live verification asks the androidpublisher API
/// whether the subscription is still running and prices the
/// transaction from the vendor response; metadata verification prices
/// it from the store client's submission.
pub struct GooglePlayStrategy {
    services: StrategyServices,
    client: Arc<dyn GooglePlayClient>,
    live_verification: bool,
    submission: ReceiptSubmission,
    receipt: JsonValue,
    purchase_token: String,
    product_sku: String,
    verified: Option<VerifiedReceipt>,
    staged: Option<StagedPurchase>,
}

impl GooglePlayStrategy {
    pub fn new(
        services: StrategyServices,
        client: Arc<dyn GooglePlayClient>,
        live_verification: bool,
        submission: ReceiptSubmission,
    ) -> Result<Self, PurchaseError> {
        let receipt = clean_receipt(submission.receipt_blob().unwrap_or("{}"))?;

        let payload = receipt.get("Payload").and_then(|p| p.get("json"));
        let purchase_token = payload
            .and_then(|j| j.get("purchaseToken"))
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        let product_sku = payload
            .and_then(|j| j.get("productId"))
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        if purchase_token.is_empty() || product_sku.is_empty() {
            return Err(PurchaseError::invalid_receipt(
                "Google receipt data has missing fields.",
            ));
        }

        Ok(Self {
            services,
            client,
            live_verification,
            purchase_token: purchase_token.to_string(),
            product_sku: product_sku.to_string(),
            submission,
            receipt,
            verified: None,
            staged: None,
        })
    }

    /// Vendor round-trip: the subscription must not be expired.
    async fn verify_with_vendor(&self) -> Result<VerifiedReceipt, PurchaseError> {
        let response = self
            .client
            .get_subscription_info(&self.product_sku, &self.purchase_token)
            .await?;

        let now_millis = Timestamp::now().as_unix_millis();
        let valid = json_i64(response.get("expiryTimeMillis"))
            .map(|expiry| now_millis < expiry)
            .unwrap_or(false);

        Ok(VerifiedReceipt {
            response: json!({ "raw_response": response }),
            valid,
        })
    }

    /// Metadata path: trust the price the store client reported.
    fn verify_from_metadata(&self) -> Result<VerifiedReceipt, PurchaseError> {
        let metadata = self.submission.metadata().ok_or_else(|| {
            PurchaseError::validation("metadata", "Purchase payload carries no metadata")
        })?;
        let price = match metadata.get("localizedPrice") {
            Some(JsonValue::Number(n)) => n,
            _ => {
                return Err(PurchaseError::validation(
                    "localizedPrice",
                    "Purchase metadata carries no localized price",
                ))
            }
        };
        let currency_code = metadata
            .get("isoCurrencyCode")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::validation(
                    "isoCurrencyCode",
                    "Purchase metadata carries no currency code",
                )
            })?;
        let currency = Currency::new(currency_code)
            .map_err(|e| PurchaseError::validation("isoCurrencyCode", e.to_string()))?;
        let price_micros = Money::from_json_number(price, currency)
            .map_err(|e| PurchaseError::validation("localizedPrice", e.to_string()))?
            .amount_micros();

        Ok(VerifiedReceipt {
            response: json!({
                "raw_response": {
                    "currencyCode": currency_code,
                    "priceAmountMicros": price_micros,
                    "priceCurrencyCode": currency_code,
                }
            }),
            valid: true,
        })
    }
}

#[async_trait]
impl PurchaseStrategy for GooglePlayStrategy {
    fn vendor(&self) -> PaymentVendor {
        PaymentVendor::GooglePlay
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

        let raw = &verified.response["raw_response"];
        let micros = json_i64(raw.get("priceAmountMicros")).ok_or_else(|| {
            PurchaseError::validation("priceAmountMicros", "Verified response carries no price")
        })?;
        let currency_code = raw
            .get("priceCurrencyCode")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PurchaseError::validation(
                    "priceCurrencyCode",
                    "Verified response carries no currency",
                )
            })?;
        let currency = Currency::new(currency_code)
            .map_err(|e| PurchaseError::validation("priceCurrencyCode", e.to_string()))?;
        let charge = Money::from_micros(micros, currency);
        let valid = verified.valid;

        let staged = stage_for_receipt(
            &self.services,
            &self.submission,
            PaymentVendor::GooglePlay,
            &self.receipt,
            ConfirmedPricing { charge },
            None,
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
                vendor = %PaymentVendor::GooglePlay,
                "Commit requested before prepare"
            );
            PurchaseError::internal("Commit requested before prepare")
        })
    }
}
