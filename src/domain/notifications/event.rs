//! Normalized vendor notification events.
//!
//! Both stores push very differently shaped webhooks; the verifiers
//! normalize them into one container so the dispatch handlers can match
//! on (type, subtype) and read the decoded payload. Events live in
//! memory for the duration of one webhook call and are never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;

use super::{
    AppStoreNotificationSubtype, AppStoreNotificationType, GooglePlayNotificationSubtype,
    GooglePlayNotificationType,
};

/// A verified vendor notification, generic over the vendor's type and
/// subtype enums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent<T, S> {
    /// Vendor notification classification.
    pub notification_type: T,

    /// Refinement of the type, where the vendor nests one.
    pub subtype: S,

    /// Vendor-assigned unique id, used for log correlation.
    pub notification_id: String,

    /// Decoded notification payload with signed parts already replaced
    /// by their decoded claims.
    pub data: JsonValue,

    /// When the vendor published the notification.
    pub published_at: Timestamp,
}

/// Google Play developer notification delivered over Pub/Sub push.
pub type GooglePlayNotification =
    NotificationEvent<GooglePlayNotificationType, GooglePlayNotificationSubtype>;

/// App Store server notification (V2) delivered as a signed payload.
pub type AppStoreNotification =
    NotificationEvent<AppStoreNotificationType, AppStoreNotificationSubtype>;

impl GooglePlayNotification {
    /// The purchase token identifying the vendor-side subscription.
    pub fn purchase_token(&self) -> Option<&str> {
        self.data
            .get("subscriptionNotification")
            .and_then(|n| n.get("purchaseToken"))
            .and_then(JsonValue::as_str)
    }

    /// The product key (`subscriptionId` on the wire).
    pub fn subscription_product(&self) -> Option<&str> {
        self.data
            .get("subscriptionNotification")
            .and_then(|n| n.get("subscriptionId"))
            .and_then(JsonValue::as_str)
    }
}

impl AppStoreNotification {
    /// Decoded transaction claims (`signedTransactionInfo` after JWS decode).
    pub fn transaction_info(&self) -> Option<&JsonValue> {
        self.data.get("signedTransactionInfo")
    }

    /// The vendor transaction id of the notified transaction.
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_info()
            .and_then(|t| t.get("transactionId"))
            .and_then(JsonValue::as_str)
    }

    /// The id of the first transaction in the subscription lineage.
    pub fn original_transaction_id(&self) -> Option<&str> {
        self.transaction_info()
            .and_then(|t| t.get("originalTransactionId"))
            .and_then(JsonValue::as_str)
    }

    /// The product key the notification concerns.
    pub fn product_id(&self) -> Option<&str> {
        self.transaction_info()
            .and_then(|t| t.get("productId"))
            .and_then(JsonValue::as_str)
    }

    /// Vendor-signed expiration of the notified transaction.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.transaction_info()
            .and_then(|t| t.get("expiresDate"))
            .and_then(JsonValue::as_i64)
            .and_then(Timestamp::from_unix_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn google_accessors_read_nested_fields() {
        let event = GooglePlayNotification {
            notification_type: GooglePlayNotificationType::Subscription,
            subtype: GooglePlayNotificationSubtype::Renewed,
            notification_id: "msg-1".to_string(),
            data: json!({
                "subscriptionNotification": {
                    "notificationType": 2,
                    "purchaseToken": "token-xyz",
                    "subscriptionId": "premium_monthly"
                }
            }),
            published_at: Timestamp::now(),
        };

        assert_eq!(event.purchase_token(), Some("token-xyz"));
        assert_eq!(event.subscription_product(), Some("premium_monthly"));
    }

    #[test]
    fn google_accessors_absorb_missing_fields() {
        let event = GooglePlayNotification {
            notification_type: GooglePlayNotificationType::Test,
            subtype: GooglePlayNotificationSubtype::None,
            notification_id: "msg-2".to_string(),
            data: json!({ "testNotification": { "version": "1.0" } }),
            published_at: Timestamp::now(),
        };

        assert_eq!(event.purchase_token(), None);
        assert_eq!(event.subscription_product(), None);
    }

    #[test]
    fn apple_accessors_read_decoded_transaction() {
        let expires = Timestamp::now().add_days(30);
        let event = AppStoreNotification {
            notification_type: AppStoreNotificationType::DidRenew,
            subtype: AppStoreNotificationSubtype::None,
            notification_id: "uuid-1".to_string(),
            data: json!({
                "signedTransactionInfo": {
                    "transactionId": "200001",
                    "originalTransactionId": "100001",
                    "productId": "premium_annual",
                    "expiresDate": expires.as_unix_millis()
                }
            }),
            published_at: Timestamp::now(),
        };

        assert_eq!(event.transaction_id(), Some("200001"));
        assert_eq!(event.original_transaction_id(), Some("100001"));
        assert_eq!(event.product_id(), Some("premium_annual"));
        assert_eq!(
            event.expires_at().map(|t| t.as_unix_millis()),
            Some(expires.as_unix_millis())
        );
    }

    #[test]
    fn apple_accessors_absorb_missing_transaction() {
        let event = AppStoreNotification {
            notification_type: AppStoreNotificationType::Test,
            subtype: AppStoreNotificationSubtype::None,
            notification_id: "uuid-2".to_string(),
            data: json!({}),
            published_at: Timestamp::now(),
        };

        assert_eq!(event.transaction_id(), None);
        assert_eq!(event.expires_at(), None);
    }
}
