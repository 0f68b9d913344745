//! Google Play Pub/Sub push verifier.
//!
//! Developer notifications arrive wrapped in a Pub/Sub push envelope:
//! the notification itself is base64 inside `message.data`, next to the
//! Pub/Sub message id and publish time. Push endpoint authenticity rests
//! on the subscription URL staying secret; the envelope itself carries
//! no signature to check.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;
use crate::domain::notifications::{
    GooglePlayNotification, GooglePlayNotificationType, NotificationError,
};

/// Parses Pub/Sub push envelopes into notification events.
pub struct GooglePlayNotificationVerifier;

impl GooglePlayNotificationVerifier {
    /// Parse one push delivery.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] when the envelope is missing
    /// required fields, the payload is not base64 JSON, or the decoded
    /// payload carries no recognized notification object.
    pub fn parse(body: &JsonValue) -> Result<GooglePlayNotification, NotificationError> {
        let message = body
            .get("message")
            .ok_or(NotificationError::MissingField("message"))?;

        let encoded = message
            .get("data")
            .and_then(JsonValue::as_str)
            .ok_or(NotificationError::MissingField("message.data"))?;
        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| NotificationError::invalid_base64(e.to_string()))?;
        let data: JsonValue = serde_json::from_slice(&decoded)
            .map_err(|e| NotificationError::invalid_json(e.to_string()))?;

        let notification_id = message
            .get("messageId")
            .and_then(JsonValue::as_str)
            .ok_or(NotificationError::MissingField("message.messageId"))?
            .to_string();

        let published_at = message
            .get("publishTime")
            .and_then(JsonValue::as_str)
            .ok_or(NotificationError::MissingField("message.publishTime"))?;
        let published_at = parse_publish_time(published_at)?;

        let (notification_type, subtype) = GooglePlayNotificationType::classify(&data)
            .ok_or(NotificationError::UnrecognizedPayload)?;

        Ok(GooglePlayNotification {
            notification_type,
            subtype,
            notification_id,
            data,
            published_at,
        })
    }
}

/// Pub/Sub publish times look like `2024-03-01T10:15:30.301Z`.
fn parse_publish_time(value: &str) -> Result<Timestamp, NotificationError> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map_err(|_| NotificationError::invalid_publish_time(value))?;
    Ok(Timestamp::from_datetime(naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notifications::GooglePlayNotificationSubtype;
    use serde_json::json;

    fn envelope(notification: &JsonValue) -> JsonValue {
        json!({
            "message": {
                "data": BASE64.encode(notification.to_string()),
                "messageId": "8675309",
                "publishTime": "2024-03-01T10:15:30.301Z"
            },
            "subscription": "projects/example/subscriptions/play-billing"
        })
    }

    #[test]
    fn parses_subscription_notification() {
        let body = envelope(&json!({
            "version": "1.0",
            "packageName": "com.example.app",
            "eventTimeMillis": "1709288130301",
            "subscriptionNotification": {
                "version": "1.0",
                "notificationType": 2,
                "purchaseToken": "token-abc",
                "subscriptionId": "premium_monthly"
            }
        }));

        let event = GooglePlayNotificationVerifier::parse(&body).unwrap();

        assert_eq!(
            event.notification_type,
            GooglePlayNotificationType::Subscription
        );
        assert_eq!(event.subtype, GooglePlayNotificationSubtype::Renewed);
        assert_eq!(event.notification_id, "8675309");
        assert_eq!(event.purchase_token(), Some("token-abc"));
        assert_eq!(event.subscription_product(), Some("premium_monthly"));
    }

    #[test]
    fn parses_test_notification() {
        let body = envelope(&json!({
            "version": "1.0",
            "packageName": "com.example.app",
            "testNotification": { "version": "1.0" }
        }));

        let event = GooglePlayNotificationVerifier::parse(&body).unwrap();
        assert_eq!(event.notification_type, GooglePlayNotificationType::Test);
        assert_eq!(event.subtype, GooglePlayNotificationSubtype::None);
    }

    #[test]
    fn publish_time_is_decoded() {
        let body = envelope(&json!({ "testNotification": {} }));
        let event = GooglePlayNotificationVerifier::parse(&body).unwrap();
        assert_eq!(event.published_at.as_unix_secs(), 1709288130);
    }

    #[test]
    fn missing_message_is_rejected() {
        let err = GooglePlayNotificationVerifier::parse(&json!({})).unwrap_err();
        assert_eq!(err, NotificationError::MissingField("message"));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let body = json!({
            "message": {
                "data": "!!! not base64 !!!",
                "messageId": "1",
                "publishTime": "2024-03-01T10:15:30.301Z"
            }
        });
        let err = GooglePlayNotificationVerifier::parse(&body).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidBase64(_)));
    }

    #[test]
    fn non_json_payload_is_rejected() {
        let body = json!({
            "message": {
                "data": BASE64.encode("plainly not json"),
                "messageId": "1",
                "publishTime": "2024-03-01T10:15:30.301Z"
            }
        });
        let err = GooglePlayNotificationVerifier::parse(&body).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidJson(_)));
    }

    #[test]
    fn unknown_payload_object_is_rejected() {
        let body = envelope(&json!({ "voidedPurchaseNotification": {} }));
        let err = GooglePlayNotificationVerifier::parse(&body).unwrap_err();
        assert_eq!(err, NotificationError::UnrecognizedPayload);
    }

    #[test]
    fn malformed_publish_time_is_rejected() {
        let body = json!({
            "message": {
                "data": BASE64.encode(json!({ "testNotification": {} }).to_string()),
                "messageId": "1",
                "publishTime": "March 1st"
            }
        });
        let err = GooglePlayNotificationVerifier::parse(&body).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidPublishTime(_)));
    }
}
