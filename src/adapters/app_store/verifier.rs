//! App Store server notification (V2) verifier.
//!
//! The webhook body is one JWS (`signedPayload`) whose claims nest two
//! more JWS strings, `signedTransactionInfo` and `signedRenewalInfo`.
//! All three are decoded and the nested tokens are replaced in place by
//! their claims, so downstream code only ever sees plain JSON.
//!
//! The x5c certificate chain Apple attaches is NOT validated here; the
//! claims are read straight from the token. Endpoint secrecy is the
//! only authenticity control on this path.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;
use crate::domain::notifications::{
    AppStoreNotification, AppStoreNotificationSubtype, AppStoreNotificationType, NotificationError,
};

/// Parses signed App Store notification payloads.
pub struct AppStoreNotificationVerifier;

impl AppStoreNotificationVerifier {
    /// Parse one webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] when `signedPayload` is missing or
    /// any of the JWS parts cannot be decoded.
    pub fn parse(body: &JsonValue) -> Result<AppStoreNotification, NotificationError> {
        let token = body
            .get("signedPayload")
            .and_then(JsonValue::as_str)
            .ok_or(NotificationError::MissingField("signedPayload"))?;
        let mut payload = decode_jws_claims(token)?;

        let notification_type = payload
            .get("notificationType")
            .and_then(JsonValue::as_str)
            .map(AppStoreNotificationType::from_wire)
            .unwrap_or(AppStoreNotificationType::None);
        let subtype = payload
            .get("subtype")
            .and_then(JsonValue::as_str)
            .map(AppStoreNotificationSubtype::from_wire)
            .unwrap_or(AppStoreNotificationSubtype::None);

        let notification_id = payload
            .get("notificationUUID")
            .and_then(JsonValue::as_str)
            .ok_or(NotificationError::MissingField("notificationUUID"))?
            .to_string();

        let published_at = payload
            .get("signedDate")
            .and_then(JsonValue::as_i64)
            .and_then(Timestamp::from_unix_millis)
            .unwrap_or_else(Timestamp::now);

        // TEST notifications carry no transaction data to decode
        if notification_type != AppStoreNotificationType::Test {
            if let Some(data) = payload.get_mut("data").and_then(JsonValue::as_object_mut) {
                for field in ["signedTransactionInfo", "signedRenewalInfo"] {
                    if let Some(nested) = data.get(field).and_then(JsonValue::as_str) {
                        let claims = decode_jws_claims(nested)?;
                        data.insert(field.to_string(), claims);
                    }
                }
            }
        }

        let data = payload
            .get("data")
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(Default::default()));

        Ok(AppStoreNotification {
            notification_type,
            subtype,
            notification_id,
            data,
            published_at,
        })
    }
}

/// Claims of a JWS token, read without signature verification.
fn decode_jws_claims(token: &str) -> Result<JsonValue, NotificationError> {
    let mut validation = Validation::new(Algorithm::ES256);
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    // The key is never consulted with signature validation off
    let key = DecodingKey::from_secret(&[]);
    let token = jsonwebtoken::decode::<JsonValue>(token, &key, &validation)
        .map_err(|e| NotificationError::invalid_token(e.to_string()))?;
    Ok(token.claims)
}
