//! Notification verification errors.
//!
//! Parse failures never reach the vendor: webhook endpoints log them and
//! acknowledge anyway, because the stores retry aggressively and an
//! unparseable payload will not get better on redelivery.

use thiserror::Error;

/// Errors raised while verifying a vendor webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// A field the vendor contract requires was missing or had the
    /// wrong shape.
    #[error("Notification field '{0}' is missing or malformed")]
    MissingField(&'static str),

    /// The Pub/Sub message data was not valid base64.
    #[error("Notification data is not valid base64: {0}")]
    InvalidBase64(String),

    /// The decoded payload was not valid JSON.
    #[error("Notification payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// A signed JWS part could not be decoded.
    #[error("Signed payload could not be decoded: {0}")]
    InvalidToken(String),

    /// The vendor publish time did not match the expected format.
    #[error("Publish time '{0}' could not be parsed")]
    InvalidPublishTime(String),

    /// The payload carried none of the known notification objects.
    #[error("No recognized notification object in payload")]
    UnrecognizedPayload,
}

impl NotificationError {
    pub fn invalid_base64(message: impl Into<String>) -> Self {
        NotificationError::InvalidBase64(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        NotificationError::InvalidJson(message.into())
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        NotificationError::InvalidToken(message.into())
    }

    pub fn invalid_publish_time(value: impl Into<String>) -> Self {
        NotificationError::InvalidPublishTime(value.into())
    }
}
