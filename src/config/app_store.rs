//! App Store configuration
//!
//! Credentials for the two Apple APIs: the App Store Server API (in-app
//! purchase lookups, signed with the in-app purchase key) and the App
//! Store Connect API (catalog price data, signed with a separate key).
//! Both signing keys are base64-encoded PKCS#8 ES256 keys.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// App Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppStoreConfig {
    /// Issuer id from App Store Connect (shared by both keys)
    pub issuer_id: String,

    /// App bundle id, e.g. `com.example.app`
    pub bundle_id: String,

    /// Key id of the in-app purchase signing key
    pub key_id: String,

    /// Base64-encoded in-app purchase signing key (ES256, PKCS#8)
    pub signing_key: SecretString,

    /// Key id of the Connect API signing key
    pub connect_key_id: String,

    /// Base64-encoded Connect API signing key (ES256, PKCS#8)
    pub connect_signing_key: SecretString,

    /// Talk to the sandbox host instead of production
    #[serde(default)]
    pub sandbox: bool,

    /// Retry against the sandbox host when Apple reports the
    /// transaction lives in the other environment
    #[serde(default = "default_auto_retry")]
    pub auto_retry_wrong_env_request: bool,

    /// HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl AppStoreConfig {
    /// Validate App Store configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.issuer_id.is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE_ISSUER_ID"));
        }
        if self.bundle_id.is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE_BUNDLE_ID"));
        }
        if self.key_id.is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE_KEY_ID"));
        }
        if self.signing_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE_SIGNING_KEY"));
        }
        if self.connect_key_id.is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE_CONNECT_KEY_ID"));
        }
        if self.connect_signing_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired(
                "APP_STORE_CONNECT_SIGNING_KEY",
            ));
        }
        Ok(())
    }
}

impl Default for AppStoreConfig {
    fn default() -> Self {
        Self {
            issuer_id: String::new(),
            bundle_id: String::new(),
            key_id: String::new(),
            signing_key: SecretString::new(String::new()),
            connect_key_id: String::new(),
            connect_signing_key: SecretString::new(String::new()),
            sandbox: false,
            auto_retry_wrong_env_request: default_auto_retry(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_auto_retry() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    15
}
