//! App Store API client.
//!
//! Talks to two Apple hosts with the same ES256 developer-token scheme:
//! the App Store Server API for transaction lookups and the App Store
//! Connect API for subscription group and price data. Tokens are signed
//! fresh per request with a 19-minute expiry (Apple caps them at 20).
//!
//! When Apple answers a production lookup with error 4040010 the
//! transaction lives in the sandbox environment; the request is retried
//! once against the sandbox host when the config allows it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::AppStoreConfig;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::AppStoreClient;

const PRODUCTION_URL: &str = "https://api.storekit.itunes.apple.com";
const SANDBOX_URL: &str = "https://api.storekit-sandbox.itunes.apple.com";
const CONNECT_URL: &str = "https://api.appstoreconnect.apple.com";

/// Apple's "transaction not found in this environment" error code.
const WRONG_ENVIRONMENT_ERROR: i64 = 4040010;

const TOKEN_TTL_SECS: u64 = 19 * 60;

#[derive(Debug, Serialize)]
struct DeveloperTokenClaims<'a> {
    iss: &'a str,
    iat: u64,
    exp: u64,
    aud: &'static str,
    bid: &'a str,
}

/// App Store Server + Connect API adapter.
pub struct AppStoreApiClient {
    config: AppStoreConfig,
    server_base_url: String,
    sandbox_base_url: String,
    connect_base_url: String,
    http_client: reqwest::Client,
}

impl AppStoreApiClient {
    pub fn new(config: AppStoreConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            server_base_url: PRODUCTION_URL.to_string(),
            sandbox_base_url: SANDBOX_URL.to_string(),
            connect_base_url: CONNECT_URL.to_string(),
            http_client,
        }
    }

    /// Point every host at one base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.server_base_url = url.clone();
        self.sandbox_base_url = url.clone();
        self.connect_base_url = url;
        self
    }

    fn server_url(&self) -> &str {
        if self.config.sandbox {
            &self.sandbox_base_url
        } else {
            &self.server_base_url
        }
    }

    /// Short-lived ES256 developer token for the given key pair.
    fn developer_token(&self, key_id: &str, signing_key: &SecretString) -> Result<String, DomainError> {
        let der = BASE64
            .decode(signing_key.expose_secret())
            .map_err(|e| store_error(format!("Signing key is not valid base64: {}", e)))?;
        let key = EncodingKey::from_ec_pem(&der)
            .map_err(|e| store_error(format!("Invalid signing key: {}", e)))?;

        let iat = Timestamp::now().as_unix_secs();
        let claims = DeveloperTokenClaims {
            iss: &self.config.issuer_id,
            iat,
            exp: iat + TOKEN_TTL_SECS,
            aud: "appstoreconnect-v1",
            bid: &self.config.bundle_id,
        };
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(key_id.to_string());
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| store_error(format!("Failed to sign developer token: {}", e)))
    }

    async fn get_json(&self, url: &str, token: &str) -> Result<JsonValue, DomainError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| store_error(format!("App Store request failed: {}", e)))?;

        let text = response
            .text()
            .await
            .map_err(|e| store_error(format!("App Store response unreadable: {}", e)))?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, body = %text, "Cannot parse App Store response");
            store_error(format!("Malformed App Store response: {}", e))
        })
    }

    fn reports_wrong_environment(body: &JsonValue) -> bool {
        body.get("errorCode").and_then(JsonValue::as_i64) == Some(WRONG_ENVIRONMENT_ERROR)
    }
}

#[async_trait]
impl AppStoreClient for AppStoreApiClient {
    async fn get_transaction_info(&self, transaction_id: &str) -> Result<JsonValue, DomainError> {
        let token = self.developer_token(&self.config.key_id, &self.config.signing_key)?;
        let url = format!(
            "{}/inApps/v1/transactions/{}",
            self.server_url(),
            transaction_id
        );
        let body = self.get_json(&url, &token).await?;

        if Self::reports_wrong_environment(&body)
            && self.config.auto_retry_wrong_env_request
            && !self.config.sandbox
        {
            tracing::info!(
                transaction_id,
                "Transaction lives in sandbox, retrying there"
            );
            let url = format!(
                "{}/inApps/v1/transactions/{}",
                self.sandbox_base_url, transaction_id
            );
            return self.get_json(&url, &token).await;
        }

        Ok(body)
    }

    async fn list_group_subscriptions(
        &self,
        subscription_group_id: &str,
    ) -> Result<JsonValue, DomainError> {
        let token =
            self.developer_token(&self.config.connect_key_id, &self.config.connect_signing_key)?;
        let url = format!(
            "{}/v1/subscriptionGroups/{}/subscriptions",
            self.connect_base_url, subscription_group_id
        );
        self.get_json(&url, &token).await
    }

    async fn list_subscription_prices(
        &self,
        apple_product_id: &str,
        country_code: &str,
    ) -> Result<JsonValue, DomainError> {
        let token =
            self.developer_token(&self.config.connect_key_id, &self.config.connect_signing_key)?;
        let url = format!(
            "{}/v1/subscriptions/{}/prices?filter[territory]={}&include=territory,subscriptionPricePoint&fields[territories]=currency",
            self.connect_base_url, apple_product_id, country_code
        );
        self.get_json(&url, &token).await
    }
}

fn store_error(message: String) -> DomainError {
    DomainError::new(ErrorCode::StoreProviderError, message)
}
