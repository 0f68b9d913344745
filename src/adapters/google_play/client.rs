//! Google Play androidpublisher API client.
//!
//! Authenticates with a service-account JWT-bearer grant: an RS256
//! assertion signed with the service-account key is traded at the OAuth
//! token endpoint for a short-lived access token, which is cached until
//! shortly before expiry.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::config::GooglePlayConfig;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::GooglePlayClient;

const AUTH_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";
const API_BASE_URL: &str = "https://androidpublisher.googleapis.com";

/// Refresh the access token this many seconds before it expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    access_token: String,
    expires_at: Timestamp,
}

/// Google Play Developer API adapter.
pub struct GooglePlayApiClient {
    config: GooglePlayConfig,
    api_base_url: String,
    http_client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GooglePlayApiClient {
    pub fn new(config: GooglePlayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            api_base_url: API_BASE_URL.to_string(),
            http_client,
            token: Mutex::new(None),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Access token for the androidpublisher scope, from cache when the
    /// cached one has margin left.
    async fn access_token(&self) -> Result<String, DomainError> {
        let now = Timestamp::now();
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if now.is_before(&token.expires_at) {
                return Ok(token.access_token.clone());
            }
        }

        let assertion = self.grant_assertion(now)?;
        let response = self
            .http_client
            .post(&self.config.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| store_error(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(error = %error_text, "Google token grant failed");
            return Err(store_error(format!("Token grant rejected: {}", error_text)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| store_error(format!("Malformed token response: {}", e)))?;

        let expires_at = now.plus_secs(token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS));
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    /// RS256 assertion for the JWT-bearer grant.
    fn grant_assertion(&self, now: Timestamp) -> Result<String, DomainError> {
        let key = EncodingKey::from_rsa_pem(self.config.private_key_pem().as_bytes())
            .map_err(|e| store_error(format!("Invalid service account key: {}", e)))?;
        let iat = now.as_unix_secs();
        let claims = GrantClaims {
            iss: &self.config.client_email,
            scope: AUTH_SCOPE,
            aud: &self.config.token_uri,
            iat,
            exp: iat + 3600,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| store_error(format!("Failed to sign grant assertion: {}", e)))
    }
}

#[async_trait]
impl GooglePlayClient for GooglePlayApiClient {
    async fn get_subscription_info(
        &self,
        product_name: &str,
        purchase_token: &str,
    ) -> Result<JsonValue, DomainError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/subscriptions/{}/tokens/{}",
            self.api_base_url, self.config.package_name, product_name, purchase_token
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| store_error(format!("Google Play request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                product = product_name,
                error = %error_text,
                "Google Play subscription lookup failed"
            );
            return Err(store_error(format!(
                "Google Play API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| store_error(format!("Malformed Google Play response: {}", e)))
    }
}

fn store_error(message: String) -> DomainError {
    DomainError::new(ErrorCode::StoreProviderError, message)
}
