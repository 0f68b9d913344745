//! HTTP edge settings for the billing API.
//!
//! The listener answers client purchase traffic and the store webhook
//! pushes from Apple and Google, so it binds all interfaces by default
//! and keeps the request timeout inside the stores' delivery retry
//! window.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

use super::error::ValidationError;

/// Listener and middleware settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind, an IP literal
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Tracing filter directive for the subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds, bounded below the webhook retry window
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Comma-separated CORS origins; unset means any origin
    pub cors_origins: Option<String>,
}

/// Deployment environment the service reports itself as.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

// Stores retry webhook deliveries on their own schedule; a request must
// resolve well inside that.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 120;

impl ServerConfig {
    /// Address the listener binds.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when the host is not an IP literal.
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ValidationError::InvalidBindAddress)?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Configured CORS origins, trimmed, empty entries dropped.
    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check bind address and timeout bounds.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when the bind address cannot be formed
    /// or the request timeout is zero or past the webhook retry bound.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.socket_addr()?;
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
            log_level: default_log_level(),
            request_timeout_secs: default_request_timeout(),
            cors_origins: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info,subsync=debug,sqlx=warn".to_string()
}

fn default_request_timeout() -> u64 {
    30
}
