//! Postgres pool settings for the billing store.
//!
//! Every webhook handler holds a connection across a transaction while
//! it reconciles ledger and subscription rows, and store notifications
//! arrive in bursts around renewal boundaries. The pool therefore keeps
//! a warm floor of connections and fails acquisition fast instead of
//! queueing a push delivery past the store's retry window.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Connection settings for the billing database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Warm connections kept open through quiet periods
    #[serde(default = "default_connections::<2>")]
    pub min_connections: u32,

    /// Ceiling for concurrent connections
    #[serde(default = "default_connections::<16>")]
    pub max_connections: u32,

    /// How long a handler may wait for a free connection, in seconds
    #[serde(default = "default_secs::<5>")]
    pub acquire_timeout_secs: u64,

    /// Seconds an idle connection survives before being closed
    #[serde(default = "default_secs::<300>")]
    pub idle_timeout_secs: u64,

    /// Seconds before a connection is recycled regardless of use
    #[serde(default = "default_secs::<1800>")]
    pub max_lifetime_secs: u64,

    /// Apply pending migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

// Largest pool a single service instance is allowed to claim.
const POOL_CEILING: u32 = 100;

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Check URL shape and pool bounds before a pool is built from them.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when the URL is missing or not a
    /// postgres URL, or the pool bounds are inverted or oversized.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE_URL"));
        }
        let is_postgres =
            self.url.starts_with("postgres://") || self.url.starts_with("postgresql://");
        if !is_postgres {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > POOL_CEILING {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if self.acquire_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: 2,
            max_connections: 16,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
            run_migrations: false,
        }
    }
}

fn default_connections<const N: u32>() -> u32 {
    N
}

fn default_secs<const N: u64>() -> u64 {
    N
}
