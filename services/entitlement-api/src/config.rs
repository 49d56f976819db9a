//! Configuration for the Entitlement API service.

use std::time::Duration;

use scribe_core::QuotaConfig;
use scribe_types::Tier;

/// Entitlement API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Maximum database connections
    pub db_max_connections: u32,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
    /// Quota core configuration
    pub quota: QuotaConfig,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Database
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", 10)?;
        let run_migrations = bool_var("RUN_MIGRATIONS", true);

        // Server
        let http_port = parse_var("HTTP_PORT", 8082)?;

        // Stripe configuration
        let stripe_webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?;

        let mut quota = QuotaConfig::new(stripe_webhook_secret);
        for (var, tier) in [
            ("STRIPE_PRICE_PRO", Tier::Pro),
            ("STRIPE_PRICE_PREMIUM", Tier::Premium),
            ("STRIPE_PRICE_ENTERPRISE", Tier::Enterprise),
        ] {
            if let Ok(price_id) = std::env::var(var) {
                if !price_id.is_empty() {
                    quota = quota.with_price(tier, price_id);
                }
            }
        }

        // Tier cache (0 disables)
        let tier_cache_secs: u64 = parse_var("TIER_CACHE_SECS", 0)?;
        if tier_cache_secs > 0 {
            quota = quota.with_tier_cache(Duration::from_secs(tier_cache_secs));
        }

        // Request timeout
        let request_timeout_secs: u64 = parse_var("REQUEST_TIMEOUT_SECS", 30)?;

        // Metrics
        let metrics_enabled = bool_var("METRICS_ENABLED", true);

        Ok(Self {
            http_port,
            database_url,
            db_max_connections,
            run_migrations,
            quota,
            request_timeout: Duration::from_secs(request_timeout_secs),
            metrics_enabled,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
