//! Application state for the Entitlement API service.

use std::sync::Arc;

use scribe_core::QuotaService;
use scribe_db::pg::{PgSubscriptionRepository, PgUsageRepository};
use scribe_db::{DbPool, SubscriptionRepository, UsageRepository};

use crate::config::Config;

/// Application state shared across all handlers
pub struct AppState<S = PgSubscriptionRepository, U = PgUsageRepository>
where
    S: SubscriptionRepository,
    U: UsageRepository,
{
    /// Entitlement checks, usage recording and webhook processing
    pub quota: Arc<QuotaService<S, U>>,
    /// Database pool for readiness checks; `None` when running without one
    pub pool: Option<DbPool>,
    /// Configuration
    pub config: Arc<Config>,
}

impl<S: SubscriptionRepository, U: UsageRepository> AppState<S, U> {
    /// Create new application state
    pub fn new(quota: QuotaService<S, U>, pool: Option<DbPool>, config: Config) -> Self {
        Self {
            quota: Arc::new(quota),
            pool,
            config: Arc::new(config),
        }
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> Clone for AppState<S, U> {
    fn clone(&self) -> Self {
        Self {
            quota: Arc::clone(&self.quota),
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> std::fmt::Debug for AppState<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
