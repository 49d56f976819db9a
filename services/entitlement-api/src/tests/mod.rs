//! Router-level tests for the Entitlement API

mod handlers_test;
mod mock_repos;

use std::sync::Arc;
use std::time::Duration;

use scribe_core::{QuotaConfig, QuotaService};

use crate::config::Config;
use crate::state::AppState;
use mock_repos::{MockSubscriptionRepository, MockUsageRepository};

pub const WEBHOOK_SECRET: &str = "whsec_router_tests";

pub type TestState = AppState<MockSubscriptionRepository, MockUsageRepository>;

/// State backed by in-memory repositories and no database pool
pub fn test_state() -> (TestState, MockSubscriptionRepository, MockUsageRepository) {
    let subs = MockSubscriptionRepository::default();
    let usage = MockUsageRepository::default();

    let quota_config = QuotaConfig::new(WEBHOOK_SECRET).with_price(scribe_types::Tier::Pro, "price_pro");
    let config = Config {
        http_port: 0,
        database_url: String::new(),
        db_max_connections: 1,
        run_migrations: false,
        quota: quota_config.clone(),
        request_timeout: Duration::from_secs(5),
        metrics_enabled: false,
    };

    let quota = QuotaService::new(Arc::new(subs.clone()), Arc::new(usage.clone()), &quota_config);
    (AppState::new(quota, None, config), subs, usage)
}
