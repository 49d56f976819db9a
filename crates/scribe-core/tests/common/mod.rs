//! Common test utilities for scribe-core integration tests

pub mod mock_repos;

use std::sync::Arc;

use scribe_core::{QuotaConfig, QuotaService};

#[allow(unused_imports)]
pub use mock_repos::{FailingRepository, MockSubscriptionRepository, MockUsageRepository};

/// Service over fresh in-memory repositories
#[allow(dead_code)]
pub fn service() -> (
    QuotaService<MockSubscriptionRepository, MockUsageRepository>,
    MockSubscriptionRepository,
    MockUsageRepository,
) {
    service_with_config(&QuotaConfig::new("whsec_test"))
}

#[allow(dead_code)]
pub fn service_with_config(
    config: &QuotaConfig,
) -> (
    QuotaService<MockSubscriptionRepository, MockUsageRepository>,
    MockSubscriptionRepository,
    MockUsageRepository,
) {
    let subscriptions = MockSubscriptionRepository::new();
    let usage = MockUsageRepository::new();
    let service = QuotaService::new(
        Arc::new(subscriptions.clone()),
        Arc::new(usage.clone()),
        config,
    );
    (service, subscriptions, usage)
}
