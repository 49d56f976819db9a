//! Quota configuration

use std::collections::HashMap;
use std::time::Duration;

use scribe_types::{Tier, TierLimits};

use crate::TierCatalog;

/// Default allowed clock skew for webhook signatures
pub const DEFAULT_WEBHOOK_TOLERANCE: Duration = Duration::from_secs(300);

/// Usage and entitlement configuration
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Maximum age of a signed webhook
    pub webhook_tolerance: Duration,
    /// Map of Stripe price IDs to tiers
    pub price_tiers: HashMap<String, Tier>,
    /// How long resolved tiers are cached; `None` disables the cache
    pub tier_cache_ttl: Option<Duration>,
    /// Maximum number of cached users
    pub tier_cache_capacity: u64,
    /// Tier limits
    pub catalog: TierCatalog,
}

impl QuotaConfig {
    /// Create a new config with the standard catalog and no tier cache
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            webhook_tolerance: DEFAULT_WEBHOOK_TOLERANCE,
            price_tiers: HashMap::new(),
            tier_cache_ttl: None,
            tier_cache_capacity: 10_000,
            catalog: TierCatalog::standard(),
        }
    }

    /// Map a Stripe price ID to a tier
    pub fn with_price(mut self, tier: Tier, price_id: impl Into<String>) -> Self {
        self.price_tiers.insert(price_id.into(), tier);
        self
    }

    /// Enable the tier cache
    pub fn with_tier_cache(mut self, ttl: Duration) -> Self {
        self.tier_cache_ttl = Some(ttl);
        self
    }

    /// Set webhook timestamp tolerance
    pub fn with_webhook_tolerance(mut self, tolerance: Duration) -> Self {
        self.webhook_tolerance = tolerance;
        self
    }

    /// Override the limits of one tier
    pub fn with_limits(mut self, tier: Tier, limits: TierLimits) -> Self {
        self.catalog = self.catalog.with_limits(tier, limits);
        self
    }

    /// Tier bought by a Stripe price
    pub fn tier_for_price(&self, price_id: &str) -> Option<Tier> {
        self.price_tiers.get(price_id).copied()
    }
}
