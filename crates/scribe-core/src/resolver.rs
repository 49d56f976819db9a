//! Subscription lookup with optional caching

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use scribe_db::SubscriptionRepository;
use scribe_types::{Subscription, Tier, UserId};

use crate::QuotaError;

/// Resolves the subscription, and so the effective tier, of a user
pub struct TierResolver<S: SubscriptionRepository> {
    repo: Arc<S>,
    /// Cache of user_id -> subscription
    cache: Option<Cache<String, Subscription>>,
}

impl<S: SubscriptionRepository> TierResolver<S> {
    /// Create a resolver that always reads the repository
    pub fn new(repo: Arc<S>) -> Self {
        Self { repo, cache: None }
    }

    /// Create a resolver that caches subscriptions for `ttl`
    pub fn with_cache(repo: Arc<S>, ttl: Duration, capacity: u64) -> Self {
        Self {
            repo,
            cache: Some(
                Cache::builder()
                    .time_to_live(ttl)
                    .max_capacity(capacity)
                    .build(),
            ),
        }
    }

    /// Get a user's subscription; users without one are FREE/ACTIVE
    pub async fn subscription(&self, user_id: &UserId) -> Result<Subscription, QuotaError> {
        if let Some(cache) = &self.cache {
            if let Some(sub) = cache.get(user_id.as_str()).await {
                return Ok(sub);
            }
        }

        let sub = match self.repo.find_by_user_id(user_id.as_str()).await? {
            Some(row) => {
                if row.tier().is_none() {
                    tracing::warn!(user_id = %user_id, tier = %row.tier, "Unknown stored tier, using FREE");
                }
                row.to_subscription()?
            }
            None => Subscription::free(user_id.clone(), Utc::now()),
        };

        if let Some(cache) = &self.cache {
            cache.insert(user_id.to_string(), sub.clone()).await;
        }

        Ok(sub)
    }

    /// Tier whose limits apply to the user right now
    pub async fn effective_tier(&self, user_id: &UserId) -> Result<Tier, QuotaError> {
        Ok(self.subscription(user_id).await?.effective_tier())
    }

    /// Drop a cached subscription
    pub async fn invalidate(&self, user_id: &UserId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(user_id.as_str()).await;
        }
    }
}

impl<S: SubscriptionRepository> Clone for TierResolver<S> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            cache: self.cache.clone(),
        }
    }
}

impl<S: SubscriptionRepository> std::fmt::Debug for TierResolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierResolver")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
