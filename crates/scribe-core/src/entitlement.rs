//! Entitlement checking

use std::sync::Arc;

use chrono::Utc;
use scribe_db::{SubscriptionRepository, UsageRepository};
use scribe_types::{
    AccessDecision, DecisionReason, Feature, Limit, Remaining, Tier, UsageCounter, UserId,
};
use tracing::{instrument, warn};

use crate::{QuotaError, TierCatalog, TierResolver};

/// What a check answers when usage state cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Deny counted features
    #[default]
    FailClosed,
    /// Allow; only for features where an occasional overrun is harmless
    FailOpen,
}

/// Read-only entitlement checker
pub struct EntitlementChecker<S: SubscriptionRepository, U: UsageRepository> {
    resolver: TierResolver<S>,
    usage: Arc<U>,
    catalog: Arc<TierCatalog>,
}

impl<S: SubscriptionRepository, U: UsageRepository> EntitlementChecker<S, U> {
    /// Create a new entitlement checker
    pub fn new(resolver: TierResolver<S>, usage: Arc<U>, catalog: Arc<TierCatalog>) -> Self {
        Self {
            resolver,
            usage,
            catalog,
        }
    }

    /// Check whether a user may use a feature, failing closed
    pub async fn check_access(&self, user_id: &UserId, feature: Feature) -> AccessDecision {
        self.check_access_with_policy(user_id, feature, FailurePolicy::FailClosed)
            .await
    }

    /// Check whether a user may use a feature.
    ///
    /// Never writes: a pending period rollover is applied to the in-memory
    /// copy only. Storage errors produce a decision with
    /// [`DecisionReason::BackendUnavailable`] shaped by `policy`.
    #[instrument(skip_all, fields(user_id = %user_id, feature = %feature))]
    pub async fn check_access_with_policy(
        &self,
        user_id: &UserId,
        feature: Feature,
        policy: FailurePolicy,
    ) -> AccessDecision {
        match self.evaluate(user_id, feature).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, ?policy, "Entitlement check degraded");
                self.degraded(feature, policy)
            }
        }
    }

    /// Check access and turn a denial into the matching error, for call
    /// sites that gate an action with `?`
    pub async fn require_access(
        &self,
        user_id: &UserId,
        feature: Feature,
    ) -> Result<AccessDecision, QuotaError> {
        let decision = self.check_access(user_id, feature).await;
        match decision.reason {
            _ if decision.allowed => Ok(decision),
            Some(DecisionReason::NotIncluded) => Err(QuotaError::NotIncluded {
                feature,
                tier: decision.tier,
            }),
            Some(DecisionReason::BackendUnavailable) => Err(QuotaError::BackendUnavailable(
                "entitlement state unavailable".to_string(),
            )),
            Some(DecisionReason::LimitExceeded) | None => {
                let limit = feature
                    .counter()
                    .map(|counter| counter.limit(self.catalog.limits_for(decision.tier)))
                    .and_then(|limit| match limit {
                        Limit::Limited(n) => Some(n),
                        Limit::Unlimited => None,
                    })
                    .unwrap_or(0);
                Err(QuotaError::LimitExceeded {
                    feature,
                    tier: decision.tier,
                    limit,
                })
            }
        }
    }

    async fn evaluate(&self, user_id: &UserId, feature: Feature) -> Result<AccessDecision, QuotaError> {
        let tier = self.resolver.effective_tier(user_id).await?;
        let limits = self.catalog.limits_for(tier);
        let used = match feature.counter() {
            Some(counter) => self.current_usage(user_id, counter).await?,
            None => 0,
        };

        Ok(AccessDecision::evaluate(feature, tier, limits, used))
    }

    /// Current counter value with any pending rollover applied
    pub async fn current_usage(
        &self,
        user_id: &UserId,
        counter: UsageCounter,
    ) -> Result<u64, QuotaError> {
        let used = match self.usage.find_by_user_id(user_id.as_str()).await? {
            Some(row) => row.to_stats()?.rolled_over(Utc::now()).used(counter),
            None => 0,
        };
        Ok(used)
    }

    fn degraded(&self, feature: Feature, policy: FailurePolicy) -> AccessDecision {
        let mut decision = match policy {
            FailurePolicy::FailOpen => AccessDecision {
                feature,
                tier: Tier::Free,
                allowed: true,
                remaining: Remaining::Unlimited,
                reason: None,
            },
            FailurePolicy::FailClosed if feature.is_countable() => {
                AccessDecision::unavailable(feature, Tier::Free)
            }
            FailurePolicy::FailClosed => {
                AccessDecision::evaluate(feature, Tier::Free, self.catalog.limits_for(Tier::Free), 0)
            }
        };
        decision.reason = Some(DecisionReason::BackendUnavailable);
        decision
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> Clone for EntitlementChecker<S, U> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            usage: Arc::clone(&self.usage),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> std::fmt::Debug for EntitlementChecker<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementChecker").finish()
    }
}
