//! Quota service

use std::sync::Arc;

use scribe_db::{SubscriptionRepository, UsageRepository};
use scribe_types::{AccessDecision, Feature, Subscription, Tier, TierLimits, UsageStats, UserId};
use serde::Serialize;
use tracing::instrument;

use crate::{
    EntitlementChecker, FailurePolicy, QuotaConfig, QuotaError, QuotaGate, Reservation,
    SubscriptionLifecycle, TierCatalog, TierResolver, UsageRecorder, WebhookOutcome,
    WebhookVerifier,
};

/// Everything a caller needs to gate, count and bill usage.
///
/// Built once from the repositories and shared behind an `Arc`.
pub struct QuotaService<S: SubscriptionRepository, U: UsageRepository> {
    catalog: Arc<TierCatalog>,
    resolver: TierResolver<S>,
    checker: EntitlementChecker<S, U>,
    recorder: UsageRecorder<S, U>,
    verifier: WebhookVerifier,
    lifecycle: SubscriptionLifecycle<S>,
}

impl<S: SubscriptionRepository, U: UsageRepository> QuotaService<S, U> {
    /// Create a new quota service
    pub fn new(subscriptions: Arc<S>, usage: Arc<U>, config: &QuotaConfig) -> Self {
        let catalog = Arc::new(config.catalog.clone());
        let resolver = match config.tier_cache_ttl {
            Some(ttl) => TierResolver::with_cache(
                Arc::clone(&subscriptions),
                ttl,
                config.tier_cache_capacity,
            ),
            None => TierResolver::new(Arc::clone(&subscriptions)),
        };

        Self {
            checker: EntitlementChecker::new(
                resolver.clone(),
                Arc::clone(&usage),
                Arc::clone(&catalog),
            ),
            recorder: UsageRecorder::new(resolver.clone(), usage, Arc::clone(&catalog)),
            verifier: WebhookVerifier::new(&config.webhook_secret, config.webhook_tolerance),
            lifecycle: SubscriptionLifecycle::new(subscriptions, resolver.clone(), config),
            resolver,
            catalog,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub fn checker(&self) -> &EntitlementChecker<S, U> {
        &self.checker
    }

    pub fn recorder(&self) -> &UsageRecorder<S, U> {
        &self.recorder
    }

    /// A gate for running actions under quota
    pub fn gate(&self) -> QuotaGate<S, U> {
        QuotaGate::new(self.recorder.clone())
    }

    /// Check access, failing closed
    pub async fn check_access(&self, user_id: &UserId, feature: Feature) -> AccessDecision {
        self.checker.check_access(user_id, feature).await
    }

    /// Check access with an explicit failure policy
    pub async fn check_access_with_policy(
        &self,
        user_id: &UserId,
        feature: Feature,
        policy: FailurePolicy,
    ) -> AccessDecision {
        self.checker
            .check_access_with_policy(user_id, feature, policy)
            .await
    }

    /// Check access, turning a denial into an error
    pub async fn require_access(
        &self,
        user_id: &UserId,
        feature: Feature,
    ) -> Result<AccessDecision, QuotaError> {
        self.checker.require_access(user_id, feature).await
    }

    /// Count a completed action
    pub async fn record_usage(
        &self,
        user_id: &UserId,
        feature: Feature,
    ) -> Result<UsageStats, QuotaError> {
        self.recorder.record_usage(user_id, feature).await
    }

    /// Take one unit of quota ahead of an action
    pub async fn reserve(&self, user_id: &UserId, feature: Feature) -> Result<Reservation, QuotaError> {
        self.recorder.reserve(user_id, feature).await
    }

    /// Confirm a reservation
    pub async fn commit(&self, reservation: &Reservation) -> Result<UsageStats, QuotaError> {
        self.recorder.commit(reservation).await
    }

    /// Return a reservation
    pub async fn release(&self, reservation: &Reservation) -> Result<UsageStats, QuotaError> {
        self.recorder.release(reservation).await
    }

    /// Count a deleted document
    pub async fn release_document(&self, user_id: &UserId) -> Result<UsageStats, QuotaError> {
        self.recorder.release_document(user_id).await
    }

    /// Subscription, counters and per-feature decisions for one user.
    ///
    /// Persists a pending rollover so the stored period matches what is
    /// reported.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn usage_summary(&self, user_id: &UserId) -> Result<UsageSummary, QuotaError> {
        let subscription = self.resolver.subscription(user_id).await?;
        let usage = self.recorder.roll_over(user_id).await?;
        let tier = subscription.effective_tier();
        let limits = *self.catalog.limits_for(tier);

        let features = Feature::ALL
            .into_iter()
            .map(|feature| {
                let used = feature.counter().map_or(0, |counter| usage.used(counter));
                AccessDecision::evaluate(feature, tier, &limits, used)
            })
            .collect();

        Ok(UsageSummary {
            tier,
            subscription,
            limits,
            usage,
            features,
        })
    }

    /// Verify a signed webhook and apply it
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, QuotaError> {
        let event = self.verifier.verify_and_parse(payload, signature)?;
        self.lifecycle.handle(&event).await
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> std::fmt::Debug for QuotaService<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaService")
            .field("resolver", &self.resolver)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

/// Usage overview for one user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Tier whose limits apply
    pub tier: Tier,
    pub subscription: Subscription,
    pub limits: TierLimits,
    pub usage: UsageStats,
    pub features: Vec<AccessDecision>,
}
