//! Usage recording and quota reservations

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scribe_db::{SubscriptionRepository, UsageRepository};
use scribe_types::{Feature, Limit, Tier, UsageChange, UsageCounter, UsageStats, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{QuotaError, TierCatalog, TierResolver};

/// One unit of quota taken by [`UsageRecorder::reserve`].
///
/// The period counter already includes the unit. Finish with
/// [`UsageRecorder::commit`] once the action succeeded or
/// [`UsageRecorder::release`] if it failed. Each reservation settles once;
/// the store tracks it by `id` until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: UserId,
    pub feature: Feature,
    /// Tier the reservation was checked against
    pub tier: Tier,
    /// Period the unit was taken from
    pub period_start: DateTime<Utc>,
    /// Period counter after the reservation
    pub used: u64,
    pub limit: Limit,
}

/// Writes usage counters
pub struct UsageRecorder<S: SubscriptionRepository, U: UsageRepository> {
    resolver: TierResolver<S>,
    usage: Arc<U>,
    catalog: Arc<TierCatalog>,
}

impl<S: SubscriptionRepository, U: UsageRepository> UsageRecorder<S, U> {
    /// Create a new usage recorder
    pub fn new(resolver: TierResolver<S>, usage: Arc<U>, catalog: Arc<TierCatalog>) -> Self {
        Self {
            resolver,
            usage,
            catalog,
        }
    }

    /// Count one completed use of a feature: the period counter and the
    /// lifetime total each go up by one.
    #[instrument(skip_all, fields(user_id = %user_id, feature = %feature))]
    pub async fn record_usage(
        &self,
        user_id: &UserId,
        feature: Feature,
    ) -> Result<UsageStats, QuotaError> {
        let counter = metered(feature)?;
        let stats = self.apply(user_id, UsageChange::Record(counter)).await?.0;

        debug!(used = stats.used(counter), total = stats.total(counter), "Usage recorded");
        Ok(stats)
    }

    /// Check the limit and take one unit of quota in a single atomic step
    #[instrument(skip_all, fields(user_id = %user_id, feature = %feature))]
    pub async fn reserve(&self, user_id: &UserId, feature: Feature) -> Result<Reservation, QuotaError> {
        let counter = metered(feature)?;
        let tier = self.resolver.effective_tier(user_id).await?;
        let limit = counter.limit(self.catalog.limits_for(tier));

        let id = Uuid::new_v4();
        let (stats, applied) = self
            .apply(user_id, UsageChange::Reserve { counter, limit, id })
            .await?;

        if !applied {
            info!(%tier, used = stats.used(counter), "Quota exhausted");
            return Err(QuotaError::LimitExceeded {
                feature,
                tier,
                limit: match limit {
                    Limit::Limited(n) => n,
                    Limit::Unlimited => u64::MAX,
                },
            });
        }

        Ok(Reservation {
            id,
            user_id: user_id.clone(),
            feature,
            tier,
            period_start: stats.period_start,
            used: stats.used(counter),
            limit,
        })
    }

    /// Confirm a reservation after the action succeeded
    #[instrument(skip_all, fields(user_id = %reservation.user_id, feature = %reservation.feature, reservation = %reservation.id))]
    pub async fn commit(&self, reservation: &Reservation) -> Result<UsageStats, QuotaError> {
        let counter = metered(reservation.feature)?;
        let change = UsageChange::Commit {
            counter,
            id: reservation.id,
        };
        self.settle(reservation, change).await
    }

    /// Give a reservation back after the action failed.
    ///
    /// A reservation taken in a period that has since rolled over is settled
    /// without returning its unit: the new period already started from zero.
    #[instrument(skip_all, fields(user_id = %reservation.user_id, feature = %reservation.feature, reservation = %reservation.id))]
    pub async fn release(&self, reservation: &Reservation) -> Result<UsageStats, QuotaError> {
        let counter = metered(reservation.feature)?;
        let change = UsageChange::Release {
            counter,
            id: reservation.id,
        };
        let stats = self.settle(reservation, change).await?;
        if counter.is_periodic() && stats.period_start != reservation.period_start {
            debug!("Reservation period already ended, unit not returned");
        }
        Ok(stats)
    }

    /// Decrease the owned-documents counter after a document was deleted
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn release_document(&self, user_id: &UserId) -> Result<UsageStats, QuotaError> {
        let change = UsageChange::Decrement(UsageCounter::Documents);
        Ok(self.apply(user_id, change).await?.0)
    }

    /// Persist a pending period rollover
    pub async fn roll_over(&self, user_id: &UserId) -> Result<UsageStats, QuotaError> {
        Ok(self.apply(user_id, UsageChange::Refresh).await?.0)
    }

    async fn settle(
        &self,
        reservation: &Reservation,
        change: UsageChange,
    ) -> Result<UsageStats, QuotaError> {
        let (stats, applied) = self.apply(&reservation.user_id, change).await?;
        if !applied {
            warn!("Reservation is unknown, expired or already settled");
            return Err(QuotaError::InvalidReservation(
                "reservation is unknown, expired or already settled".to_string(),
            ));
        }
        Ok(stats)
    }

    async fn apply(
        &self,
        user_id: &UserId,
        change: UsageChange,
    ) -> Result<(UsageStats, bool), QuotaError> {
        let update = self.usage.apply(user_id.as_str(), change, Utc::now()).await?;
        Ok((update.row.to_stats()?, update.applied))
    }
}

fn metered(feature: Feature) -> Result<UsageCounter, QuotaError> {
    feature.counter().ok_or(QuotaError::NotMetered(feature))
}

impl<S: SubscriptionRepository, U: UsageRepository> Clone for UsageRecorder<S, U> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            usage: Arc::clone(&self.usage),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> std::fmt::Debug for UsageRecorder<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder").finish()
    }
}
