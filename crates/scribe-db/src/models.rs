//! Database models
//!
//! Row types mapping to database tables.

use chrono::{DateTime, Utc};
use scribe_types::{
    PendingReservation, Subscription, SubscriptionStatus, Tier, UsageCounter, UsageStats, UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Subscription row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    /// Stored tier, if it parses
    pub fn tier(&self) -> Option<Tier> {
        self.tier.parse().ok()
    }

    /// Stored status, if it parses
    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.status.parse().ok()
    }

    /// Map to the domain subscription.
    ///
    /// An unrecognised tier maps to FREE and an unrecognised status to
    /// CANCELED, so a corrupted row never grants more than the free plan.
    pub fn to_subscription(&self) -> DbResult<Subscription> {
        let user_id = UserId::parse(&self.user_id)
            .map_err(|e| DbError::InvalidRow(format!("subscriptions.user_id: {e}")))?;

        Ok(Subscription {
            user_id,
            tier: self.tier().unwrap_or(Tier::Free),
            status: self.status().unwrap_or(SubscriptionStatus::Canceled),
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
        })
    }
}

/// Usage counters row from the database
#[derive(Debug, Clone, FromRow)]
pub struct UsageStatsRow {
    pub user_id: String,
    pub suggestions_used_in_period: i64,
    pub scans_used_in_period: i64,
    pub documents_owned: i64,
    pub total_suggestions: i64,
    pub total_scans: i64,
    pub total_documents: i64,
    pub period_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageStatsRow {
    /// Row holding `stats`, created at `stats.updated_at`
    pub fn from_stats(stats: &UsageStats) -> Self {
        Self {
            user_id: stats.user_id.to_string(),
            suggestions_used_in_period: to_column(stats.suggestions_used_in_period),
            scans_used_in_period: to_column(stats.scans_used_in_period),
            documents_owned: to_column(stats.documents_owned),
            total_suggestions: to_column(stats.total_suggestions),
            total_scans: to_column(stats.total_scans),
            total_documents: to_column(stats.total_documents),
            period_start: stats.period_start,
            created_at: stats.updated_at,
            updated_at: stats.updated_at,
        }
    }

    /// Map to the domain counters
    pub fn to_stats(&self) -> DbResult<UsageStats> {
        let user_id = UserId::parse(&self.user_id)
            .map_err(|e| DbError::InvalidRow(format!("usage_stats.user_id: {e}")))?;

        Ok(UsageStats {
            user_id,
            suggestions_used_in_period: to_count(self.suggestions_used_in_period),
            scans_used_in_period: to_count(self.scans_used_in_period),
            documents_owned: to_count(self.documents_owned),
            total_suggestions: to_count(self.total_suggestions),
            total_scans: to_count(self.total_scans),
            total_documents: to_count(self.total_documents),
            period_start: self.period_start,
            updated_at: self.updated_at,
            pending: Vec::new(),
        })
    }

    /// Overwrite the counter columns with `stats`
    pub fn apply_stats(&mut self, stats: &UsageStats) {
        self.suggestions_used_in_period = to_column(stats.suggestions_used_in_period);
        self.scans_used_in_period = to_column(stats.scans_used_in_period);
        self.documents_owned = to_column(stats.documents_owned);
        self.total_suggestions = to_column(stats.total_suggestions);
        self.total_scans = to_column(stats.total_scans);
        self.total_documents = to_column(stats.total_documents);
        self.period_start = stats.period_start;
        self.updated_at = stats.updated_at;
    }
}

/// Unsettled reservation row from the database
#[derive(Debug, Clone, FromRow)]
pub struct UsageReservationRow {
    pub id: Uuid,
    pub user_id: String,
    pub counter: String,
    pub period_start: DateTime<Utc>,
    pub reserved_at: DateTime<Utc>,
}

impl UsageReservationRow {
    pub fn from_pending(user_id: &str, pending: &PendingReservation) -> Self {
        Self {
            id: pending.id,
            user_id: user_id.to_string(),
            counter: pending.counter.as_str().to_string(),
            period_start: pending.period_start,
            reserved_at: pending.reserved_at,
        }
    }

    pub fn to_pending(&self) -> DbResult<PendingReservation> {
        let counter = UsageCounter::from_name(&self.counter).ok_or_else(|| {
            DbError::InvalidRow(format!("usage_reservations.counter: {}", self.counter))
        })?;

        Ok(PendingReservation {
            id: self.id,
            counter,
            period_start: self.period_start,
            reserved_at: self.reserved_at,
        })
    }
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
