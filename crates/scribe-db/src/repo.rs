//! Repository traits
//!
//! Define async repository interfaces for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scribe_types::UsageChange;

use crate::error::DbResult;
use crate::models::*;

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find the subscription of a user
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<SubscriptionRow>>;

    /// Find a subscription by Stripe customer ID
    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> DbResult<Option<SubscriptionRow>>;

    /// Create or replace a user's subscription
    async fn upsert(&self, sub: UpsertSubscription) -> DbResult<SubscriptionRow>;

    /// Attach a Stripe customer to a user, creating a FREE/ACTIVE row if
    /// the user has none. An existing row keeps its tier and becomes ACTIVE.
    async fn link_customer(&self, link: LinkCustomer) -> DbResult<SubscriptionRow>;

    /// Update subscription status
    async fn update_status(&self, user_id: &str, status: &str) -> DbResult<()>;

    /// Mark the subscription CANCELED and stamp `canceled_at`
    async fn cancel(&self, user_id: &str) -> DbResult<()>;
}

/// Upsert subscription input
#[derive(Debug, Clone)]
pub struct UpsertSubscription {
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

/// Link customer input
#[derive(Debug, Clone)]
pub struct LinkCustomer {
    pub user_id: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

/// Usage counters repository trait
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Read a user's counters as stored (no rollover applied)
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<UsageStatsRow>>;

    /// Apply a change atomically for one user.
    ///
    /// A missing row is created first. The row is held exclusively while the
    /// change rolls the period over, checks limits and updates counters, so
    /// concurrent changes for the same user never lose updates.
    async fn apply(
        &self,
        user_id: &str,
        change: UsageChange,
        now: DateTime<Utc>,
    ) -> DbResult<UsageUpdate>;
}

/// Result of [`UsageRepository::apply`]
#[derive(Debug, Clone)]
pub struct UsageUpdate {
    /// Row after the change
    pub row: UsageStatsRow,
    /// Whether the change took effect
    pub applied: bool,
}
