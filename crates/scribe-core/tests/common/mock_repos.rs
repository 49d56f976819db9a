//! Mock repositories for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scribe_db::{
    DbError, DbResult, LinkCustomer, SubscriptionRepository, SubscriptionRow, UpsertSubscription,
    UsageRepository, UsageStatsRow, UsageUpdate,
};
use scribe_types::{SubscriptionStatus, Tier, UsageChange, UsageStats, UserId};
use uuid::Uuid;

/// In-memory subscription repository for testing
#[derive(Default, Clone)]
pub struct MockSubscriptionRepository {
    subs: Arc<DashMap<String, SubscriptionRow>>,
    reads: Arc<AtomicUsize>,
}

impl MockSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription directly
    pub fn insert(&self, user_id: &str, tier: Tier, status: SubscriptionStatus) {
        self.insert_row(Self::create_test_row(user_id, tier.as_str(), status.as_str()));
    }

    /// Insert a raw row
    pub fn insert_row(&self, row: SubscriptionRow) {
        self.subs.insert(row.user_id.clone(), row);
    }

    /// Build a row with the given stored tier and status strings
    #[allow(dead_code)]
    pub fn create_test_row(user_id: &str, tier: &str, status: &str) -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            tier: tier.to_string(),
            status: status.to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            current_period_start: now,
            current_period_end: now,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[allow(dead_code)]
    pub fn get(&self, user_id: &str) -> Option<SubscriptionRow> {
        self.subs.get(user_id).map(|r| r.value().clone())
    }

    /// Number of `find_by_user_id` calls so far
    #[allow(dead_code)]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionRepository for MockSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<SubscriptionRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.subs.get(user_id).map(|r| r.value().clone()))
    }

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> DbResult<Option<SubscriptionRow>> {
        Ok(self
            .subs
            .iter()
            .find(|r| r.stripe_customer_id.as_deref() == Some(customer_id))
            .map(|r| r.value().clone()))
    }

    async fn upsert(&self, sub: UpsertSubscription) -> DbResult<SubscriptionRow> {
        let now = Utc::now();
        let canceled = sub.status == SubscriptionStatus::Canceled.as_str();
        let mut entry = self
            .subs
            .entry(sub.user_id.clone())
            .or_insert_with(|| Self::create_test_row(&sub.user_id, &sub.tier, &sub.status));

        let row = entry.value_mut();
        row.tier = sub.tier;
        row.status = sub.status;
        if sub.stripe_customer_id.is_some() {
            row.stripe_customer_id = sub.stripe_customer_id;
        }
        if sub.stripe_subscription_id.is_some() {
            row.stripe_subscription_id = sub.stripe_subscription_id;
        }
        row.current_period_start = sub.current_period_start;
        row.current_period_end = sub.current_period_end;
        row.canceled_at = if canceled {
            row.canceled_at.or(Some(now))
        } else {
            None
        };
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn link_customer(&self, link: LinkCustomer) -> DbResult<SubscriptionRow> {
        let mut entry = self.subs.entry(link.user_id.clone()).or_insert_with(|| {
            let mut row = Self::create_test_row(&link.user_id, "FREE", "ACTIVE");
            row.current_period_start = link.current_period_start;
            row.current_period_end = link.current_period_end;
            row
        });

        let row = entry.value_mut();
        row.status = SubscriptionStatus::Active.as_str().to_string();
        row.stripe_customer_id = Some(link.stripe_customer_id);
        if link.stripe_subscription_id.is_some() {
            row.stripe_subscription_id = link.stripe_subscription_id;
        }
        row.canceled_at = None;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn update_status(&self, user_id: &str, status: &str) -> DbResult<()> {
        if let Some(mut row) = self.subs.get_mut(user_id) {
            row.status = status.to_string();
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn cancel(&self, user_id: &str) -> DbResult<()> {
        if let Some(mut row) = self.subs.get_mut(user_id) {
            row.status = SubscriptionStatus::Canceled.as_str().to_string();
            row.canceled_at = row.canceled_at.or(Some(Utc::now()));
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// In-memory usage repository for testing.
///
/// `apply` runs under the DashMap shard lock for the user, which gives the
/// same per-user serialization as the row lock in PostgreSQL.
#[derive(Default, Clone)]
pub struct MockUsageRepository {
    rows: Arc<DashMap<String, UsageStats>>,
}

impl MockUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert counters directly
    #[allow(dead_code)]
    pub fn insert(&self, stats: &UsageStats) {
        self.rows.insert(stats.user_id.to_string(), stats.clone());
    }

    /// Stored counters, without rollover
    #[allow(dead_code)]
    pub fn get(&self, user_id: &str) -> Option<UsageStats> {
        self.rows.get(user_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl UsageRepository for MockUsageRepository {
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<UsageStatsRow>> {
        Ok(self
            .rows
            .get(user_id)
            .map(|r| UsageStatsRow::from_stats(r.value())))
    }

    async fn apply(
        &self,
        user_id: &str,
        change: UsageChange,
        now: DateTime<Utc>,
    ) -> DbResult<UsageUpdate> {
        let owner = UserId::parse(user_id).map_err(|e| DbError::InvalidRow(e.to_string()))?;
        let mut entry = self
            .rows
            .entry(user_id.to_string())
            .or_insert_with(|| UsageStats::new(owner, now));

        let stats = entry.value_mut();
        let applied = change.apply(stats, now);

        Ok(UsageUpdate {
            row: UsageStatsRow::from_stats(stats),
            applied,
        })
    }
}

/// Repository whose every call fails like an unreachable database
#[derive(Default, Clone)]
pub struct FailingRepository;

fn unavailable() -> DbError {
    DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl SubscriptionRepository for FailingRepository {
    async fn find_by_user_id(&self, _: &str) -> DbResult<Option<SubscriptionRow>> {
        Err(unavailable())
    }

    async fn find_by_stripe_customer_id(&self, _: &str) -> DbResult<Option<SubscriptionRow>> {
        Err(unavailable())
    }

    async fn upsert(&self, _: UpsertSubscription) -> DbResult<SubscriptionRow> {
        Err(unavailable())
    }

    async fn link_customer(&self, _: LinkCustomer) -> DbResult<SubscriptionRow> {
        Err(unavailable())
    }

    async fn update_status(&self, _: &str, _: &str) -> DbResult<()> {
        Err(unavailable())
    }

    async fn cancel(&self, _: &str) -> DbResult<()> {
        Err(unavailable())
    }
}

#[async_trait]
impl UsageRepository for FailingRepository {
    async fn find_by_user_id(&self, _: &str) -> DbResult<Option<UsageStatsRow>> {
        Err(unavailable())
    }

    async fn apply(&self, _: &str, _: UsageChange, _: DateTime<Utc>) -> DbResult<UsageUpdate> {
        Err(unavailable())
    }
}
