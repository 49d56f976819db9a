//! In-memory repositories for router tests

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

#[derive(Default, Clone)]
pub struct MockSubscriptionRepository {
    subs: Arc<DashMap<String, SubscriptionRow>>,
}

impl MockSubscriptionRepository {
    pub fn insert(&self, user_id: &str, tier: Tier, status: SubscriptionStatus) {
        self.subs
            .insert(user_id.to_string(), fresh_row(user_id, tier, status));
    }

    pub fn get(&self, user_id: &str) -> Option<SubscriptionRow> {
        self.subs.get(user_id).map(|r| r.value().clone())
    }
}

fn fresh_row(user_id: &str, tier: Tier, status: SubscriptionStatus) -> SubscriptionRow {
    let now = Utc::now();
    SubscriptionRow {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        tier: tier.as_str().to_string(),
        status: status.as_str().to_string(),
        stripe_customer_id: None,
        stripe_subscription_id: None,
        current_period_start: now,
        current_period_end: now,
        canceled_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl SubscriptionRepository for MockSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<SubscriptionRow>> {
        Ok(self.get(user_id))
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
        let mut entry = self
            .subs
            .entry(sub.user_id.clone())
            .or_insert_with(|| fresh_row(&sub.user_id, Tier::Free, SubscriptionStatus::Active));
        let row = entry.value_mut();
        row.tier = sub.tier;
        row.status = sub.status;
        if sub.stripe_customer_id.is_some() {
            row.stripe_customer_id = sub.stripe_customer_id;
        }
        row.stripe_subscription_id = sub.stripe_subscription_id;
        row.current_period_start = sub.current_period_start;
        row.current_period_end = sub.current_period_end;
        Ok(row.clone())
    }

    async fn link_customer(&self, link: LinkCustomer) -> DbResult<SubscriptionRow> {
        let mut entry = self
            .subs
            .entry(link.user_id.clone())
            .or_insert_with(|| fresh_row(&link.user_id, Tier::Free, SubscriptionStatus::Active));
        let row = entry.value_mut();
        row.status = SubscriptionStatus::Active.as_str().to_string();
        row.stripe_customer_id = Some(link.stripe_customer_id);
        row.canceled_at = None;
        Ok(row.clone())
    }

    async fn update_status(&self, user_id: &str, status: &str) -> DbResult<()> {
        if let Some(mut row) = self.subs.get_mut(user_id) {
            row.status = status.to_string();
        }
        Ok(())
    }

    async fn cancel(&self, user_id: &str) -> DbResult<()> {
        if let Some(mut row) = self.subs.get_mut(user_id) {
            row.status = SubscriptionStatus::Canceled.as_str().to_string();
            row.canceled_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Applies changes under the per-user map entry lock
#[derive(Default, Clone)]
pub struct MockUsageRepository {
    rows: Arc<DashMap<String, UsageStats>>,
}

impl MockUsageRepository {
    pub fn insert(&self, stats: &UsageStats) {
        self.rows.insert(stats.user_id.to_string(), stats.clone());
    }

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
