//! PostgreSQL subscription repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::SubscriptionRow;
use crate::repo::{LinkCustomer, SubscriptionRepository, UpsertSubscription};

const COLUMNS: &str = "id, user_id, tier, status, stripe_customer_id, stripe_subscription_id, \
                       current_period_start, current_period_end, canceled_at, created_at, updated_at";

/// PostgreSQL subscription repository
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<SubscriptionRow>> {
        let sql = format!("SELECT {COLUMNS} FROM subscriptions WHERE user_id = $1");
        let sub = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sub)
    }

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> DbResult<Option<SubscriptionRow>> {
        let sql = format!("SELECT {COLUMNS} FROM subscriptions WHERE stripe_customer_id = $1");
        let sub = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sub)
    }

    async fn upsert(&self, sub: UpsertSubscription) -> DbResult<SubscriptionRow> {
        let sql = format!(
            r#"
            INSERT INTO subscriptions (id, user_id, tier, status, stripe_customer_id,
                                       stripe_subscription_id, current_period_start,
                                       current_period_end, canceled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    CASE WHEN $4 = 'CANCELED' THEN NOW() END)
            ON CONFLICT (user_id) DO UPDATE SET
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id,
                                              subscriptions.stripe_customer_id),
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id,
                                                  subscriptions.stripe_subscription_id),
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                canceled_at = CASE
                    WHEN EXCLUDED.status = 'CANCELED'
                        THEN COALESCE(subscriptions.canceled_at, NOW())
                    ELSE NULL
                END,
                updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&sub.user_id)
            .bind(&sub.tier)
            .bind(&sub.status)
            .bind(&sub.stripe_customer_id)
            .bind(&sub.stripe_subscription_id)
            .bind(sub.current_period_start)
            .bind(sub.current_period_end)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn link_customer(&self, link: LinkCustomer) -> DbResult<SubscriptionRow> {
        let sql = format!(
            r#"
            INSERT INTO subscriptions (id, user_id, tier, status, stripe_customer_id,
                                       stripe_subscription_id, current_period_start,
                                       current_period_end)
            VALUES ($1, $2, 'FREE', 'ACTIVE', $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                status = 'ACTIVE',
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id,
                                                  subscriptions.stripe_subscription_id),
                canceled_at = NULL,
                updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&link.user_id)
            .bind(&link.stripe_customer_id)
            .bind(&link.stripe_subscription_id)
            .bind(link.current_period_start)
            .bind(link.current_period_end)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update_status(&self, user_id: &str, status: &str) -> DbResult<()> {
        sqlx::query("UPDATE subscriptions SET status = $1, updated_at = NOW() WHERE user_id = $2")
            .bind(status)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn cancel(&self, user_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'CANCELED', canceled_at = COALESCE(canceled_at, NOW()), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
