//! PostgreSQL usage repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scribe_types::{calendar_period_start, PendingReservation, UsageChange};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::{UsageReservationRow, UsageStatsRow};
use crate::repo::{UsageRepository, UsageUpdate};

const COLUMNS: &str = "user_id, suggestions_used_in_period, scans_used_in_period, documents_owned, \
                       total_suggestions, total_scans, total_documents, period_start, \
                       created_at, updated_at";

/// PostgreSQL usage repository
#[derive(Clone)]
pub struct PgUsageRepository {
    pool: PgPool,
}

impl PgUsageRepository {
    /// Create a new usage repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn find_by_user_id(&self, user_id: &str) -> DbResult<Option<UsageStatsRow>> {
        let sql = format!("SELECT {COLUMNS} FROM usage_stats WHERE user_id = $1");
        let row = sqlx::query_as::<_, UsageStatsRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn apply(
        &self,
        user_id: &str,
        change: UsageChange,
        now: DateTime<Utc>,
    ) -> DbResult<UsageUpdate> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO usage_stats (user_id, period_start, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(calendar_period_start(now))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let sql = format!("SELECT {COLUMNS} FROM usage_stats WHERE user_id = $1 FOR UPDATE");
        let mut row = sqlx::query_as::<_, UsageStatsRow>(&sql)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let pending = sqlx::query_as::<_, UsageReservationRow>(
            r#"
            SELECT id, user_id, counter, period_start, reserved_at
            FROM usage_reservations
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut stats = row.to_stats()?;
        stats.pending = pending
            .iter()
            .map(UsageReservationRow::to_pending)
            .collect::<DbResult<_>>()?;
        let before = stats.clone();
        let applied = change.apply(&mut stats, now);

        if stats != before {
            row.apply_stats(&stats);
            sqlx::query(
                r#"
                UPDATE usage_stats
                SET suggestions_used_in_period = $2,
                    scans_used_in_period = $3,
                    documents_owned = $4,
                    total_suggestions = $5,
                    total_scans = $6,
                    total_documents = $7,
                    period_start = $8,
                    updated_at = $9
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(row.suggestions_used_in_period)
            .bind(row.scans_used_in_period)
            .bind(row.documents_owned)
            .bind(row.total_suggestions)
            .bind(row.total_scans)
            .bind(row.total_documents)
            .bind(row.period_start)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;

            sync_pending(&mut tx, user_id, &before.pending, &stats.pending).await?;
        }

        tx.commit().await?;

        Ok(UsageUpdate { row, applied })
    }
}

/// Delete settled or expired reservations and insert new ones
async fn sync_pending(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    before: &[PendingReservation],
    after: &[PendingReservation],
) -> DbResult<()> {
    let removed: Vec<Uuid> = before
        .iter()
        .filter(|p| !after.iter().any(|q| q.id == p.id))
        .map(|p| p.id)
        .collect();

    if !removed.is_empty() {
        sqlx::query("DELETE FROM usage_reservations WHERE id = ANY($1)")
            .bind(removed)
            .execute(&mut **tx)
            .await?;
    }

    for added in after.iter().filter(|p| !before.iter().any(|q| q.id == p.id)) {
        let row = UsageReservationRow::from_pending(user_id, added);
        sqlx::query(
            r#"
            INSERT INTO usage_reservations (id, user_id, counter, period_start, reserved_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(row.id)
        .bind(&row.user_id)
        .bind(&row.counter)
        .bind(row.period_start)
        .bind(row.reserved_at)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
