use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::ledger::models::{format_address, parse_address};
use crate::store::models::EstimationRecord;

/// Estimation persistence boundary. Writes arrive only from the estimation
/// queue worker; reads from the remediation scheduler.
#[async_trait]
pub trait EstimationStore: Send + Sync {
    /// Insert or replace the record for its (account, token) key.
    async fn upsert(&self, record: &EstimationRecord) -> AppResult<()>;

    /// Records due for remediation: urgent, or estimated at a real
    /// timestamp that is not in the future.
    async fn find_due(&self, now: DateTime<Utc>) -> AppResult<Vec<EstimationRecord>>;

    /// Claim a record for processing by a remediation pass. A missing row is
    /// not an error; the record may have been re-estimated meanwhile.
    async fn mark_recalculate(&self, account: Address, token: Address) -> AppResult<()>;
}

/// Postgres-backed estimation store
pub struct PgEstimationStore {
    pool: PgPool,
}

impl PgEstimationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EstimationStore for PgEstimationStore {
    async fn upsert(&self, record: &EstimationRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO estimations
                (account, token, estimated_at, estimated_human, last_checked_at, is_urgent, recalculate)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account, token) DO UPDATE SET
                estimated_at = EXCLUDED.estimated_at,
                estimated_human = EXCLUDED.estimated_human,
                last_checked_at = EXCLUDED.last_checked_at,
                is_urgent = EXCLUDED.is_urgent,
                recalculate = EXCLUDED.recalculate
            "#,
        )
        .bind(format_address(record.account))
        .bind(format_address(record.token))
        .bind(record.estimated_at)
        .bind(&record.estimated_human)
        .bind(record.last_checked_at)
        .bind(record.is_urgent)
        .bind(record.recalculate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> AppResult<Vec<EstimationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT account, token, estimated_at, estimated_human, last_checked_at, is_urgent, recalculate
            FROM estimations
            WHERE is_urgent = TRUE OR (estimated_at > 0 AND estimated_at <= $1)
            "#,
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn mark_recalculate(&self, account: Address, token: Address) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE estimations SET recalculate = TRUE
            WHERE account = $1 AND token = $2
            "#,
        )
        .bind(format_address(account))
        .bind(format_address(token))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> AppResult<EstimationRecord> {
    let account: String = row.try_get("account")?;
    let token: String = row.try_get("token")?;

    Ok(EstimationRecord {
        account: parse_address(&account)?,
        token: parse_address(&token)?,
        estimated_at: row.try_get("estimated_at")?,
        estimated_human: row.try_get("estimated_human")?,
        last_checked_at: row.try_get("last_checked_at")?,
        is_urgent: row.try_get("is_urgent")?,
        recalculate: row.try_get("recalculate")?,
    })
}
