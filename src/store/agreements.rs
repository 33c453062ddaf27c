use async_trait::async_trait;
use ethers::types::Address;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::ledger::models::{format_address, parse_address, parse_flow_rate};
use crate::store::models::FlowAgreement;

/// Flow-agreement persistence boundary. Rows are created and updated by the
/// external event ingestion path; the sentinel reads by sender and deletes
/// agreements that turned out to be gone on-chain.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn find_by_sender(&self, sender: Address) -> AppResult<Vec<FlowAgreement>>;

    async fn delete(&self, flow: &FlowAgreement) -> AppResult<()>;
}

/// Postgres-backed flow store
pub struct PgFlowStore {
    pool: PgPool,
}

impl PgFlowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlowStore for PgFlowStore {
    async fn find_by_sender(&self, sender: Address) -> AppResult<Vec<FlowAgreement>> {
        let rows = sqlx::query(
            r#"
            SELECT token, sender, receiver, flow_rate, updated_at_block
            FROM agreements
            WHERE sender = $1
            "#,
        )
        .bind(format_address(sender))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(flow_from_row).collect()
    }

    async fn delete(&self, flow: &FlowAgreement) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM agreements
            WHERE token = $1 AND sender = $2 AND receiver = $3
            "#,
        )
        .bind(format_address(flow.token))
        .bind(format_address(flow.sender))
        .bind(format_address(flow.receiver))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn flow_from_row(row: &PgRow) -> AppResult<FlowAgreement> {
    let token: String = row.try_get("token")?;
    let sender: String = row.try_get("sender")?;
    let receiver: String = row.try_get("receiver")?;
    let flow_rate: String = row.try_get("flow_rate")?;
    let updated_at_block: i64 = row.try_get("updated_at_block")?;

    Ok(FlowAgreement {
        token: parse_address(&token)?,
        sender: parse_address(&sender)?,
        receiver: parse_address(&receiver)?,
        flow_rate: parse_flow_rate(&flow_rate)?,
        updated_at_block: updated_at_block as u64,
    })
}
