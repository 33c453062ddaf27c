use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Token-level realtime balance of an account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RealtimeBalance {
    pub available_balance: i128,
    pub deposit: i128,
    pub owed_deposit: i128,
}

/// Flow-agreement-level balance of an account. The deposit here is the
/// buffer reserved per agreement that extends solvency before liquidation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgreementBalance {
    pub dynamic_balance: i128,
    pub deposit: i128,
    pub owed_deposit: i128,
}

/// One observation of an account's net position for a token, assembled from
/// concurrent ledger reads taken at the same instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub net_flow_rate: i128,
    pub available_balance: i128,
    pub deposit: i128,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: bool,
}

/// Full lowercase hex form used for storage and log keys. `Display` on
/// `Address` abbreviates the middle, which is useless as a row key.
pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}

pub fn parse_address(raw: &str) -> AppResult<Address> {
    raw.parse()
        .map_err(|_| AppError::InvalidAddress(raw.to_string()))
}

/// Flow rates are persisted as decimal text; Postgres has no 128-bit integer.
pub fn parse_flow_rate(raw: &str) -> AppResult<i128> {
    raw.parse()
        .map_err(|_| AppError::InvalidNumeric(raw.to_string()))
}
