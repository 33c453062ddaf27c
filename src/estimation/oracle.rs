use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::Address;

use crate::ledger::client::{LedgerClient, LedgerError};
use crate::ledger::models::AccountSnapshot;

/// Read adapter assembling an account's net position from the ledger.
pub struct BalanceOracle {
    ledger: Arc<dyn LedgerClient>,
}

impl BalanceOracle {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Net flow rate, available balance and agreement deposit for
    /// (token, account) as of `at`. The three reads are independent and
    /// issued concurrently; the snapshot carries the instant they were
    /// taken at so the downstream computation stays pure.
    pub async fn snapshot(
        &self,
        token: Address,
        account: Address,
        at: DateTime<Utc>,
    ) -> Result<AccountSnapshot, LedgerError> {
        let (net_flow_rate, balance, agreement) = tokio::try_join!(
            self.ledger.net_flow_rate(token, account),
            self.ledger.realtime_balance(token, account, at),
            self.ledger.agreement_balance(token, account, at),
        )?;

        Ok(AccountSnapshot {
            net_flow_rate,
            available_balance: balance.available_balance,
            deposit: agreement.deposit,
            taken_at: at,
        })
    }
}
