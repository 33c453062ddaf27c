use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes};
use thiserror::Error;

use crate::ledger::models::{AgreementBalance, RealtimeBalance, SignedTransaction, TxReceipt};
use crate::remediation::submitter::TransactionAttempt;

/// Ledger failure classification.
///
/// Implementations map raw transport failures (revert reasons, RPC error
/// strings) onto these kinds at the adapter boundary. Core logic matches on
/// kinds and never inspects message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A resubmission at the same nonce did not raise the fee enough to
    /// replace the pending transaction.
    #[error("replacement transaction underpriced")]
    ReplacementUnderpriced,

    /// The targeted flow agreement no longer exists on-chain.
    #[error("flow does not exist")]
    FlowDoesNotExist,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("ledger rpc failure: {0}")]
    Rpc(String),
}

/// Read and write access to the ledger.
///
/// Connection setup, ABI loading and key provisioning are the implementor's
/// concern; the sentinel only consumes this surface.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Account remediation transactions are sent from.
    fn sender(&self) -> Address;

    fn chain_id(&self) -> u64;

    /// Net flow rate for (token, account); negative means draining.
    async fn net_flow_rate(&self, token: Address, account: Address) -> Result<i128, LedgerError>;

    /// Token-level realtime balance of the account at `at`.
    async fn realtime_balance(
        &self,
        token: Address,
        account: Address,
        at: DateTime<Utc>,
    ) -> Result<RealtimeBalance, LedgerError>;

    /// Flow-agreement-level balance of the account at `at`.
    async fn agreement_balance(
        &self,
        token: Address,
        account: Address,
        at: DateTime<Utc>,
    ) -> Result<AgreementBalance, LedgerError>;

    /// Whether the account is critical (insolvent) for the token right now.
    async fn is_account_critical(
        &self,
        token: Address,
        account: Address,
    ) -> Result<bool, LedgerError>;

    /// Dry-run a call and return its gas limit. Must surface
    /// [`LedgerError::FlowDoesNotExist`] when the call reverts because the
    /// targeted flow is gone.
    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
    ) -> Result<u64, LedgerError>;

    /// Pending-inclusive transaction count, used to seed the nonce ledger.
    async fn transaction_count(&self, account: Address) -> Result<u64, LedgerError>;

    async fn sign_transaction(
        &self,
        attempt: &TransactionAttempt,
    ) -> Result<SignedTransaction, LedgerError>;

    /// Broadcast a signed transaction and resolve once the ledger
    /// acknowledges it.
    async fn send_transaction(&self, raw: Bytes) -> Result<TxReceipt, LedgerError>;
}
