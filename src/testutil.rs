use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256};
use parking_lot::Mutex;

use crate::ledger::client::{LedgerClient, LedgerError};
use crate::ledger::models::{AgreementBalance, RealtimeBalance, SignedTransaction, TxReceipt};
use crate::remediation::submitter::TransactionAttempt;

/// Scripted submission behavior, consumed one entry per broadcast.
#[derive(Debug, Clone)]
pub enum Submission {
    Confirm,
    Underpriced,
    /// Never acknowledges; the submitter's timeout race must fire.
    Hang,
    Fail(String),
}

/// Scripted ledger double. Read methods pop from their own queues so the
/// relative poll order of concurrent reads does not matter; unscripted reads
/// fail loudly. Write-path behavior is scripted per call; unscripted calls
/// take the happy path.
pub struct MockLedger {
    pub sender_address: Address,
    pub chain: u64,
    pub seed_nonce: u64,
    pub rates: Mutex<VecDeque<Result<i128, LedgerError>>>,
    pub balances: Mutex<VecDeque<Result<RealtimeBalance, LedgerError>>>,
    pub deposits: Mutex<VecDeque<Result<AgreementBalance, LedgerError>>>,
    pub critical: Mutex<VecDeque<Result<bool, LedgerError>>>,
    pub gas: Mutex<VecDeque<Result<u64, LedgerError>>>,
    pub sign_failures: Mutex<VecDeque<Option<LedgerError>>>,
    pub submissions: Mutex<VecDeque<Submission>>,
    /// Every attempt that reached signing, in order.
    pub signed: Mutex<Vec<TransactionAttempt>>,
    pub broadcasts: Mutex<u32>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            sender_address: Address::from_low_u64_be(0xa9e47),
            chain: 5,
            seed_nonce: 4908,
            rates: Mutex::new(VecDeque::new()),
            balances: Mutex::new(VecDeque::new()),
            deposits: Mutex::new(VecDeque::new()),
            critical: Mutex::new(VecDeque::new()),
            gas: Mutex::new(VecDeque::new()),
            sign_failures: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(VecDeque::new()),
            signed: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(0),
        }
    }

    /// Script one full account snapshot (rate, balance, deposit).
    pub fn script_snapshot(&self, net_flow_rate: i128, available_balance: i128, deposit: i128) {
        self.rates.lock().push_back(Ok(net_flow_rate));
        self.balances.lock().push_back(Ok(RealtimeBalance {
            available_balance,
            deposit: 0,
            owed_deposit: 0,
        }));
        self.deposits.lock().push_back(Ok(AgreementBalance {
            dynamic_balance: 0,
            deposit,
            owed_deposit: 0,
        }));
    }

    pub fn signed_attempts(&self) -> Vec<TransactionAttempt> {
        self.signed.lock().clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn pop_read<T>(queue: &Mutex<VecDeque<Result<T, LedgerError>>>) -> Result<T, LedgerError> {
    queue
        .lock()
        .pop_front()
        .unwrap_or_else(|| Err(LedgerError::Rpc("mock: no scripted read".into())))
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn sender(&self) -> Address {
        self.sender_address
    }

    fn chain_id(&self) -> u64 {
        self.chain
    }

    async fn net_flow_rate(&self, _token: Address, _account: Address) -> Result<i128, LedgerError> {
        pop_read(&self.rates)
    }

    async fn realtime_balance(
        &self,
        _token: Address,
        _account: Address,
        _at: DateTime<Utc>,
    ) -> Result<RealtimeBalance, LedgerError> {
        pop_read(&self.balances)
    }

    async fn agreement_balance(
        &self,
        _token: Address,
        _account: Address,
        _at: DateTime<Utc>,
    ) -> Result<AgreementBalance, LedgerError> {
        pop_read(&self.deposits)
    }

    async fn is_account_critical(
        &self,
        _token: Address,
        _account: Address,
    ) -> Result<bool, LedgerError> {
        self.critical.lock().pop_front().unwrap_or(Ok(true))
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        _data: &Bytes,
    ) -> Result<u64, LedgerError> {
        self.gas.lock().pop_front().unwrap_or(Ok(100_000))
    }

    async fn transaction_count(&self, _account: Address) -> Result<u64, LedgerError> {
        Ok(self.seed_nonce)
    }

    async fn sign_transaction(
        &self,
        attempt: &TransactionAttempt,
    ) -> Result<SignedTransaction, LedgerError> {
        if let Some(Some(error)) = self.sign_failures.lock().pop_front() {
            return Err(error);
        }
        self.signed.lock().push(attempt.clone());
        Ok(SignedTransaction {
            raw: attempt.data.clone(),
            hash: H256::from_low_u64_be(attempt.nonce),
        })
    }

    async fn send_transaction(&self, _raw: Bytes) -> Result<TxReceipt, LedgerError> {
        let behavior = self
            .submissions
            .lock()
            .pop_front()
            .unwrap_or(Submission::Confirm);
        match behavior {
            Submission::Confirm => {
                let mut broadcasts = self.broadcasts.lock();
                *broadcasts += 1;
                Ok(TxReceipt {
                    transaction_hash: H256::from_low_u64_be(*broadcasts as u64),
                    block_number: 1,
                    gas_used: 21_000,
                    status: true,
                })
            }
            Submission::Underpriced => Err(LedgerError::ReplacementUnderpriced),
            Submission::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
                Err(LedgerError::Rpc("mock: hang elapsed".into()))
            }
            Submission::Fail(reason) => Err(LedgerError::Rpc(reason)),
        }
    }
}
