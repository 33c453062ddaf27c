use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, Bytes};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::ledger::client::{LedgerClient, LedgerError};
use crate::ledger::models::TxReceipt;

/// Flat gas-price bump applied when the ledger rejects a resend as
/// underpriced.
const UNDERPRICED_BUMP: u64 = 10;

/// One in-flight remediation transaction.
///
/// Owned by exactly one `send` invocation; never shared across concurrent
/// submissions for the same logical remediation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionAttempt {
    pub target: Address,
    pub data: Bytes,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub nonce: u64,
    pub chain_id: u64,
    pub retry_count: u32,
    pub escalation_step: f64,
}

/// Terminal outcome of one logical send.
#[derive(Debug)]
pub enum SubmitOutcome {
    Confirmed(TxReceipt),
    /// Signing or submission failed for a reason retrying cannot fix. The
    /// nonce was not consumed.
    Rejected(LedgerError),
    /// The retry budget ran out; operator attention needed.
    RetriesExhausted { attempts: u32, last_gas_price: u64 },
}

/// Locally tracked nonce for one remediation pass.
///
/// Seeded once from the chain's pending transaction count, advanced by
/// exactly one per confirmed send, so sequential flows never re-query the
/// chain mid-pass. A plain owned value threaded through the pass; the
/// submitter itself never touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceLedger {
    next: u64,
}

impl NonceLedger {
    pub fn seed(next: u64) -> Self {
        Self { next }
    }

    pub fn current(&self) -> u64 {
        self.next
    }

    pub fn advance(&mut self) {
        self.next += 1;
    }
}

/// Signs, submits and retries remediation transactions.
///
/// Transient failures (underpriced replacement, submission timeout) are
/// retried at the same nonce with a raised gas price until the retry budget
/// runs out. A timed-out broadcast cannot be withdrawn from the ledger; it
/// is resent rather than cancelled, and the ledger's nonce semantics reject
/// the duplicate if the first attempt lands later.
pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerClient>,
    submission_timeout: Duration,
    max_retries: u32,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, submission_timeout: Duration, max_retries: u32) -> Self {
        Self {
            ledger,
            submission_timeout,
            max_retries,
        }
    }

    /// Drive one logical send to a terminal outcome.
    pub async fn send(&self, mut attempt: TransactionAttempt) -> SubmitOutcome {
        loop {
            if attempt.retry_count > self.max_retries {
                warn!(
                    nonce = attempt.nonce,
                    attempts = attempt.retry_count,
                    "retry budget exhausted"
                );
                return SubmitOutcome::RetriesExhausted {
                    attempts: attempt.retry_count,
                    last_gas_price: attempt.gas_price,
                };
            }
            Self::escalate(&mut attempt);

            let signed = match self.ledger.sign_transaction(&attempt).await {
                Ok(signed) => signed,
                Err(LedgerError::ReplacementUnderpriced) => {
                    debug!(nonce = attempt.nonce, "replacement underpriced at signing");
                    attempt.retry_count += 1;
                    continue;
                }
                Err(error @ LedgerError::FlowDoesNotExist) => {
                    debug!(nonce = attempt.nonce, "flow is gone, reclaiming nonce");
                    return SubmitOutcome::Rejected(error);
                }
                Err(error) => {
                    error!(nonce = attempt.nonce, "signing failed: {error}");
                    return SubmitOutcome::Rejected(error);
                }
            };

            match timeout(
                self.submission_timeout,
                self.ledger.send_transaction(signed.raw.clone()),
            )
            .await
            {
                Ok(Ok(receipt)) => {
                    debug!(
                        nonce = attempt.nonce,
                        hash = %receipt.transaction_hash,
                        "transaction confirmed"
                    );
                    return SubmitOutcome::Confirmed(receipt);
                }
                Ok(Err(LedgerError::ReplacementUnderpriced)) => {
                    debug!(nonce = attempt.nonce, "replacement transaction underpriced");
                    attempt.retry_count += 1;
                    attempt.gas_price += UNDERPRICED_BUMP;
                }
                Ok(Err(error)) => {
                    error!(nonce = attempt.nonce, "submission failed: {error}");
                    return SubmitOutcome::Rejected(error);
                }
                Err(_) => {
                    debug!(
                        nonce = attempt.nonce,
                        hash = %signed.hash,
                        "submission timed out, resending with the same nonce"
                    );
                    attempt.retry_count += 1;
                }
            }
        }
    }

    /// Compounding escalation: the raised price is written back, so every
    /// further retry escalates from the already-raised price.
    fn escalate(attempt: &mut TransactionAttempt) {
        if attempt.retry_count > 1 {
            let raised = (attempt.gas_price as f64
                * (1.0 + attempt.escalation_step * (attempt.retry_count - 1) as f64))
                .ceil() as u64;
            debug!(old = attempt.gas_price, new = raised, "escalating gas price");
            attempt.gas_price = raised.max(attempt.gas_price);
        }
    }
}
