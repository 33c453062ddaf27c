use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::ledger::client::{LedgerClient, LedgerError};
use crate::ledger::models::format_address;
use crate::remediation::submitter::{
    NonceLedger, SubmitOutcome, TransactionAttempt, TransactionSubmitter,
};
use crate::remediation::tx_builder::TransactionBuilder;
use crate::store::agreements::FlowStore;
use crate::store::estimations::EstimationStore;
use crate::store::models::FlowAgreement;

/// Remediation pass tuning.
#[derive(Debug, Clone)]
pub struct RemediationConfig {
    /// Gas price floor for the first attempt of every send
    pub gas_price: u64,
    /// Multiplicative escalation step per retry
    pub gas_escalation_step: f64,
    /// Interval between passes
    pub pass_interval: Duration,
}

/// Operator-visible account of one remediation pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Estimation records selected as due
    pub selected: usize,
    pub submitted: u32,
    pub skipped_solvent: u32,
    pub reconciled_gone: u32,
    pub failed: u32,
}

enum FlowOutcome {
    Submitted,
    SkippedSolvent,
    ReconciledGone,
    GaveUp,
}

/// Periodic remediation pass over due insolvency estimations.
///
/// All submissions within a pass share one sending account, so flows are
/// handled strictly sequentially under a single [`NonceLedger`] seeded once
/// per pass. The scheduler loop awaits `run_pass` before the next tick, so
/// two passes never own the nonce sequence at the same time.
pub struct RemediationScheduler {
    config: RemediationConfig,
    ledger: Arc<dyn LedgerClient>,
    estimations: Arc<dyn EstimationStore>,
    flows: Arc<dyn FlowStore>,
    builder: TransactionBuilder,
    submitter: TransactionSubmitter,
}

impl RemediationScheduler {
    pub fn new(
        config: RemediationConfig,
        ledger: Arc<dyn LedgerClient>,
        estimations: Arc<dyn EstimationStore>,
        flows: Arc<dyn FlowStore>,
        builder: TransactionBuilder,
        submitter: TransactionSubmitter,
    ) -> Self {
        Self {
            config,
            ledger,
            estimations,
            flows,
            builder,
            submitter,
        }
    }

    /// Start the pass loop (runs in background).
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.pass_interval);
            loop {
                ticker.tick().await;
                match self.run_pass().await {
                    Ok(summary) => info!(
                        pass = %summary.pass_id,
                        selected = summary.selected,
                        submitted = summary.submitted,
                        skipped_solvent = summary.skipped_solvent,
                        reconciled_gone = summary.reconciled_gone,
                        failed = summary.failed,
                        "remediation pass completed"
                    ),
                    Err(error) => error!("remediation pass failed: {error}"),
                }
            }
        })
    }

    /// One pass: select due records, claim them, close their flows.
    pub async fn run_pass(&self) -> AppResult<PassSummary> {
        let now = Utc::now();
        let due = self.estimations.find_due(now).await?;
        let mut summary = PassSummary {
            pass_id: Uuid::new_v4(),
            started_at: now,
            selected: due.len(),
            submitted: 0,
            skipped_solvent: 0,
            reconciled_gone: 0,
            failed: 0,
        };
        if due.is_empty() {
            return Ok(summary);
        }
        info!(pass = %summary.pass_id, selected = due.len(), "remediation pass started");

        let sender = self.ledger.sender();
        let chain_id = self.ledger.chain_id();
        let mut nonces = NonceLedger::seed(self.ledger.transaction_count(sender).await?);

        for record in &due {
            self.estimations
                .mark_recalculate(record.account, record.token)
                .await?;
            let flows = self.flows.find_by_sender(record.account).await?;

            for flow in &flows {
                match self
                    .handle_flow(summary.pass_id, flow, sender, chain_id, &mut nonces)
                    .await
                {
                    Ok(FlowOutcome::Submitted) => summary.submitted += 1,
                    Ok(FlowOutcome::SkippedSolvent) => summary.skipped_solvent += 1,
                    Ok(FlowOutcome::ReconciledGone) => summary.reconciled_gone += 1,
                    Ok(FlowOutcome::GaveUp) => summary.failed += 1,
                    Err(error) => {
                        // one bad flow never aborts the pass
                        error!(
                            token = %format_address(flow.token),
                            flow_sender = %format_address(flow.sender),
                            receiver = %format_address(flow.receiver),
                            "flow handling failed: {error}"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn handle_flow(
        &self,
        pass_id: Uuid,
        flow: &FlowAgreement,
        sender: Address,
        chain_id: u64,
        nonces: &mut NonceLedger,
    ) -> AppResult<FlowOutcome> {
        let data = self
            .builder
            .delete_flow_call(flow.token, flow.sender, flow.receiver);

        // the stored estimation may be stale; only live insolvency warrants
        // closing the flow
        if !self
            .ledger
            .is_account_critical(flow.token, flow.sender)
            .await?
        {
            debug!(
                account = %format_address(flow.sender),
                token = %format_address(flow.token),
                "account is solvent, skipping flow"
            );
            return Ok(FlowOutcome::SkippedSolvent);
        }

        let gas_limit = match self
            .ledger
            .estimate_gas(sender, self.builder.target(), &data)
            .await
        {
            Ok(gas) => gas,
            Err(LedgerError::FlowDoesNotExist) => {
                debug!(
                    token = %format_address(flow.token),
                    receiver = %format_address(flow.receiver),
                    "flow is gone on-chain, deleting agreement row"
                );
                self.flows.delete(flow).await?;
                return Ok(FlowOutcome::ReconciledGone);
            }
            Err(error) => return Err(error.into()),
        };

        let attempt = TransactionAttempt {
            target: self.builder.target(),
            data,
            gas_price: self.config.gas_price,
            gas_limit,
            nonce: nonces.current(),
            chain_id,
            retry_count: 1,
            escalation_step: self.config.gas_escalation_step,
        };

        match self.submitter.send(attempt).await {
            SubmitOutcome::Confirmed(receipt) => {
                nonces.advance();
                info!(
                    hash = %receipt.transaction_hash,
                    token = %format_address(flow.token),
                    flow_sender = %format_address(flow.sender),
                    receiver = %format_address(flow.receiver),
                    "flow closed"
                );
                Ok(FlowOutcome::Submitted)
            }
            SubmitOutcome::Rejected(error) => {
                // nonce was not consumed; the next flow reclaims it
                warn!(
                    token = %format_address(flow.token),
                    receiver = %format_address(flow.receiver),
                    "remediation rejected: {error}"
                );
                Ok(FlowOutcome::GaveUp)
            }
            SubmitOutcome::RetriesExhausted {
                attempts,
                last_gas_price,
            } => {
                error!(
                    event = "remediation_failed",
                    detail = %serde_json::json!({
                        "pass_id": pass_id,
                        "token": format_address(flow.token),
                        "sender": format_address(flow.sender),
                        "receiver": format_address(flow.receiver),
                        "attempts": attempts,
                        "last_gas_price": last_gas_price,
                    }),
                    "giving up on flow after exhausting retries"
                );
                Ok(FlowOutcome::GaveUp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{InMemoryEstimationStore, InMemoryFlowStore};
    use crate::store::models::EstimationRecord;
    use crate::testutil::{MockLedger, Submission};

    fn addr(byte: u8) -> Address {
        Address::from_low_u64_be(byte as u64)
    }

    fn scheduler(
        ledger: Arc<MockLedger>,
        estimations: Arc<InMemoryEstimationStore>,
        flows: Arc<InMemoryFlowStore>,
    ) -> RemediationScheduler {
        let config = RemediationConfig {
            gas_price: 100,
            gas_escalation_step: 0.15,
            pass_interval: Duration::from_secs(86_400),
        };
        let builder = TransactionBuilder::new(addr(0xde), addr(0xcf));
        let submitter =
            TransactionSubmitter::new(ledger.clone(), Duration::from_millis(40), 3);
        RemediationScheduler::new(config, ledger, estimations, flows, builder, submitter)
    }

    fn due_record(account: u8, token: u8) -> EstimationRecord {
        EstimationRecord {
            account: addr(account),
            token: addr(token),
            estimated_at: Utc::now().timestamp() - 60,
            estimated_human: String::new(),
            last_checked_at: Utc::now(),
            is_urgent: false,
            recalculate: false,
        }
    }

    fn flow(token: u8, sender: u8, receiver: u8) -> FlowAgreement {
        FlowAgreement {
            token: addr(token),
            sender: addr(sender),
            receiver: addr(receiver),
            flow_rate: -385_802_469,
            updated_at_block: 100,
        }
    }

    #[tokio::test]
    async fn test_pass_with_nothing_due_is_a_noop() {
        let ledger = Arc::new(MockLedger::new());
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());

        let summary = scheduler(ledger.clone(), estimations, flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.selected, 0);
        assert_eq!(*ledger.broadcasts.lock(), 0);
    }

    #[tokio::test]
    async fn test_due_record_closes_flows_with_consecutive_nonces() {
        let ledger = Arc::new(MockLedger::new());
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        estimations.insert(due_record(1, 0xee));
        flows.insert(flow(0xee, 1, 2));
        flows.insert(flow(0xee, 1, 3));

        let summary = scheduler(ledger.clone(), estimations.clone(), flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.failed, 0);

        let signed = ledger.signed_attempts();
        assert_eq!(signed.len(), 2);
        assert_eq!(signed[0].nonce, ledger.seed_nonce);
        assert_eq!(signed[1].nonce, ledger.seed_nonce + 1);

        // the record was claimed before its flows were walked
        assert!(estimations.get(addr(1), addr(0xee)).unwrap().recalculate);
    }

    #[tokio::test]
    async fn test_solvent_account_is_skipped_without_a_send() {
        let ledger = Arc::new(MockLedger::new());
        ledger.critical.lock().push_back(Ok(false));
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        estimations.insert(due_record(1, 0xee));
        flows.insert(flow(0xee, 1, 2));

        let summary = scheduler(ledger.clone(), estimations, flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.skipped_solvent, 1);
        assert_eq!(summary.submitted, 0);
        assert!(ledger.signed_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_gone_flow_is_reconciled_without_consuming_a_nonce() {
        let ledger = Arc::new(MockLedger::new());
        // first flow's dry-run reverts, second succeeds
        ledger
            .gas
            .lock()
            .push_back(Err(LedgerError::FlowDoesNotExist));
        ledger.gas.lock().push_back(Ok(100_000));
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        estimations.insert(due_record(1, 0xee));
        flows.insert(flow(0xee, 1, 2));
        flows.insert(flow(0xee, 1, 3));

        let summary = scheduler(ledger.clone(), estimations, flows.clone())
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.reconciled_gone, 1);
        assert_eq!(summary.submitted, 1);

        // the gone flow's row was deleted, the live one kept
        let remaining = flows.find_by_sender(addr(1)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].receiver, addr(3));

        // the send for the surviving flow used the seed nonce
        let signed = ledger.signed_attempts();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].nonce, ledger.seed_nonce);
    }

    #[tokio::test]
    async fn test_one_failing_flow_does_not_abort_the_pass() {
        let ledger = Arc::new(MockLedger::new());
        ledger
            .submissions
            .lock()
            .push_back(Submission::Fail("insufficient funds".into()));
        ledger.submissions.lock().push_back(Submission::Confirm);
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        estimations.insert(due_record(1, 0xee));
        flows.insert(flow(0xee, 1, 2));
        flows.insert(flow(0xee, 1, 3));

        let summary = scheduler(ledger.clone(), estimations, flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.submitted, 1);

        // the rejected send did not consume its nonce; the next flow took it
        let signed = ledger.signed_attempts();
        assert_eq!(signed.len(), 2);
        assert_eq!(signed[0].nonce, ledger.seed_nonce);
        assert_eq!(signed[1].nonce, ledger.seed_nonce);
    }

    #[tokio::test]
    async fn test_underpriced_then_success_advances_nonce_by_one() {
        let ledger = Arc::new(MockLedger::new());
        ledger.submissions.lock().push_back(Submission::Underpriced);
        ledger.submissions.lock().push_back(Submission::Confirm);
        ledger.submissions.lock().push_back(Submission::Confirm);
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        estimations.insert(due_record(1, 0xee));
        flows.insert(flow(0xee, 1, 2));
        flows.insert(flow(0xee, 1, 3));

        let summary = scheduler(ledger.clone(), estimations, flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.submitted, 2);

        let signed = ledger.signed_attempts();
        // first flow signed twice at the seed nonce, second flow exactly once
        // after it
        assert_eq!(signed.len(), 3);
        assert_eq!(signed[0].nonce, ledger.seed_nonce);
        assert_eq!(signed[1].nonce, ledger.seed_nonce);
        assert_eq!(signed[2].nonce, ledger.seed_nonce + 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_as_failed() {
        let ledger = Arc::new(MockLedger::new());
        for _ in 0..4 {
            ledger.submissions.lock().push_back(Submission::Underpriced);
        }
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        estimations.insert(due_record(1, 0xee));
        flows.insert(flow(0xee, 1, 2));

        let summary = scheduler(ledger.clone(), estimations, flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.submitted, 0);
    }

    #[tokio::test]
    async fn test_urgent_record_is_selected_without_a_timestamp() {
        let ledger = Arc::new(MockLedger::new());
        let estimations = Arc::new(InMemoryEstimationStore::new());
        let flows = Arc::new(InMemoryFlowStore::new());
        let mut record = due_record(1, 0xee);
        record.estimated_at = -1;
        record.is_urgent = true;
        estimations.insert(record);
        flows.insert(flow(0xee, 1, 2));

        let summary = scheduler(ledger.clone(), estimations, flows)
            .run_pass()
            .await
            .unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.submitted, 1);
    }
}
