use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AppResult;
use crate::estimation::queue::{EstimationQueue, EstimationTask};
use crate::ledger::models::format_address;
use crate::store::agreements::FlowStore;

/// Decoded ledger event, delivered by the external subscription transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    TokenUpgraded {
        token: Address,
        account: Address,
        block_number: u64,
    },
    TokenDowngraded {
        token: Address,
        account: Address,
        block_number: u64,
    },
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        block_number: u64,
    },
    AgreementStateUpdated {
        account: Address,
        block_number: u64,
    },
    FlowUpdated {
        token: Address,
        sender: Address,
        receiver: Address,
        flow_rate: i128,
        block_number: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgreementUpdateTask {
    pub account: Address,
    pub block_number: u64,
}

/// Single-worker queue refreshing estimations after agreement changes.
///
/// An agreement-state event does not say which token moved, so the worker
/// re-enqueues an estimation task for every token the account currently
/// streams, looked up from the flow store. Same FIFO single-worker shape as
/// the estimation queue; a failed lookup drops the task.
#[derive(Clone)]
pub struct AgreementUpdateQueue {
    sender: mpsc::UnboundedSender<AgreementUpdateTask>,
}

impl AgreementUpdateQueue {
    /// Spawn the worker and return the queue handle. The worker exits once
    /// every queue handle is dropped and the channel drains.
    pub fn start(
        flows: Arc<dyn FlowStore>,
        estimations: EstimationQueue,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AgreementUpdateTask>();

        let handle = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                match refresh(flows.as_ref(), &estimations, task).await {
                    Ok(tokens) => debug!(
                        account = %format_address(task.account),
                        tokens,
                        block = task.block_number,
                        "agreement update queued estimations"
                    ),
                    Err(error) => error!(
                        account = %format_address(task.account),
                        "agreement update task dropped: {error}"
                    ),
                }
            }
        });

        (Self { sender }, handle)
    }

    pub fn submit(&self, task: AgreementUpdateTask) {
        if self.sender.send(task).is_err() {
            warn!("agreement update queue worker is gone, dropping task");
        }
    }
}

async fn refresh(
    flows: &dyn FlowStore,
    estimations: &EstimationQueue,
    task: AgreementUpdateTask,
) -> AppResult<usize> {
    let open = flows.find_by_sender(task.account).await?;
    let mut tokens: Vec<Address> = open.iter().map(|flow| flow.token).collect();
    tokens.sort();
    tokens.dedup();
    for token in &tokens {
        estimations.submit(EstimationTask {
            account: task.account,
            token: *token,
        });
    }
    Ok(tokens.len())
}

/// Routes decoded events onto the two work queues.
///
/// Transfers touch both parties' balances; token upgrades and downgrades
/// touch one account; a flow change re-estimates both ends and schedules an
/// agreement refresh for each.
pub struct EventDispatcher {
    estimations: EstimationQueue,
    agreements: AgreementUpdateQueue,
}

impl EventDispatcher {
    pub fn new(estimations: EstimationQueue, agreements: AgreementUpdateQueue) -> Self {
        Self {
            estimations,
            agreements,
        }
    }

    /// Consume events from the external feed until the sender side closes.
    pub fn start(self) -> (mpsc::UnboundedSender<LedgerEvent>, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<LedgerEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                self.dispatch(event);
            }
        });

        (sender, handle)
    }

    pub fn dispatch(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::TokenUpgraded { token, account, .. }
            | LedgerEvent::TokenDowngraded { token, account, .. } => {
                self.estimations.submit(EstimationTask { account, token });
            }
            LedgerEvent::Transfer {
                token, from, to, ..
            } => {
                self.estimations.submit(EstimationTask {
                    account: from,
                    token,
                });
                self.estimations.submit(EstimationTask { account: to, token });
            }
            LedgerEvent::AgreementStateUpdated {
                account,
                block_number,
            } => {
                self.agreements.submit(AgreementUpdateTask {
                    account,
                    block_number,
                });
            }
            LedgerEvent::FlowUpdated {
                token,
                sender,
                receiver,
                block_number,
                ..
            } => {
                self.estimations.submit(EstimationTask {
                    account: sender,
                    token,
                });
                self.estimations.submit(EstimationTask {
                    account: receiver,
                    token,
                });
                self.agreements.submit(AgreementUpdateTask {
                    account: sender,
                    block_number,
                });
                self.agreements.submit(AgreementUpdateTask {
                    account: receiver,
                    block_number,
                });
            }
        }
    }
}
