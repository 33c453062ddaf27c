use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::AppResult;
use crate::estimation::engine::{self, InsolvencyDate};
use crate::estimation::oracle::BalanceOracle;
use crate::ledger::models::format_address;
use crate::store::estimations::EstimationStore;
use crate::store::models::EstimationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EstimationTask {
    pub account: Address,
    pub token: Address,
}

/// Single-worker estimation queue.
///
/// Exactly one worker drains the channel strictly FIFO, one task at a time,
/// so no two computations for the same (account, token) key ever interleave
/// and the store sees at most one in-flight write. A failed task is logged
/// and dropped; the scheduler re-derives live solvency before acting, so a
/// missing estimation only delays scheduling.
#[derive(Clone)]
pub struct EstimationQueue {
    sender: mpsc::UnboundedSender<EstimationTask>,
}

impl EstimationQueue {
    /// Spawn the worker and return the queue handle. The worker exits once
    /// every queue handle is dropped and the channel drains.
    pub fn start(
        oracle: BalanceOracle,
        store: Arc<dyn EstimationStore>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<EstimationTask>();

        let handle = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                let now = Utc::now();
                match process(&oracle, store.as_ref(), task, now).await {
                    Ok(date) => debug!(
                        account = %format_address(task.account),
                        token = %format_address(task.token),
                        estimated = %date.human(),
                        "estimation stored"
                    ),
                    Err(error) => error!(
                        account = %format_address(task.account),
                        token = %format_address(task.token),
                        "estimation task dropped: {error}"
                    ),
                }

                if receiver.is_empty() {
                    debug!("estimation queue drained");
                }
            }
        });

        (Self { sender }, handle)
    }

    pub fn submit(&self, task: EstimationTask) {
        if self.sender.send(task).is_err() {
            warn!("estimation queue worker is gone, dropping task");
        }
    }
}

async fn process(
    oracle: &BalanceOracle,
    store: &dyn EstimationStore,
    task: EstimationTask,
    now: DateTime<Utc>,
) -> AppResult<InsolvencyDate> {
    let snapshot = oracle.snapshot(task.token, task.account, now).await?;
    let date = engine::compute_insolvency_date(
        snapshot.net_flow_rate,
        snapshot.available_balance,
        snapshot.deposit,
        now,
    );
    let record = EstimationRecord::from_estimate(task.account, task.token, &date, now);
    store.upsert(&record).await?;
    Ok(date)
}
