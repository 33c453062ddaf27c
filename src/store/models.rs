use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::estimation::engine::InsolvencyDate;

/// Persisted insolvency estimate for one (account, token) pair.
///
/// `estimated_at` is epoch seconds with two sentinels: 0 means the account
/// is net-receiving and never becomes insolvent, -1 means insolvency is
/// already in effect. All writes are linearized through the estimation
/// queue; the store never sees two computations for the same key in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationRecord {
    pub account: Address,
    pub token: Address,
    pub estimated_at: i64,
    pub estimated_human: String,
    pub last_checked_at: DateTime<Utc>,
    pub is_urgent: bool,
    /// Set when a remediation pass has claimed this record for processing.
    pub recalculate: bool,
}

impl EstimationRecord {
    pub fn from_estimate(
        account: Address,
        token: Address,
        date: &InsolvencyDate,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account,
            token,
            estimated_at: date.epoch_seconds(checked_at),
            estimated_human: date.human(),
            last_checked_at: checked_at,
            is_urgent: date.is_urgent(),
            recalculate: false,
        }
    }

    /// Due for remediation: already insolvent, or the estimated date is a
    /// real timestamp that has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_urgent || (self.estimated_at > 0 && self.estimated_at <= now.timestamp())
    }
}

/// One continuous-flow agreement, keyed by (token, sender, receiver).
///
/// Rows are written by the external event ingestion path; this core reads
/// them and deletes them when remediation finds the flow gone on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAgreement {
    pub token: Address,
    pub sender: Address,
    pub receiver: Address,
    pub flow_rate: i128,
    pub updated_at_block: u64,
}
