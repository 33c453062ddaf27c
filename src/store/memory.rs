use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use parking_lot::RwLock;

use crate::error::AppResult;
use crate::store::agreements::FlowStore;
use crate::store::estimations::EstimationStore;
use crate::store::models::{EstimationRecord, FlowAgreement};

/// In-memory estimation store, for tests and embedders without Postgres
#[derive(Default)]
pub struct InMemoryEstimationStore {
    records: RwLock<HashMap<(Address, Address), EstimationRecord>>,
}

impl InMemoryEstimationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account: Address, token: Address) -> Option<EstimationRecord> {
        self.records.read().get(&(account, token)).cloned()
    }

    pub fn insert(&self, record: EstimationRecord) {
        self.records
            .write()
            .insert((record.account, record.token), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl EstimationStore for InMemoryEstimationStore {
    async fn upsert(&self, record: &EstimationRecord) -> AppResult<()> {
        self.insert(record.clone());
        Ok(())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> AppResult<Vec<EstimationRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.is_due(now))
            .cloned()
            .collect())
    }

    async fn mark_recalculate(&self, account: Address, token: Address) -> AppResult<()> {
        if let Some(record) = self.records.write().get_mut(&(account, token)) {
            record.recalculate = true;
        }
        Ok(())
    }
}

/// In-memory flow store
#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<(Address, Address, Address), FlowAgreement>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, flow: FlowAgreement) {
        self.flows
            .write()
            .insert((flow.token, flow.sender, flow.receiver), flow);
    }

    pub fn all(&self) -> Vec<FlowAgreement> {
        self.flows.read().values().cloned().collect()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn find_by_sender(&self, sender: Address) -> AppResult<Vec<FlowAgreement>> {
        let mut flows: Vec<FlowAgreement> = self
            .flows
            .read()
            .values()
            .filter(|flow| flow.sender == sender)
            .cloned()
            .collect();
        // deterministic walk order for sequential submission
        flows.sort_by_key(|flow| (flow.token, flow.receiver));
        Ok(flows)
    }

    async fn delete(&self, flow: &FlowAgreement) -> AppResult<()> {
        self.flows
            .write()
            .remove(&(flow.token, flow.sender, flow.receiver));
        Ok(())
    }
}
