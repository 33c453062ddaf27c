// Core modules
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod estimation;
pub mod events;
pub mod ledger;
pub mod remediation;
pub mod store;

#[cfg(test)]
mod testutil;

// Re-exports
pub use bootstrap::{init_tracing, initialize, Sentinel};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use estimation::engine::{compute_insolvency_date, InsolvencyDate};
pub use estimation::queue::{EstimationQueue, EstimationTask};
pub use events::{AgreementUpdateQueue, AgreementUpdateTask, EventDispatcher, LedgerEvent};
pub use ledger::client::{LedgerClient, LedgerError};
pub use remediation::scheduler::{PassSummary, RemediationConfig, RemediationScheduler};
pub use remediation::submitter::{
    NonceLedger, SubmitOutcome, TransactionAttempt, TransactionSubmitter,
};
pub use remediation::tx_builder::TransactionBuilder;
pub use store::models::{EstimationRecord, FlowAgreement};
