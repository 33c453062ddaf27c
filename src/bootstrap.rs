use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::AppResult;
use crate::estimation::oracle::BalanceOracle;
use crate::estimation::queue::EstimationQueue;
use crate::events::{AgreementUpdateQueue, EventDispatcher, LedgerEvent};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::parse_address;
use crate::remediation::scheduler::{RemediationConfig, RemediationScheduler};
use crate::remediation::submitter::TransactionSubmitter;
use crate::remediation::tx_builder::TransactionBuilder;
use crate::store::agreements::{FlowStore, PgFlowStore};
use crate::store::estimations::{EstimationStore, PgEstimationStore};

/// Running sentinel: the event inlet, the queue handles and the background
/// workers.
pub struct Sentinel {
    /// Push decoded ledger events here; the dispatcher fans them out.
    pub events: mpsc::UnboundedSender<LedgerEvent>,
    pub estimation_queue: EstimationQueue,
    pub agreement_queue: AgreementUpdateQueue,
    pub scheduler: Arc<RemediationScheduler>,
    workers: Vec<JoinHandle<()>>,
}

impl Sentinel {
    /// Abort every background worker. A transaction already broadcast is not
    /// withdrawn; all state is recoverable from the ledger and the store.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

// Initialize logging and tracing
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,flow_sentinel=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect the store, wire every component and spawn the workers.
///
/// The ledger client is the embedding binary's concern; everything else is
/// constructed here and owned by the returned [`Sentinel`].
pub async fn initialize(config: &Config, ledger: Arc<dyn LedgerClient>) -> AppResult<Sentinel> {
    info!("Initializing sentinel components ...");

    let pool = initialize_database(&config.database_url).await?;

    let estimations: Arc<dyn EstimationStore> = Arc::new(PgEstimationStore::new(pool.clone()));
    let flows: Arc<dyn FlowStore> = Arc::new(PgFlowStore::new(pool));

    let host = parse_address(&config.host_address)?;
    let cfa = parse_address(&config.cfa_address)?;

    let oracle = BalanceOracle::new(ledger.clone());
    let (estimation_queue, estimation_worker) = EstimationQueue::start(oracle, estimations.clone());
    info!("✓ Estimation queue started");

    let (agreement_queue, agreement_worker) =
        AgreementUpdateQueue::start(flows.clone(), estimation_queue.clone());
    info!("✓ Agreement update queue started");

    let dispatcher = EventDispatcher::new(estimation_queue.clone(), agreement_queue.clone());
    let (events, dispatch_worker) = dispatcher.start();
    info!("✓ Event dispatcher started");

    let submitter = TransactionSubmitter::new(
        ledger.clone(),
        Duration::from_millis(config.submission_timeout_ms),
        config.max_submit_retries,
    );
    let scheduler = Arc::new(RemediationScheduler::new(
        RemediationConfig {
            gas_price: config.gas_price,
            gas_escalation_step: config.gas_escalation_step,
            pass_interval: Duration::from_secs(config.pass_interval_secs),
        },
        ledger,
        estimations,
        flows,
        TransactionBuilder::new(host, cfa),
        submitter,
    ));
    let scheduler_worker = scheduler.clone().start();
    info!(
        "✓ Remediation scheduler started (pass every {}s)",
        config.pass_interval_secs
    );

    Ok(Sentinel {
        events,
        estimation_queue,
        agreement_queue,
        scheduler,
        workers: vec![
            estimation_worker,
            agreement_worker,
            dispatch_worker,
            scheduler_worker,
        ],
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
