//! Orchestrator
//!
//! Owns every observed chain and runs one long-lived task per chain per
//! responsibility in a single [`JoinSet`]. Tick intervals are re-read from
//! the chain params after every tick so consensus-side changes apply
//! without a restart.

use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Result, WrapErr};
use futures::future::try_join_all;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{SchedulerConfig, TrackerConfig};
use crate::consensus::ConsensusClient;
use crate::metrics;
use crate::observer::{ChainObserver, ChainState};
use crate::scheduler::OutboundScheduler;
use crate::signer::Signer;
use crate::tss::TssSigner;
use crate::types::{ChainId, ChainParams};

/// How often the scheduler polls for a new consensus block
pub const CONSENSUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// RPC freshness check period
pub const RPC_STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic per-chain responsibilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTask {
    Inbound,
    InboundTrackers,
    OutboundWatch,
    GasPrice,
    RpcStatus,
}

impl ChainTask {
    pub const ALL: [ChainTask; 5] = [
        ChainTask::Inbound,
        ChainTask::InboundTrackers,
        ChainTask::OutboundWatch,
        ChainTask::GasPrice,
        ChainTask::RpcStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainTask::Inbound => "inbound",
            ChainTask::InboundTrackers => "inbound_trackers",
            ChainTask::OutboundWatch => "outbound_watch",
            ChainTask::GasPrice => "gas_price",
            ChainTask::RpcStatus => "rpc_status",
        }
    }

    /// Sleep between ticks under `params`; tickers are in seconds
    pub fn interval(&self, params: &ChainParams) -> Duration {
        let secs = match self {
            ChainTask::Inbound | ChainTask::InboundTrackers => params.inbound_ticker,
            ChainTask::OutboundWatch => params.outbound_ticker,
            ChainTask::GasPrice => params.gas_price_ticker,
            ChainTask::RpcStatus => return RPC_STATUS_INTERVAL,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Whether the task runs while the chain is marked unsupported
    fn runs_unsupported(&self) -> bool {
        matches!(self, ChainTask::RpcStatus)
    }
}

/// Everything running for one chain
pub struct ChainRuntime {
    observer: Arc<ChainObserver>,
    signer: Arc<Signer>,
    scheduler: Arc<OutboundScheduler>,
}

impl ChainRuntime {
    pub fn chain_id(&self) -> ChainId {
        self.observer.chain_id()
    }

    pub fn observer(&self) -> &Arc<ChainObserver> {
        &self.observer
    }

    pub fn signer(&self) -> &Arc<Signer> {
        &self.signer
    }

    pub fn scheduler(&self) -> &Arc<OutboundScheduler> {
        &self.scheduler
    }

    async fn tick(&self, task: ChainTask) -> Result<()> {
        let chain_id = self.chain_id();
        if !task.runs_unsupported() && !self.observer.state().params().is_supported {
            debug!(chain_id, task = task.as_str(), "Chain not supported, skipping tick");
            return Ok(());
        }

        match task {
            ChainTask::Inbound => {
                self.observer.observe_inbound().await?;
            }
            ChainTask::InboundTrackers => {
                let voted = self.observer.observe_inbound_trackers().await?;
                if voted > 0 {
                    info!(chain_id, voted, "Voted inbound trackers");
                }
            }
            ChainTask::OutboundWatch => {
                self.observer.process_outbound_trackers().await?;
            }
            ChainTask::GasPrice => {
                self.observer.post_gas_price().await?;
            }
            ChainTask::RpcStatus => {
                self.observer.check_rpc_status().await?;
            }
        }
        Ok(())
    }
}

/// Sleep for `duration`; returns true if shutdown was signalled instead
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

async fn run_chain_task(
    runtime: Arc<ChainRuntime>,
    task: ChainTask,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let chain_id = runtime.chain_id();
    info!(chain_id, task = task.as_str(), "Chain task started");

    loop {
        if let Err(e) = runtime.tick(task).await {
            warn!(chain_id, task = task.as_str(), error = %e, "Chain task tick failed");
            metrics::record_error(chain_id, task.as_str());
        }

        let interval = task.interval(&runtime.observer.state().params());
        if wait_or_shutdown(&mut shutdown, interval).await {
            info!(chain_id, task = task.as_str(), "Chain task stopped");
            return Ok(());
        }
    }
}

/// Schedule outbounds once per new consensus block
async fn run_scheduler(
    runtime: Arc<ChainRuntime>,
    consensus: Arc<dyn ConsensusClient>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let chain_id = runtime.chain_id();
    let mut last_height = 0u64;
    info!(chain_id, task = "scheduler", "Chain task started");

    loop {
        match consensus.block_height().await {
            Ok(height) if height > last_height => {
                last_height = height;
                if let Err(e) = runtime.scheduler.schedule_outbound(height).await {
                    warn!(chain_id, height, error = %e, "Outbound scheduling failed");
                    metrics::record_error(chain_id, "scheduler");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(chain_id, error = %e, "Error getting consensus block height");
                metrics::record_error(chain_id, "consensus_height");
            }
        }

        if wait_or_shutdown(&mut shutdown, poll_interval).await {
            info!(chain_id, task = "scheduler", "Chain task stopped");
            return Ok(());
        }
    }
}

pub struct Orchestrator {
    consensus: Arc<dyn ConsensusClient>,
    chains: Vec<Arc<ChainRuntime>>,
    consensus_poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(consensus: Arc<dyn ConsensusClient>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            consensus,
            chains: Vec::new(),
            consensus_poll_interval: CONSENSUS_POLL_INTERVAL,
            shutdown,
        }
    }

    pub fn with_consensus_poll_interval(mut self, interval: Duration) -> Self {
        self.consensus_poll_interval = interval;
        self
    }

    /// Register a chain; its signer and scheduler share the observer's state
    pub fn add_chain(
        &mut self,
        observer: ChainObserver,
        tss: Arc<dyn TssSigner>,
        scheduler: SchedulerConfig,
        tracker: TrackerConfig,
    ) -> Result<()> {
        let chain_id = observer.chain_id();
        if self.chains.iter().any(|c| c.chain_id() == chain_id) {
            return Err(eyre!("chain {} registered twice", chain_id));
        }

        let observer = Arc::new(observer);
        let signer = Arc::new(Signer::for_observer(
            &observer,
            tss,
            tracker,
            self.shutdown.clone(),
        ));
        let scheduler = Arc::new(OutboundScheduler::new(
            Arc::clone(&observer),
            Arc::clone(&signer),
            scheduler,
        ));
        self.chains.push(Arc::new(ChainRuntime {
            observer,
            signer,
            scheduler,
        }));
        Ok(())
    }

    pub fn chains(&self) -> &[Arc<ChainRuntime>] {
        &self.chains
    }

    /// Shared state of every chain, for the status API
    pub fn states(&self) -> Vec<Arc<ChainState>> {
        self.chains
            .iter()
            .map(|c| Arc::clone(c.observer.state()))
            .collect()
    }

    /// Fetch chain params and resume points for every chain, concurrently
    pub async fn start(&self) -> Result<()> {
        try_join_all(self.chains.iter().map(|chain| Self::prepare(chain))).await?;
        Ok(())
    }

    async fn prepare(chain: &ChainRuntime) -> Result<()> {
        let chain_id = chain.chain_id();
        let params = chain.observer.refresh_chain_params().await?;
        chain.signer.set_contracts(&params)?;
        let last_scanned = chain
            .observer
            .load_last_block_scanned()
            .await
            .wrap_err_with(|| format!("error preparing chain {}", chain_id))?;
        metrics::record_blocks_scanned(chain_id, 0, last_scanned);
        info!(
            chain_id,
            name = chain.observer.state().name(),
            last_scanned,
            supported = params.is_supported,
            "Chain prepared"
        );
        Ok(())
    }

    /// Run all chain tasks until shutdown or until one of them exits
    pub async fn run(self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(eyre!("no chains to observe"));
        }

        let mut join_set = JoinSet::new();
        for chain in &self.chains {
            for task in ChainTask::ALL {
                join_set.spawn(run_chain_task(Arc::clone(chain), task, self.shutdown.clone()));
            }
            join_set.spawn(run_scheduler(
                Arc::clone(chain),
                Arc::clone(&self.consensus),
                self.consensus_poll_interval,
                self.shutdown.clone(),
            ));
        }
        info!(
            chains = self.chains.len(),
            tasks = join_set.len(),
            "Orchestrator started"
        );

        let mut shutdown = self.shutdown.clone();
        let signalled = async {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        };

        tokio::select! {
            _ = signalled => {
                info!("Shutdown signal received, stopping chain tasks");
                join_set.abort_all();
                while join_set.join_next().await.is_some() {}
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A chain task exited unexpectedly without error");
                        Err(eyre!("chain task exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A chain task stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A chain task panicked: {:?}", e);
                        Err(eyre!("chain task panicked: {}", e))
                    }
                    None => {
                        error!("All chain tasks exited unexpectedly");
                        Err(eyre!("all chain tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
