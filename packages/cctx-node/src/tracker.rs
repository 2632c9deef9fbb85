//! Outbound tracker reporting
//!
//! After a broadcast the signer hands the hash to [`TrackerReporter::report`],
//! which spawns one task per hash. The task waits until the transaction is
//! mined, included where its receipt says and confirmed, then adds the hash
//! to the consensus outbound tracker. A hash already being reported is not
//! reported twice.

use std::sync::Arc;

use alloy::primitives::B256;
use eyre::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::confirmation::{check_confirmations, ConfirmationResult, InclusionVerifier};
use crate::consensus::ConsensusClient;
use crate::guard::InFlightSet;
use crate::metrics;
use crate::observer::ChainState;
use crate::rpc::ChainRpc;
use crate::types::ChainId;

/// How a reporting task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// Hash added to the tracker; carries the consensus tx hash
    Reported(String),
    /// Consensus already had the hash
    AlreadyTracked,
    /// Not confirmed within the tracker timeout
    Timeout,
    Shutdown,
}

impl TrackerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerOutcome::Reported(_) => "reported",
            TrackerOutcome::AlreadyTracked => "already_tracked",
            TrackerOutcome::Timeout => "timeout",
            TrackerOutcome::Shutdown => "shutdown",
        }
    }
}

#[derive(Clone)]
pub struct TrackerReporter {
    chain_id: ChainId,
    rpc: Arc<dyn ChainRpc>,
    consensus: Arc<dyn ConsensusClient>,
    state: Arc<ChainState>,
    inclusion: Arc<InclusionVerifier>,
    config: TrackerConfig,
    reporting: InFlightSet<B256>,
    shutdown: watch::Receiver<bool>,
}

impl TrackerReporter {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        consensus: Arc<dyn ConsensusClient>,
        state: Arc<ChainState>,
        inclusion: Arc<InclusionVerifier>,
        config: TrackerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chain_id: state.chain_id(),
            rpc,
            consensus,
            state,
            inclusion,
            config,
            reporting: InFlightSet::new(),
            shutdown,
        }
    }

    /// Whether a task is currently reporting `tx_hash`
    pub fn is_reporting(&self, tx_hash: &B256) -> bool {
        self.reporting.contains(tx_hash)
    }

    /// Spawn the reporting task for `tx_hash`.
    ///
    /// Returns `None` without spawning if the hash is already being reported.
    pub fn report(&self, nonce: u64, tx_hash: B256) -> Option<JoinHandle<TrackerOutcome>> {
        let Some(guard) = self.reporting.try_acquire(tx_hash) else {
            debug!(chain_id = self.chain_id, nonce, tx_hash = %tx_hash, "Hash already being reported");
            return None;
        };

        let reporter = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            let outcome = reporter.run(nonce, tx_hash).await;
            metrics::record_tracker_report(reporter.chain_id, outcome.as_str());
            outcome
        }))
    }

    async fn run(&self, nonce: u64, tx_hash: B256) -> TrackerOutcome {
        let chain_id = self.chain_id;
        let deadline = Instant::now() + self.config.timeout;
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                return TrackerOutcome::Shutdown;
            }

            match self.poll_once(nonce, tx_hash).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(e) => {
                    warn!(chain_id, nonce, tx_hash = %tx_hash, error = %e, "Tracker poll failed");
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    chain_id,
                    nonce,
                    tx_hash = %tx_hash,
                    timeout_secs = self.config.timeout.as_secs(),
                    "Outbound not confirmed before tracker timeout"
                );
                return TrackerOutcome::Timeout;
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return TrackerOutcome::Shutdown;
                    }
                }
            }
        }
    }

    /// One pass over the reporting states. `None` means not yet.
    async fn poll_once(&self, nonce: u64, tx_hash: B256) -> Result<Option<TrackerOutcome>> {
        let chain_id = self.chain_id;

        let Some(tx) = self.rpc.transaction_by_hash(tx_hash).await? else {
            debug!(chain_id, nonce, tx_hash = %tx_hash, "Outbound not found yet");
            return Ok(None);
        };
        if tx.is_pending() {
            return Ok(None);
        }
        let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? else {
            return Ok(None);
        };

        if let Err(e) = self.inclusion.check_tx_inclusion(tx_hash, &receipt).await {
            warn!(chain_id, nonce, tx_hash = %tx_hash, error = %e, "Outbound inclusion check failed");
            return Ok(None);
        }

        let height = self.rpc.block_number().await?;
        let confirmations = self.state.params().confirmation_count;
        if let ConfirmationResult::WaitingConfirmations(remaining) =
            check_confirmations(&receipt, height, confirmations)
        {
            debug!(
                chain_id,
                nonce,
                tx_hash = %tx_hash,
                receipt_block = receipt.block_number,
                remaining,
                "Outbound included, waiting for confirmations"
            );
            return Ok(None);
        }

        let consensus_tx = self
            .consensus
            .add_outbound_tracker(chain_id, nonce, &tx_hash.to_string(), None)
            .await?;
        if consensus_tx.is_empty() {
            info!(chain_id, nonce, tx_hash = %tx_hash, "Outbound already tracked");
            return Ok(Some(TrackerOutcome::AlreadyTracked));
        }

        info!(chain_id, nonce, tx_hash = %tx_hash, consensus_tx = %consensus_tx, "Added outbound tracker");
        Ok(Some(TrackerOutcome::Reported(consensus_tx)))
    }
}
