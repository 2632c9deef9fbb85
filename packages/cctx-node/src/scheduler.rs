//! Outbound scheduling
//!
//! Runs once per consensus block. Walks the pending queue of the chain in
//! nonce order and, per CCTX, either votes an outbound that is already
//! confirmed or decides whether this block is the one to (re)try signing
//! it. Observers spread work across blocks by matching the nonce against
//! the height modulo a retry interval.

use std::collections::HashSet;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::guard::InFlightSet;
use crate::metrics;
use crate::observer::ChainObserver;
use crate::signer::{ProcessOutcome, Signer};
use crate::types::{ChainId, CrossChainTx};

/// Retry interval of a critical nonce, in consensus blocks
pub const CRITICAL_INTERVAL: u64 = 10;

/// Tracked nonces among the next [`CRITICAL_WINDOW`] that make the first
/// pending nonce critical
pub const CRITICAL_TRACKED_THRESHOLD: usize = 5;
pub const CRITICAL_WINDOW: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("nonce {nonce} is too far ahead of first pending nonce {first} (lookback {lookback})")]
    NonceGap { nonce: u64, first: u64, lookback: u64 },
}

/// Blocks between signing attempts for `nonce`.
///
/// A tracked nonce already has a broadcast hash, so it backs off to twice
/// the base interval. The first pending nonce is critical when at least
/// [`CRITICAL_TRACKED_THRESHOLD`] of the nonces after it are tracked, as
/// the queue is stuck behind it.
pub fn retry_interval(base: u64, nonce: u64, is_first: bool, tracked: &HashSet<u64>) -> u64 {
    let base = base.max(1);

    if tracked.contains(&nonce) {
        return base.saturating_mul(2);
    }

    if is_first {
        let following = (nonce + 1..=nonce + CRITICAL_WINDOW)
            .filter(|n| tracked.contains(n))
            .count();
        if following >= CRITICAL_TRACKED_THRESHOLD {
            return base.min(CRITICAL_INTERVAL);
        }
    }

    base
}

/// Whether `height` is this nonce's turn
pub fn should_dispatch(nonce: u64, height: u64, interval: u64) -> bool {
    let interval = interval.max(1);
    nonce % interval == height % interval
}

/// What one scheduling tick did
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// CCTXs looked at
    pub considered: usize,
    /// Nonces whose outbound vote was posted
    pub voted: Vec<u64>,
    /// Nonces handed to a signing task
    pub dispatched: Vec<u64>,
    pub tasks: Vec<JoinHandle<()>>,
}

pub struct OutboundScheduler {
    observer: Arc<ChainObserver>,
    signer: Arc<Signer>,
    config: SchedulerConfig,
    signing: InFlightSet<u64>,
}

impl OutboundScheduler {
    pub fn new(observer: Arc<ChainObserver>, signer: Arc<Signer>, config: SchedulerConfig) -> Self {
        Self {
            observer,
            signer,
            config,
            signing: InFlightSet::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.observer.chain_id()
    }

    /// Whether a signing task currently owns `nonce`
    pub fn is_signing(&self, nonce: u64) -> bool {
        self.signing.contains(&nonce)
    }

    /// Schedule outbounds for consensus block `height`.
    ///
    /// Signing runs in spawned tasks; the tick never waits for them.
    pub async fn schedule_outbound(&self, height: u64) -> Result<ScheduleReport> {
        let chain_id = self.chain_id();
        let params = self.observer.refresh_chain_params().await?;
        self.signer.set_contracts(&params)?;

        let consensus = self.observer.consensus();
        let cctxs = consensus
            .pending_cctxs(chain_id)
            .await
            .wrap_err_with(|| format!("error fetching pending cctxs for chain {}", chain_id))?;
        let trackers = consensus
            .outbound_trackers(chain_id)
            .await
            .wrap_err_with(|| format!("error fetching outbound trackers for chain {}", chain_id))?;
        let tracked: HashSet<u64> = trackers
            .iter()
            .filter(|t| !t.hash_list.is_empty())
            .map(|t| t.nonce)
            .collect();

        let lookahead = self.config.lookahead.unwrap_or(params.outbound_schedule_lookahead);
        let lookback = self.config.lookback.unwrap_or(lookahead);
        let base_interval = self.config.interval.unwrap_or(params.outbound_schedule_interval);

        let mut report = ScheduleReport::default();
        let Some(first) = cctxs.first() else {
            return Ok(report);
        };
        let first_nonce = first.nonce()?;

        let pruned = self.observer.pending().prune_below(first_nonce);
        if pruned > 0 {
            debug!(chain_id, first_nonce, pruned, "Pruned settled outbound cache entries");
        }

        for (i, cctx) in cctxs.iter().enumerate() {
            let nonce = cctx.nonce()?;
            report.considered += 1;

            if nonce > first_nonce.saturating_add(lookback) {
                error!(chain_id, nonce, first_nonce, lookback, "Nonce gap in pending queue");
                return Err(ScheduleError::NonceGap {
                    nonce,
                    first: first_nonce,
                    lookback,
                }
                .into());
            }

            if self.observer.pending().is_confirmed(nonce) {
                match self.observer.vote_outbound_if_confirmed(cctx).await {
                    Ok(true) => report.voted.push(nonce),
                    Ok(false) => {}
                    Err(e) => {
                        error!(chain_id, nonce, cctx = %cctx.index, error = %e, "Error voting confirmed outbound");
                    }
                }
            } else if self.signing.contains(&nonce) {
                debug!(chain_id, nonce, "Outbound already being signed");
            } else {
                let interval = retry_interval(base_interval, nonce, i == 0, &tracked);
                if should_dispatch(nonce, height, interval) {
                    if let Some(task) = self.dispatch(cctx.clone(), nonce, height) {
                        report.dispatched.push(nonce);
                        report.tasks.push(task);
                    }
                }
            }

            if i as u64 >= lookahead.saturating_sub(1) {
                break;
            }
        }

        if !report.dispatched.is_empty() || !report.voted.is_empty() {
            info!(
                chain_id,
                height,
                pending = cctxs.len(),
                dispatched = ?report.dispatched,
                voted = ?report.voted,
                "Scheduled outbounds"
            );
        }
        Ok(report)
    }

    fn dispatch(&self, cctx: CrossChainTx, nonce: u64, height: u64) -> Option<JoinHandle<()>> {
        let guard = self.signing.try_acquire(nonce)?;
        let signer = Arc::clone(&self.signer);
        let chain_id = self.chain_id();
        metrics::record_dispatch(chain_id);

        Some(tokio::spawn(async move {
            let _guard = guard;
            match signer.try_process_outbound(&cctx, height).await {
                Ok(ProcessOutcome::Broadcast { tx_hash, outcome }) => {
                    debug!(chain_id, nonce, tx_hash = %tx_hash, outcome = outcome.as_str(), "Signing task finished");
                }
                Ok(ProcessOutcome::Skipped(reason)) => {
                    debug!(chain_id, nonce, ?reason, "Signing task skipped");
                }
                Err(e) => {
                    warn!(chain_id, nonce, cctx = %cctx.index, error = %e, "Signing task failed");
                }
            }
        }))
    }
}
