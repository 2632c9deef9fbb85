//! Per-chain observer
//!
//! Scans confirmed blocks for inbound deposits and votes them, watches
//! outbound trackers for mined TSS transactions, posts gas prices and
//! monitors RPC freshness. All mutable per-chain state lives in
//! [`ChainState`] behind accessor methods.

use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::bounded_cache::CacheConfig;
use crate::chain_config::{ChainConfig, ScanFrom};
use crate::checkpoint::CheckpointStore;
use crate::compliance::ComplianceFilter;
use crate::confirmation::InclusionVerifier;
use crate::consensus::ConsensusClient;
use crate::pending::PendingTxCache;
use crate::rpc::ChainRpc;
use crate::types::{ChainId, ChainParams};

pub mod events;
pub mod inbound;
pub mod outbound;

/// Latest block older than this marks the RPC stale
pub const RPC_STALE_THRESHOLD_SECS: i64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("block number should not decrease: current {current} last {last}")]
    HeightRegression { current: u64, last: u64 },

    #[error("invalid {what} contract address {address:?}")]
    InvalidContractAddress { what: &'static str, address: String },

    #[error("inbound {tx_hash} sent to {to:?}, not the TSS address")]
    NotToTss { tx_hash: String, to: Option<Address> },

    #[error("inbound {tx_hash} failed on chain")]
    FailedInbound { tx_hash: String },
}

/// Health of a chain's RPC endpoint as last observed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcStatus {
    pub healthy: bool,
    pub latest_block: u64,
    pub block_age_secs: i64,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for RpcStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            latest_block: 0,
            block_age_secs: 0,
            checked_at: None,
        }
    }
}

/// Serializable view of a chain, served by `/status`
#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub chain_id: ChainId,
    pub name: String,
    pub last_block: u64,
    pub last_block_scanned: u64,
    pub rpc: RpcStatus,
}

/// Mutable per-chain state shared by the observer, scheduler and signer
#[derive(Debug)]
pub struct ChainState {
    chain_id: ChainId,
    name: String,
    params: RwLock<ChainParams>,
    last_block: Mutex<u64>,
    last_block_scanned: Mutex<u64>,
    rpc_status: RwLock<RpcStatus>,
}

impl ChainState {
    pub fn new(chain_id: ChainId, name: &str, params: ChainParams) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            params: RwLock::new(params),
            last_block: Mutex::new(0),
            last_block_scanned: Mutex::new(0),
            rpc_status: RwLock::new(RpcStatus::default()),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> ChainParams {
        self.params.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_params(&self, params: ChainParams) {
        *self.params.write().unwrap_or_else(|e| e.into_inner()) = params;
    }

    pub fn last_block(&self) -> u64 {
        *self.last_block.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a freshly fetched chain height. Heights never go backwards.
    pub fn observe_block_height(&self, height: u64) -> Result<(), ObserverError> {
        let mut last = self.last_block.lock().unwrap_or_else(|e| e.into_inner());
        if height < *last {
            return Err(ObserverError::HeightRegression {
                current: height,
                last: *last,
            });
        }
        *last = height;
        Ok(())
    }

    pub fn last_block_scanned(&self) -> u64 {
        *self.last_block_scanned.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_last_block_scanned(&self, height: u64) {
        *self.last_block_scanned.lock().unwrap_or_else(|e| e.into_inner()) = height;
    }

    pub fn rpc_status(&self) -> RpcStatus {
        self.rpc_status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_rpc_status(&self, status: RpcStatus) {
        *self.rpc_status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn snapshot(&self) -> ChainStatus {
        ChainStatus {
            chain_id: self.chain_id,
            name: self.name.clone(),
            last_block: self.last_block(),
            last_block_scanned: self.last_block_scanned(),
            rpc: self.rpc_status(),
        }
    }
}

/// Shared collaborators of every chain observer
#[derive(Clone)]
pub struct ObserverDeps {
    pub consensus: Arc<dyn ConsensusClient>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub compliance: Arc<ComplianceFilter>,
    pub tss_address: Address,
    /// Chain inbound deposits are credited to
    pub consensus_chain_id: ChainId,
    pub cache: CacheConfig,
}

pub struct ChainObserver {
    config: ChainConfig,
    state: Arc<ChainState>,
    rpc: Arc<dyn ChainRpc>,
    consensus: Arc<dyn ConsensusClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    compliance: Arc<ComplianceFilter>,
    pending: Arc<PendingTxCache>,
    inclusion: Arc<InclusionVerifier>,
    tss_address: Address,
    consensus_chain_id: ChainId,
}

impl ChainObserver {
    pub fn new(config: ChainConfig, rpc: Arc<dyn ChainRpc>, deps: ObserverDeps) -> Self {
        let state = Arc::new(ChainState::new(
            config.chain_id,
            &config.name,
            config.initial_params(),
        ));
        let inclusion = Arc::new(InclusionVerifier::new(Arc::clone(&rpc), &deps.cache));

        Self {
            config,
            state,
            rpc,
            consensus: deps.consensus,
            checkpoints: deps.checkpoints,
            compliance: deps.compliance,
            pending: Arc::new(PendingTxCache::new()),
            inclusion,
            tss_address: deps.tss_address,
            consensus_chain_id: deps.consensus_chain_id,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<ChainState> {
        &self.state
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    pub fn consensus(&self) -> &Arc<dyn ConsensusClient> {
        &self.consensus
    }

    pub fn compliance(&self) -> &Arc<ComplianceFilter> {
        &self.compliance
    }

    pub fn pending(&self) -> &Arc<PendingTxCache> {
        &self.pending
    }

    pub fn inclusion(&self) -> &Arc<InclusionVerifier> {
        &self.inclusion
    }

    pub fn tss_address(&self) -> Address {
        self.tss_address
    }

    /// Fetch chain params from the consensus chain and apply local overrides
    pub async fn refresh_chain_params(&self) -> Result<ChainParams> {
        let fetched = self
            .consensus
            .chain_params(self.chain_id())
            .await
            .wrap_err_with(|| format!("error fetching chain params for chain {}", self.chain_id()))?;
        let params = self.config.apply_overrides(fetched);
        if params != self.state.params() {
            info!(chain_id = self.chain_id(), ?params, "Chain params updated");
        }
        self.state.set_params(params.clone());
        Ok(params)
    }

    /// Decide where inbound scanning resumes.
    ///
    /// A `CHAIN_{id}_SCAN_FROM_BLOCK` override wins over the stored
    /// checkpoint. `latest`, an override of 0 and a missing or zero
    /// checkpoint all start at the current chain height.
    pub async fn load_last_block_scanned(&self) -> Result<u64> {
        let stored = self
            .checkpoints
            .load(self.chain_id())
            .await
            .wrap_err_with(|| format!("error loading checkpoint for chain {}", self.chain_id()))?;

        let start = match self.config.scan_from {
            Some(ScanFrom::Latest) => None,
            Some(ScanFrom::Block(n)) => Some(n),
            None => stored,
        }
        .filter(|&h| h > 0);

        let height = match start {
            Some(h) => h,
            None => self
                .rpc
                .block_number()
                .await
                .wrap_err_with(|| format!("error getting block number for chain {}", self.chain_id()))?,
        };

        self.state.set_last_block_scanned(height);
        info!(
            chain_id = self.chain_id(),
            last_block_scanned = height,
            stored = ?stored,
            scan_from = ?self.config.scan_from,
            "Loaded last scanned block"
        );
        Ok(height)
    }
}

/// Parse a contract address from chain params. Empty or zero means the
/// category is not deployed on this chain.
pub fn contract_address(value: &str, what: &'static str) -> Result<Option<Address>, ObserverError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let address = Address::from_str(value).map_err(|_| ObserverError::InvalidContractAddress {
        what,
        address: value.to_string(),
    })?;
    Ok((address != Address::ZERO).then_some(address))
}
