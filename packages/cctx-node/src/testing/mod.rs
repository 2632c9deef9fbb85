//! In-memory fakes for the chain RPC, the consensus chain and the TSS
//!
//! Compiled for unit tests and behind the `testing` feature for the
//! integration tests in `tests/`.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use chrono::Utc;
use eyre::{eyre, Result};
use tokio::sync::watch;

use crate::bounded_cache::CacheConfig;
use crate::chain_config::{ChainConfig, ScanFrom};
use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use crate::compliance::ComplianceFilter;
use crate::config::{SchedulerConfig, TrackerConfig};
use crate::confirmation::InclusionVerifier;
use crate::consensus::{ConsensusClient, VoteReceipt};
use crate::contracts::ERC20Custody::{Deposited, Withdrawn};
use crate::observer::{ChainObserver, ChainState, ObserverDeps};
use crate::pending::PendingTxCache;
use crate::rpc::{ChainRpc, LogFilter, RpcBlock, RpcLog, RpcReceipt, RpcTransaction};
use crate::scheduler::OutboundScheduler;
use crate::signer::{BroadcastConfig, Signer};
use crate::tracker::TrackerReporter;
use crate::tss::TssSigner;
use crate::types::{
    ChainId, ChainParams, CctxStatus, CoinType, CrossChainTx, InboundParams, InboundTracker,
    OutboundParams, OutboundTracker, ProtocolContractVersion, RevertOptions, Status, TrackerHash,
};
use crate::vote::{InboundVote, OutboundVote};

pub use crate::tss::LocalTssSigner;

/// Chain the harnesses observe
pub const CHAIN_ID: ChainId = 1337;
/// Chain inbound votes are credited to
pub const CONSENSUS_CHAIN_ID: ChainId = 7000;

/// Private key 1, a well-known devnet key
pub const TSS_PRIVATE_KEY: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000001";
/// Address of [`TSS_PRIVATE_KEY`]
pub const TSS: Address = address!("7e5f4552091a69125d5dfcb7b8c2659029395bdf");

pub const CUSTODY: Address = Address::repeat_byte(0xcc);
pub const CONNECTOR: Address = Address::repeat_byte(0xdd);
pub const GATEWAY: Address = Address::repeat_byte(0xee);

pub fn tss_signer() -> LocalTssSigner {
    LocalTssSigner::from_private_key(TSS_PRIVATE_KEY).unwrap()
}

fn block_hash(number: u64) -> B256 {
    keccak256(number.to_be_bytes())
}

fn now_secs() -> u64 {
    Utc::now().timestamp() as u64
}

// ---------------------------------------------------------------------------
// Transactions and logs
// ---------------------------------------------------------------------------

/// Builder for [`RpcTransaction`] fixtures. Pending unless `block` is set.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    tx: RpcTransaction,
}

impl TxBuilder {
    pub fn new(hash: B256) -> Self {
        Self {
            tx: RpcTransaction {
                hash,
                from: Address::repeat_byte(0x01),
                to: None,
                nonce: 0,
                value: U256::ZERO,
                input: Bytes::new(),
                gas: 21_000,
                gas_price: Some(1_000_000_000),
                block_number: None,
                transaction_index: None,
            },
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.tx.from = from;
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.tx.to = Some(to);
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.tx.nonce = nonce;
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.tx.value = value;
        self
    }

    pub fn input(mut self, input: impl Into<Bytes>) -> Self {
        self.tx.input = input.into();
        self
    }

    pub fn gas(mut self, gas: u64) -> Self {
        self.tx.gas = gas;
        self
    }

    pub fn gas_price(mut self, gas_price: u128) -> Self {
        self.tx.gas_price = Some(gas_price);
        self
    }

    /// Mark the transaction mined at (block, index)
    pub fn block(mut self, number: u64, index: u64) -> Self {
        self.tx.block_number = Some(number);
        self.tx.transaction_index = Some(index);
        self
    }

    pub fn build(self) -> RpcTransaction {
        self.tx
    }
}

/// Receipt of a transaction mined at (block, index)
pub fn receipt(hash: B256, block: u64, index: u64, status: bool) -> RpcReceipt {
    RpcReceipt {
        transaction_hash: hash,
        block_number: block,
        block_hash: block_hash(block),
        transaction_index: index,
        status,
        gas_used: 21_000,
        effective_gas_price: Some(1_000_000_000),
        logs: vec![],
    }
}

/// Log carrying `event` as emitted by `emitter`
pub fn event_log<E: SolEvent>(
    event: &E,
    emitter: Address,
    tx_hash: B256,
    block: u64,
    tx_index: u64,
    log_index: u64,
) -> RpcLog {
    let data = event.encode_log_data();
    RpcLog {
        address: emitter,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number: block,
        transaction_hash: tx_hash,
        transaction_index: tx_index,
        log_index,
        removed: false,
    }
}

/// Custody `Deposited` log of 1000 units of token 0xa5..a5
pub fn deposited_log(
    emitter: Address,
    tx_hash: B256,
    block: u64,
    tx_index: u64,
    log_index: u64,
    message: &[u8],
) -> RpcLog {
    let event = Deposited {
        recipient: Bytes::copy_from_slice(Address::repeat_byte(0x33).as_slice()),
        asset: Address::repeat_byte(0xa5),
        amount: U256::from(1_000u64),
        message: Bytes::copy_from_slice(message),
    };
    event_log(&event, emitter, tx_hash, block, tx_index, log_index)
}

/// Custody `Withdrawn` log
pub fn withdrawn_log(
    emitter: Address,
    tx_hash: B256,
    block: u64,
    recipient: Address,
    asset: Address,
    amount: U256,
) -> RpcLog {
    let event = Withdrawn {
        recipient,
        asset,
        amount,
    };
    event_log(&event, emitter, tx_hash, block, 0, 0)
}

/// Pending outbound CCTX for `chain` with one outbound attempt
pub fn sample_cctx(chain: ChainId, nonce: u64, coin_type: CoinType) -> CrossChainTx {
    let sender = Address::repeat_byte(0x11).to_string();
    let index = keccak256(format!("cctx-{}-{}", chain, nonce));
    CrossChainTx {
        index: index.to_string(),
        creator: "zeta1creator".to_string(),
        relayed_message: String::new(),
        cctx_status: Status {
            status: CctxStatus::PendingOutbound,
            status_message: String::new(),
        },
        inbound_params: InboundParams {
            sender: sender.clone(),
            sender_chain_id: CONSENSUS_CHAIN_ID,
            tx_origin: sender,
            coin_type,
            asset: match coin_type {
                CoinType::Erc20 => Address::repeat_byte(0xa5).to_string(),
                _ => String::new(),
            },
            amount: "1000000".to_string(),
            observed_hash: B256::repeat_byte(0x77).to_string(),
            observed_external_height: 10,
            event_index: 0,
            gas_limit: 0,
        },
        outbound_params: vec![OutboundParams {
            receiver: Address::repeat_byte(0x22).to_string(),
            receiver_chain_id: chain,
            amount: "1000000".to_string(),
            tss_nonce: nonce,
            gas_limit: 250_000,
            gas_price: "20000000000".to_string(),
            gas_priority_fee: String::new(),
            hash: String::new(),
            tss_pubkey: String::new(),
        }],
        revert_options: RevertOptions::default(),
        protocol_contract_version: ProtocolContractVersion::V2,
    }
}

/// Chain params pointing at the fixture contracts
pub fn chain_params(chain: ChainId) -> ChainParams {
    let mut params = ChainParams::default_for(chain);
    params.erc20_custody_contract_address = CUSTODY.to_string();
    params.connector_contract_address = CONNECTOR.to_string();
    params.gateway_address = GATEWAY.to_string();
    params
}

// ---------------------------------------------------------------------------
// Chain RPC
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChainData {
    block_number: u64,
    blocks: HashMap<u64, RpcBlock>,
    timestamps: HashMap<u64, u64>,
    transactions: HashMap<B256, RpcTransaction>,
    receipts: HashMap<B256, RpcReceipt>,
    logs: Vec<RpcLog>,
    send_errors: VecDeque<String>,
    sent: Vec<Vec<u8>>,
    gas_price: u128,
    unavailable: bool,
}

/// Scriptable chain. Heights up to the head without an explicit block
/// serve an empty block.
#[derive(Default)]
pub struct MockChainRpc {
    data: Mutex<ChainData>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        let rpc = Self::default();
        rpc.set_gas_price(1_000_000_000);
        rpc
    }

    fn data(&self) -> std::sync::MutexGuard<'_, ChainData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_block_number(&self, number: u64) {
        self.data().block_number = number;
    }

    pub fn set_block_timestamp(&self, number: u64, timestamp: u64) {
        let mut data = self.data();
        data.timestamps.insert(number, timestamp);
        if let Some(block) = data.blocks.get_mut(&number) {
            block.timestamp = timestamp;
        }
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.data().gas_price = gas_price;
    }

    /// Make every call fail until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.data().unavailable = unavailable;
    }

    /// Add (or replace) block `number`. Its transactions become queryable.
    pub fn add_block(&self, number: u64, transactions: Vec<RpcTransaction>) {
        let mut data = self.data();
        for tx in &transactions {
            data.transactions.insert(tx.hash, tx.clone());
        }
        let timestamp = data.timestamps.get(&number).copied().unwrap_or_else(now_secs);
        data.blocks.insert(
            number,
            RpcBlock {
                number,
                hash: block_hash(number),
                timestamp,
                transactions,
            },
        );
    }

    pub fn add_transaction(&self, tx: RpcTransaction) {
        self.data().transactions.insert(tx.hash, tx);
    }

    pub fn add_receipt(&self, receipt: RpcReceipt) {
        self.data().receipts.insert(receipt.transaction_hash, receipt);
    }

    /// Build a receipt without storing it
    pub fn receipt_for(&self, hash: B256, block: u64, index: u64, status: bool) -> RpcReceipt {
        receipt(hash, block, index, status)
    }

    pub fn add_receipt_for(&self, hash: B256, block: u64, index: u64, status: bool) {
        self.add_receipt(receipt(hash, block, index, status));
    }

    pub fn add_logs(&self, logs: Vec<RpcLog>) {
        self.data().logs.extend(logs);
    }

    /// Fail the next `send_raw_transaction` with `error`
    pub fn push_send_error(&self, error: &str) {
        self.data().send_errors.push_back(error.to_string());
    }

    /// Every raw transaction passed to `send_raw_transaction`
    pub fn sent_raw(&self) -> Vec<Vec<u8>> {
        self.data().sent.clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.data().unavailable {
            return Err(eyre!("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn block_number(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.data().block_number)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>> {
        self.check_available()?;
        let data = self.data();
        if let Some(block) = data.blocks.get(&number) {
            return Ok(Some(block.clone()));
        }
        if number > data.block_number {
            return Ok(None);
        }
        Ok(Some(RpcBlock {
            number,
            hash: block_hash(number),
            timestamp: data.timestamps.get(&number).copied().unwrap_or_else(now_secs),
            transactions: vec![],
        }))
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>> {
        self.check_available()?;
        Ok(self.data().transactions.get(&hash).cloned())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>> {
        self.check_available()?;
        Ok(self.data().receipts.get(&hash).cloned())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>> {
        self.check_available()?;
        Ok(self
            .data()
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.topics.first() == Some(&filter.topic0)
                    && log.block_number >= filter.from_block
                    && log.block_number <= filter.to_block
            })
            .cloned()
            .collect())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        self.check_available()?;
        let mut data = self.data();
        data.sent.push(raw.to_vec());
        match data.send_errors.pop_front() {
            Some(error) => Err(eyre!("{}", error)),
            None => Ok(keccak256(raw)),
        }
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        self.check_available()?;
        Ok(self.data().gas_price)
    }
}

// ---------------------------------------------------------------------------
// Consensus chain
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ConsensusData {
    height: u64,
    chain_params: HashMap<ChainId, ChainParams>,
    cctxs: BTreeMap<String, CrossChainTx>,
    outbound_trackers: BTreeMap<(ChainId, u64), Vec<TrackerHash>>,
    inbound_trackers: Vec<InboundTracker>,
    inbound_votes: Vec<InboundVote>,
    outbound_votes: Vec<OutboundVote>,
    ballots: Vec<String>,
    gas_prices: Vec<(ChainId, u128, u64)>,
    tracker_calls: usize,
    fail_votes: usize,
    fail_trackers: usize,
}

/// Consensus chain that records every write
#[derive(Default)]
pub struct MockConsensus {
    operator: String,
    data: Mutex<ConsensusData>,
}

impl MockConsensus {
    pub fn new() -> Self {
        Self {
            operator: "zeta1observer".to_string(),
            data: Mutex::default(),
        }
    }

    fn data(&self) -> std::sync::MutexGuard<'_, ConsensusData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_height(&self, height: u64) {
        self.data().height = height;
    }

    pub fn set_chain_params(&self, params: ChainParams) {
        self.data().chain_params.insert(params.chain_id, params);
    }

    /// Add or replace a CCTX by index
    pub fn add_cctx(&self, cctx: CrossChainTx) {
        self.data().cctxs.insert(cctx.index.clone(), cctx);
    }

    pub fn set_cctx_status(&self, index: &str, status: CctxStatus) {
        if let Some(cctx) = self.data().cctxs.get_mut(index) {
            cctx.cctx_status.status = status;
        }
    }

    /// Put `hash` on the outbound tracker of (chain, nonce)
    pub fn add_outbound_tracker_entry(&self, chain_id: ChainId, nonce: u64, hash: B256) {
        self.data()
            .outbound_trackers
            .entry((chain_id, nonce))
            .or_default()
            .push(TrackerHash {
                tx_hash: hash.to_string(),
                tx_signer: self.operator.clone(),
                proved: false,
            });
    }

    pub fn add_inbound_tracker(&self, tracker: InboundTracker) {
        self.data().inbound_trackers.push(tracker);
    }

    /// Fail the next `n` vote posts
    pub fn fail_next_votes(&self, n: usize) {
        self.data().fail_votes = n;
    }

    /// Fail the next `n` tracker additions
    pub fn fail_next_trackers(&self, n: usize) {
        self.data().fail_trackers = n;
    }

    /// Successfully posted inbound votes, in order
    pub fn inbound_votes(&self) -> Vec<InboundVote> {
        self.data().inbound_votes.clone()
    }

    pub fn outbound_votes(&self) -> Vec<OutboundVote> {
        self.data().outbound_votes.clone()
    }

    /// Distinct ballots cast
    pub fn ballots(&self) -> Vec<String> {
        self.data().ballots.clone()
    }

    pub fn gas_prices(&self) -> Vec<(ChainId, u128, u64)> {
        self.data().gas_prices.clone()
    }

    pub fn tracker_hashes(&self, chain_id: ChainId, nonce: u64) -> Vec<String> {
        self.data()
            .outbound_trackers
            .get(&(chain_id, nonce))
            .map(|hashes| hashes.iter().map(|h| h.tx_hash.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of `add_outbound_tracker` calls, including duplicates
    pub fn tracker_calls(&self) -> usize {
        self.data().tracker_calls
    }

    fn take_vote_failure(data: &mut ConsensusData) -> Result<()> {
        if data.fail_votes > 0 {
            data.fail_votes -= 1;
            return Err(eyre!("consensus broadcast failed: account sequence mismatch"));
        }
        Ok(())
    }

    /// Record `ballot`, returning an empty tx hash if it was already cast
    fn cast(data: &mut ConsensusData, ballot: String) -> VoteReceipt {
        if data.ballots.contains(&ballot) {
            return VoteReceipt {
                tx_hash: String::new(),
                ballot,
            };
        }
        data.ballots.push(ballot.clone());
        VoteReceipt {
            tx_hash: keccak256(ballot.as_bytes()).to_string(),
            ballot,
        }
    }
}

#[async_trait]
impl ConsensusClient for MockConsensus {
    fn operator_address(&self) -> &str {
        &self.operator
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(self.data().height)
    }

    async fn chain_params(&self, chain_id: ChainId) -> Result<ChainParams> {
        Ok(self
            .data()
            .chain_params
            .get(&chain_id)
            .cloned()
            .unwrap_or_else(|| ChainParams::default_for(chain_id)))
    }

    async fn pending_cctxs(&self, chain_id: ChainId) -> Result<Vec<CrossChainTx>> {
        let mut pending: Vec<_> = self
            .data()
            .cctxs
            .values()
            .filter(|cctx| match cctx.status() {
                CctxStatus::PendingRevert => cctx.inbound_params.sender_chain_id == chain_id,
                CctxStatus::PendingOutbound => cctx
                    .current_outbound()
                    .map(|p| p.receiver_chain_id == chain_id)
                    .unwrap_or(false),
                _ => false,
            })
            .cloned()
            .collect();
        pending.sort_by_key(|cctx| cctx.nonce().unwrap_or(u64::MAX));
        Ok(pending)
    }

    async fn cctx(&self, index: &str) -> Result<CrossChainTx> {
        self.data()
            .cctxs
            .get(index)
            .cloned()
            .ok_or_else(|| eyre!("cctx {} not found", index))
    }

    async fn outbound_trackers(&self, chain_id: ChainId) -> Result<Vec<OutboundTracker>> {
        Ok(self
            .data()
            .outbound_trackers
            .iter()
            .filter(|((chain, _), _)| *chain == chain_id)
            .map(|(&(chain_id, nonce), hashes)| OutboundTracker {
                index: format!("{}-{}", chain_id, nonce),
                chain_id,
                nonce,
                hash_list: hashes.clone(),
            })
            .collect())
    }

    async fn inbound_trackers(&self, chain_id: ChainId) -> Result<Vec<InboundTracker>> {
        Ok(self
            .data()
            .inbound_trackers
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn post_vote_inbound(&self, vote: &InboundVote) -> Result<VoteReceipt> {
        let mut data = self.data();
        Self::take_vote_failure(&mut data)?;
        data.inbound_votes.push(vote.clone());
        Ok(Self::cast(&mut data, vote.digest()))
    }

    async fn post_vote_outbound(&self, vote: &OutboundVote) -> Result<VoteReceipt> {
        let mut data = self.data();
        Self::take_vote_failure(&mut data)?;
        data.outbound_votes.push(vote.clone());
        Ok(Self::cast(&mut data, vote.digest()))
    }

    async fn add_outbound_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx_hash: &str,
        _proof: Option<&str>,
    ) -> Result<String> {
        let mut data = self.data();
        data.tracker_calls += 1;
        if data.fail_trackers > 0 {
            data.fail_trackers -= 1;
            return Err(eyre!("consensus broadcast failed"));
        }

        let operator = self.operator.clone();
        let hashes = data.outbound_trackers.entry((chain_id, nonce)).or_default();
        if hashes.iter().any(|h| h.tx_hash.eq_ignore_ascii_case(tx_hash)) {
            return Ok(String::new());
        }
        hashes.push(TrackerHash {
            tx_hash: tx_hash.to_string(),
            tx_signer: operator,
            proved: false,
        });
        Ok(keccak256(format!("tracker-{}-{}-{}", chain_id, nonce, tx_hash)).to_string())
    }

    async fn post_gas_price(&self, chain_id: ChainId, gas_price: u128, block: u64) -> Result<String> {
        let mut data = self.data();
        data.gas_prices.push((chain_id, gas_price, block));
        Ok(keccak256(format!("gas-{}-{}", chain_id, block)).to_string())
    }
}

// ---------------------------------------------------------------------------
// Observer harnesses
// ---------------------------------------------------------------------------

pub fn chain_config(chain_id: ChainId, scan_from: Option<ScanFrom>) -> ChainConfig {
    ChainConfig {
        name: format!("chain-{}", chain_id),
        chain_id,
        rpc_urls: vec!["http://localhost:8545".to_string()],
        scan_from,
        ..Default::default()
    }
}

pub fn observer_deps(
    consensus: Arc<MockConsensus>,
    store: Arc<MemoryCheckpointStore>,
    compliance: ComplianceFilter,
) -> ObserverDeps {
    ObserverDeps {
        consensus,
        checkpoints: store,
        compliance: Arc::new(compliance),
        tss_address: TSS,
        consensus_chain_id: CONSENSUS_CHAIN_ID,
        cache: CacheConfig::default(),
    }
}

pub fn observer_for(
    chain_id: ChainId,
    rpc: Arc<MockChainRpc>,
    consensus: Arc<MockConsensus>,
    store: Arc<MemoryCheckpointStore>,
    scan_from: Option<ScanFrom>,
) -> ChainObserver {
    ChainObserver::new(
        chain_config(chain_id, scan_from),
        rpc,
        observer_deps(consensus, store, ComplianceFilter::default()),
    )
}

/// Observer on [`CHAIN_ID`] with the fixture contracts, resuming from a
/// given scanned height
pub struct InboundHarness {
    pub rpc: Arc<MockChainRpc>,
    pub consensus: Arc<MockConsensus>,
    pub store: Arc<MemoryCheckpointStore>,
    pub observer: ChainObserver,
}

impl InboundHarness {
    /// Head at `last_scanned + head_offset`, 12 confirmations, 100-block batches
    pub async fn new(last_scanned: u64, head_offset: u64) -> Self {
        Self::with_batch(last_scanned, head_offset, 100).await
    }

    pub async fn with_batch(last_scanned: u64, head_offset: u64, batch: u64) -> Self {
        Self::build(last_scanned, head_offset, batch, ComplianceFilter::default()).await
    }

    pub async fn with_compliance(
        last_scanned: u64,
        head_offset: u64,
        compliance: ComplianceFilter,
    ) -> Self {
        Self::build(last_scanned, head_offset, 100, compliance).await
    }

    async fn build(
        last_scanned: u64,
        head_offset: u64,
        batch: u64,
        compliance: ComplianceFilter,
    ) -> Self {
        let rpc = Arc::new(MockChainRpc::new());
        rpc.set_block_number(last_scanned + head_offset);
        let consensus = Arc::new(MockConsensus::new());
        consensus.set_chain_params(chain_params(CHAIN_ID));
        let store = Arc::new(MemoryCheckpointStore::with_checkpoint(CHAIN_ID, last_scanned));

        let mut config = chain_config(CHAIN_ID, None);
        config.max_blocks_per_batch = batch;
        let observer = ChainObserver::new(
            config,
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            observer_deps(Arc::clone(&consensus), Arc::clone(&store), compliance),
        );
        observer.refresh_chain_params().await.unwrap();
        observer.load_last_block_scanned().await.unwrap();

        Self {
            rpc,
            consensus,
            store,
            observer,
        }
    }

    pub async fn store_checkpoint(&self) -> Option<u64> {
        self.store.load(CHAIN_ID).await.unwrap()
    }
}

/// Observer whose chain params point at the fixture contracts, for
/// outbound watching
pub struct OutboundHarness {
    pub rpc: Arc<MockChainRpc>,
    pub consensus: Arc<MockConsensus>,
    pub observer: ChainObserver,
}

impl OutboundHarness {
    pub fn new(chain_id: ChainId) -> Self {
        Self::with_compliance(chain_id, ComplianceFilter::default())
    }

    pub fn with_compliance(chain_id: ChainId, compliance: ComplianceFilter) -> Self {
        let rpc = Arc::new(MockChainRpc::new());
        let consensus = Arc::new(MockConsensus::new());
        consensus.set_chain_params(chain_params(chain_id));
        let observer = ChainObserver::new(
            chain_config(chain_id, None),
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            observer_deps(
                Arc::clone(&consensus),
                Arc::new(MemoryCheckpointStore::new()),
                compliance,
            ),
        );
        observer.state().set_params(chain_params(chain_id));
        Self {
            rpc,
            consensus,
            observer,
        }
    }
}

// ---------------------------------------------------------------------------
// TSS and signer
// ---------------------------------------------------------------------------

/// Signs with one key while claiming another address
pub struct MismatchedTss {
    inner: LocalTssSigner,
    claimed: Address,
}

impl MismatchedTss {
    pub fn new(inner: LocalTssSigner, claimed: Address) -> Self {
        Self { inner, claimed }
    }
}

#[async_trait]
impl TssSigner for MismatchedTss {
    async fn sign(&self, digest: B256, height: u64, nonce: u64, chain_id: ChainId) -> Result<[u8; 65]> {
        self.inner.sign(digest, height, nonce, chain_id).await
    }

    fn evm_address(&self) -> Address {
        self.claimed
    }
}

/// TSS that is never reachable
pub struct UnavailableTss;

#[async_trait]
impl TssSigner for UnavailableTss {
    async fn sign(&self, _: B256, _: u64, _: u64, _: ChainId) -> Result<[u8; 65]> {
        Err(eyre!("keysign daemon unreachable"))
    }

    fn evm_address(&self) -> Address {
        TSS
    }
}

pub fn fast_broadcast() -> BroadcastConfig {
    BroadcastConfig {
        initial_backoff: Duration::ZERO,
        ..Default::default()
    }
}

pub fn fast_tracker() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_secs(5),
    }
}

/// Signer on [`CHAIN_ID`] with the fixture contracts
pub struct SignerHarness {
    pub rpc: Arc<MockChainRpc>,
    pub consensus: Arc<MockConsensus>,
    pub signer: Signer,
    pub shutdown: watch::Sender<bool>,
}

impl SignerHarness {
    pub fn new() -> Self {
        Self::with_tss(Arc::new(tss_signer()))
    }

    pub fn with_tss(tss: Arc<dyn TssSigner>) -> Self {
        let rpc = Arc::new(MockChainRpc::new());
        let consensus = Arc::new(MockConsensus::new());
        let state = Arc::new(ChainState::new(CHAIN_ID, "test", chain_params(CHAIN_ID)));
        let inclusion = Arc::new(InclusionVerifier::new(
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            &CacheConfig::default(),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let tracker = TrackerReporter::new(
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            Arc::clone(&consensus) as Arc<dyn ConsensusClient>,
            state,
            inclusion,
            fast_tracker(),
            shutdown_rx,
        );
        let signer = Signer::new(
            CHAIN_ID,
            Arc::clone(&rpc) as Arc<dyn ChainRpc>,
            tss,
            Arc::new(PendingTxCache::new()),
            Arc::new(ComplianceFilter::default()),
            tracker,
        )
        .with_broadcast_config(fast_broadcast());
        signer.set_contracts(&chain_params(CHAIN_ID)).unwrap();

        Self {
            rpc,
            consensus,
            signer,
            shutdown,
        }
    }
}

impl Default for SignerHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler over an observer and signer on [`CHAIN_ID`]
pub struct SchedulerHarness {
    pub rpc: Arc<MockChainRpc>,
    pub consensus: Arc<MockConsensus>,
    pub observer: Arc<ChainObserver>,
    pub signer: Arc<Signer>,
    pub scheduler: OutboundScheduler,
    pub shutdown: watch::Sender<bool>,
}

impl SchedulerHarness {
    /// Chain-param lookahead and lookback with an optional interval override
    pub async fn new(interval: Option<u64>) -> Self {
        Self::with_config(SchedulerConfig {
            lookahead: None,
            lookback: None,
            interval,
        })
        .await
    }

    pub async fn with_config(config: SchedulerConfig) -> Self {
        Self::with_tss(config, Arc::new(tss_signer())).await
    }

    pub async fn with_tss(config: SchedulerConfig, tss: Arc<dyn TssSigner>) -> Self {
        let h = OutboundHarness::new(CHAIN_ID);
        let observer = Arc::new(h.observer);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let signer = Arc::new(
            Signer::for_observer(&observer, tss, fast_tracker(), shutdown_rx)
                .with_broadcast_config(fast_broadcast()),
        );
        signer.set_contracts(&observer.state().params()).unwrap();
        let scheduler = OutboundScheduler::new(Arc::clone(&observer), Arc::clone(&signer), config);

        Self {
            rpc: h.rpc,
            consensus: h.consensus,
            observer,
            signer,
            scheduler,
            shutdown,
        }
    }
}
