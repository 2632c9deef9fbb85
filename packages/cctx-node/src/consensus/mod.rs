//! Consensus chain client interface
//!
//! The consensus chain tallies observer votes into ballots and owns every
//! CCTX. This node only reads CCTXs and trackers and posts votes; the
//! [`ConsensusClient`] trait is the whole surface it depends on.

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::types::{ChainId, ChainParams, CrossChainTx, InboundTracker, OutboundTracker};
use crate::vote::{InboundVote, OutboundVote};

pub mod http;

pub use http::HttpConsensusClient;

/// Result of posting a vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// Consensus chain tx hash (empty if the vote was already cast)
    pub tx_hash: String,
    /// Ballot identifier (the vote digest)
    pub ballot: String,
}

#[async_trait]
pub trait ConsensusClient: Send + Sync {
    /// Address votes are cast under
    fn operator_address(&self) -> &str;

    /// Latest consensus chain height
    async fn block_height(&self) -> Result<u64>;

    async fn chain_params(&self, chain_id: ChainId) -> Result<ChainParams>;

    /// Pending CCTXs for a destination chain, nonce-ascending
    async fn pending_cctxs(&self, chain_id: ChainId) -> Result<Vec<CrossChainTx>>;

    async fn cctx(&self, index: &str) -> Result<CrossChainTx>;

    async fn outbound_trackers(&self, chain_id: ChainId) -> Result<Vec<OutboundTracker>>;

    async fn inbound_trackers(&self, chain_id: ChainId) -> Result<Vec<InboundTracker>>;

    /// Post an inbound vote. Posting an identical vote twice returns the
    /// existing ballot without error.
    async fn post_vote_inbound(&self, vote: &InboundVote) -> Result<VoteReceipt>;

    /// Post an outbound vote; idempotent like [`Self::post_vote_inbound`]
    async fn post_vote_outbound(&self, vote: &OutboundVote) -> Result<VoteReceipt>;

    /// Add a candidate hash to the outbound tracker of (chain, nonce).
    /// Returns an empty string if the hash is already tracked.
    async fn add_outbound_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx_hash: &str,
        proof: Option<&str>,
    ) -> Result<String>;

    async fn post_gas_price(&self, chain_id: ChainId, gas_price: u128, block: u64)
        -> Result<String>;
}
