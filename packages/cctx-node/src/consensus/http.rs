//! Consensus chain client over the LCD REST gateway
//!
//! Queries go to the chain's LCD (gRPC-gateway) routes. Votes and tracker
//! updates are handed to a broadcaster service that holds the operator hot
//! key and wraps each message into a signed consensus chain transaction.

use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ConsensusClient, VoteReceipt};
use crate::types::{ChainId, ChainParams, CrossChainTx, InboundTracker, OutboundTracker};
use crate::vote::{InboundVote, OutboundVote};

/// Upper bound on pending CCTXs fetched per query
const PENDING_CCTX_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
struct LatestBlockResponse {
    block: LatestBlock,
}

#[derive(Debug, Deserialize)]
struct LatestBlock {
    header: LatestHeader,
}

#[derive(Debug, Deserialize)]
struct LatestHeader {
    height: String,
}

#[derive(Debug, Deserialize)]
struct ChainParamsResponse {
    chain_params: ChainParams,
}

#[derive(Debug, Deserialize)]
struct PendingCctxResponse {
    #[serde(rename = "CrossChainTx", default)]
    cross_chain_tx: Vec<CrossChainTx>,
}

#[derive(Debug, Deserialize)]
struct CctxResponse {
    #[serde(rename = "CrossChainTx")]
    cross_chain_tx: CrossChainTx,
}

#[derive(Debug, Deserialize)]
struct OutboundTrackerResponse {
    #[serde(rename = "outboundTracker", alias = "outTxTracker", default)]
    outbound_tracker: Vec<OutboundTracker>,
}

#[derive(Debug, Deserialize)]
struct InboundTrackerResponse {
    #[serde(rename = "inboundTracker", alias = "inTxTracker", default)]
    inbound_tracker: Vec<InboundTracker>,
}

/// Broadcaster response for any submitted message
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub tx_hash: String,
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub raw_log: Option<String>,
}

#[derive(Debug, Serialize)]
struct SignedVote<'a, T: Serialize> {
    digest: String,
    #[serde(flatten)]
    msg: &'a T,
}

#[derive(Debug, Serialize)]
struct AddOutboundTrackerMsg<'a> {
    creator: &'a str,
    chain_id: ChainId,
    nonce: u64,
    tx_hash: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GasPriceMsg<'a> {
    creator: &'a str,
    chain_id: ChainId,
    price: String,
    block_number: u64,
}

/// Broadcaster errors that mean this operator already cast the same vote
fn is_already_voted(raw_log: &str) -> bool {
    let lower = raw_log.to_lowercase();
    lower.contains("already voted") || lower.contains("has already voted")
}

/// Broadcaster errors that mean the tracker already holds the hash
fn is_already_tracked(raw_log: &str) -> bool {
    let lower = raw_log.to_lowercase();
    lower.contains("already exist") || lower.contains("hash already in tracker")
}

pub struct HttpConsensusClient {
    lcd_url: String,
    broadcast_url: String,
    operator_address: String,
    client: Client,
}

impl HttpConsensusClient {
    pub fn new(lcd_url: &str, broadcast_url: &str, operator_address: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        info!(
            lcd_url = %lcd_url,
            operator = %operator_address,
            "Consensus client initialized"
        );

        Ok(Self {
            lcd_url: lcd_url.trim_end_matches('/').to_string(),
            broadcast_url: broadcast_url.trim_end_matches('/').to_string(),
            operator_address: operator_address.to_string(),
            client,
        })
    }

    async fn query<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.lcd_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to query {}", path))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Query {} failed: {} - {}",
                path,
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        response
            .json::<T>()
            .await
            .wrap_err_with(|| format!("Malformed response from {}", path))
    }

    async fn broadcast<T: Serialize>(&self, route: &str, body: &T) -> Result<BroadcastResponse> {
        let url = format!("{}/{}", self.broadcast_url, route);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .wrap_err_with(|| format!("Failed to broadcast {}", route))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Broadcast {} failed: {} - {}",
                route,
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let result: BroadcastResponse = response
            .json()
            .await
            .wrap_err_with(|| format!("Malformed broadcast response for {}", route))?;
        debug!(route, tx_hash = %result.tx_hash, code = ?result.code, "Broadcast result");
        Ok(result)
    }

    async fn post_vote<T: Serialize + Sync>(
        &self,
        route: &str,
        digest: String,
        msg: &T,
    ) -> Result<VoteReceipt> {
        let body = SignedVote {
            digest: digest.clone(),
            msg,
        };
        let result = self.broadcast(route, &body).await?;
        match result.code {
            Some(code) if code != 0 => {
                let raw_log = result.raw_log.unwrap_or_default();
                if is_already_voted(&raw_log) {
                    return Ok(VoteReceipt {
                        tx_hash: String::new(),
                        ballot: digest,
                    });
                }
                Err(eyre!("{} rejected (code {}): {}", route, code, raw_log))
            }
            _ => Ok(VoteReceipt {
                tx_hash: result.tx_hash,
                ballot: digest,
            }),
        }
    }
}

#[async_trait]
impl ConsensusClient for HttpConsensusClient {
    fn operator_address(&self) -> &str {
        &self.operator_address
    }

    async fn block_height(&self) -> Result<u64> {
        let latest: LatestBlockResponse = self
            .query("/cosmos/base/tendermint/v1beta1/blocks/latest")
            .await?;
        latest
            .block
            .header
            .height
            .parse()
            .wrap_err("Invalid consensus block height")
    }

    async fn chain_params(&self, chain_id: ChainId) -> Result<ChainParams> {
        let resp: ChainParamsResponse = self
            .query(&format!(
                "/zeta-chain/observer/get_chain_params_for_chain/{}",
                chain_id
            ))
            .await?;
        Ok(resp.chain_params)
    }

    async fn pending_cctxs(&self, chain_id: ChainId) -> Result<Vec<CrossChainTx>> {
        let resp: PendingCctxResponse = self
            .query(&format!(
                "/zeta-chain/crosschain/pendingCctx/{}?limit={}",
                chain_id, PENDING_CCTX_LIMIT
            ))
            .await?;

        let mut cctxs = resp.cross_chain_tx;
        cctxs.sort_by_key(|c| c.nonce().unwrap_or(u64::MAX));
        Ok(cctxs)
    }

    async fn cctx(&self, index: &str) -> Result<CrossChainTx> {
        let resp: CctxResponse = self
            .query(&format!("/zeta-chain/crosschain/cctx/{}", index))
            .await?;
        Ok(resp.cross_chain_tx)
    }

    async fn outbound_trackers(&self, chain_id: ChainId) -> Result<Vec<OutboundTracker>> {
        let resp: OutboundTrackerResponse = self
            .query(&format!(
                "/zeta-chain/crosschain/outTxTrackerByChain/{}",
                chain_id
            ))
            .await?;
        let mut trackers = resp.outbound_tracker;
        trackers.sort_by_key(|t| t.nonce);
        Ok(trackers)
    }

    async fn inbound_trackers(&self, chain_id: ChainId) -> Result<Vec<InboundTracker>> {
        let resp: InboundTrackerResponse = self
            .query(&format!(
                "/zeta-chain/crosschain/inTxTrackerByChain/{}",
                chain_id
            ))
            .await?;
        Ok(resp.inbound_tracker)
    }

    async fn post_vote_inbound(&self, vote: &InboundVote) -> Result<VoteReceipt> {
        self.post_vote("vote_inbound", vote.digest(), vote).await
    }

    async fn post_vote_outbound(&self, vote: &OutboundVote) -> Result<VoteReceipt> {
        self.post_vote("vote_outbound", vote.digest(), vote).await
    }

    async fn add_outbound_tracker(
        &self,
        chain_id: ChainId,
        nonce: u64,
        tx_hash: &str,
        proof: Option<&str>,
    ) -> Result<String> {
        let msg = AddOutboundTrackerMsg {
            creator: &self.operator_address,
            chain_id,
            nonce,
            tx_hash,
            proof,
        };
        let result = self.broadcast("add_outbound_tracker", &msg).await?;
        match result.code {
            Some(code) if code != 0 => {
                let raw_log = result.raw_log.unwrap_or_default();
                if is_already_tracked(&raw_log) {
                    return Ok(String::new());
                }
                Err(eyre!(
                    "add_outbound_tracker rejected (code {}): {}",
                    code,
                    raw_log
                ))
            }
            _ => Ok(result.tx_hash),
        }
    }

    async fn post_gas_price(
        &self,
        chain_id: ChainId,
        gas_price: u128,
        block: u64,
    ) -> Result<String> {
        let msg = GasPriceMsg {
            creator: &self.operator_address,
            chain_id,
            price: gas_price.to_string(),
            block_number: block,
        };
        let result = self.broadcast("vote_gas_price", &msg).await?;
        if let Some(code) = result.code.filter(|c| *c != 0) {
            return Err(eyre!(
                "vote_gas_price rejected (code {}): {}",
                code,
                result.raw_log.unwrap_or_default()
            ));
        }
        Ok(result.tx_hash)
    }
}
