//! Cross-chain transaction types as served by the consensus chain
//!
//! The consensus chain renders uint64 fields as JSON strings, so numeric
//! fields accept either representation. Amounts stay as decimal strings and
//! are parsed at the point of use.

use alloy::primitives::U256;
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Native chain identifier (EIP-155 chain id for EVM chains)
pub type ChainId = u64;

/// Asset class moved by a CCTX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinType {
    Zeta,
    Gas,
    #[serde(rename = "ERC20")]
    Erc20,
    NoAssetCall,
}

impl CoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinType::Zeta => "Zeta",
            CoinType::Gas => "Gas",
            CoinType::Erc20 => "ERC20",
            CoinType::NoAssetCall => "NoAssetCall",
        }
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a CCTX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CctxStatus {
    PendingInbound,
    PendingOutbound,
    OutboundMined,
    PendingRevert,
    Reverted,
    Aborted,
}

impl CctxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CctxStatus::PendingInbound => "PendingInbound",
            CctxStatus::PendingOutbound => "PendingOutbound",
            CctxStatus::OutboundMined => "OutboundMined",
            CctxStatus::PendingRevert => "PendingRevert",
            CctxStatus::Reverted => "Reverted",
            CctxStatus::Aborted => "Aborted",
        }
    }

    /// Statuses that still expect an outbound transaction from this pipeline
    pub fn is_pending(&self) -> bool {
        matches!(self, CctxStatus::PendingOutbound | CctxStatus::PendingRevert)
    }
}

impl fmt::Display for CctxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which generation of custody contracts the CCTX targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolContractVersion {
    #[default]
    V1,
    V2,
}

impl ProtocolContractVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolContractVersion::V1 => "V1",
            ProtocolContractVersion::V2 => "V2",
        }
    }
}

/// Outcome of an outbound transaction as observed on the destination chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveStatus {
    Success,
    Failed,
}

impl ReceiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiveStatus::Success => "Success",
            ReceiveStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub status: CctxStatus,
    #[serde(default)]
    pub status_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundParams {
    pub sender: String,
    #[serde(deserialize_with = "u64_from_any")]
    pub sender_chain_id: ChainId,
    #[serde(default)]
    pub tx_origin: String,
    pub coin_type: CoinType,
    #[serde(default)]
    pub asset: String,
    pub amount: String,
    pub observed_hash: String,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub observed_external_height: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub event_index: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundParams {
    pub receiver: String,
    #[serde(deserialize_with = "u64_from_any")]
    pub receiver_chain_id: ChainId,
    pub amount: String,
    #[serde(deserialize_with = "u64_from_any")]
    pub tss_nonce: u64,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub gas_priority_fee: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub tss_pubkey: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertOptions {
    #[serde(default)]
    pub revert_address: String,
    #[serde(default)]
    pub call_on_revert: bool,
    #[serde(default)]
    pub abort_address: String,
    /// Hex (no prefix) payload delivered to the revert address
    #[serde(default)]
    pub revert_message: String,
    #[serde(default, deserialize_with = "u64_from_any")]
    pub revert_gas_limit: u64,
}

/// Canonical record of one cross-chain transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossChainTx {
    pub index: String,
    #[serde(default)]
    pub creator: String,
    /// Hex (no prefix) message relayed to the receiver
    #[serde(default)]
    pub relayed_message: String,
    pub cctx_status: Status,
    pub inbound_params: InboundParams,
    #[serde(default)]
    pub outbound_params: Vec<OutboundParams>,
    #[serde(default)]
    pub revert_options: RevertOptions,
    #[serde(default)]
    pub protocol_contract_version: ProtocolContractVersion,
}

impl CrossChainTx {
    pub fn status(&self) -> CctxStatus {
        self.cctx_status.status
    }

    /// The outbound param of the attempt in progress (always the last one)
    pub fn current_outbound(&self) -> Result<&OutboundParams> {
        self.outbound_params
            .last()
            .ok_or_else(|| eyre!("cctx {} has no outbound params", self.index))
    }

    /// The outbound param of the first attempt, i.e. the original destination
    pub fn original_outbound(&self) -> Result<&OutboundParams> {
        self.outbound_params
            .first()
            .ok_or_else(|| eyre!("cctx {} has no outbound params", self.index))
    }

    pub fn nonce(&self) -> Result<u64> {
        Ok(self.current_outbound()?.tss_nonce)
    }
}

/// Parse a decimal (or 0x-prefixed) amount string
pub fn parse_amount(amount: &str) -> Result<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    trimmed
        .parse::<U256>()
        .wrap_err_with(|| format!("invalid amount: {}", amount))
}

/// Candidate hash for an outbound (chain, nonce)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerHash {
    pub tx_hash: String,
    #[serde(default)]
    pub tx_signer: String,
    #[serde(default)]
    pub proved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundTracker {
    #[serde(default)]
    pub index: String,
    #[serde(deserialize_with = "u64_from_any")]
    pub chain_id: ChainId,
    #[serde(deserialize_with = "u64_from_any")]
    pub nonce: u64,
    #[serde(default)]
    pub hash_list: Vec<TrackerHash>,
}

/// Inbound hash suggested for observation by an admin or user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundTracker {
    #[serde(deserialize_with = "u64_from_any")]
    pub chain_id: ChainId,
    pub tx_hash: String,
    pub coin_type: CoinType,
}

/// Per-chain parameters governed by the consensus chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    #[serde(deserialize_with = "u64_from_any")]
    pub chain_id: ChainId,
    #[serde(deserialize_with = "u64_from_any")]
    pub confirmation_count: u64,
    #[serde(deserialize_with = "u64_from_any")]
    pub gas_price_ticker: u64,
    #[serde(deserialize_with = "u64_from_any")]
    pub inbound_ticker: u64,
    #[serde(deserialize_with = "u64_from_any")]
    pub outbound_ticker: u64,
    #[serde(deserialize_with = "u64_from_any")]
    pub outbound_schedule_interval: u64,
    #[serde(deserialize_with = "u64_from_any")]
    pub outbound_schedule_lookahead: u64,
    #[serde(default)]
    pub connector_contract_address: String,
    #[serde(default)]
    pub erc20_custody_contract_address: String,
    #[serde(default)]
    pub gateway_address: String,
    #[serde(default)]
    pub zeta_token_contract_address: String,
    #[serde(default = "default_true")]
    pub is_supported: bool,
}

impl ChainParams {
    /// Reasonable defaults for a chain before params are fetched
    pub fn default_for(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            confirmation_count: 12,
            gas_price_ticker: 30,
            inbound_ticker: 12,
            outbound_ticker: 15,
            outbound_schedule_interval: 30,
            outbound_schedule_lookahead: 60,
            connector_contract_address: String::new(),
            erc20_custody_contract_address: String::new(),
            gateway_address: String::new(),
            zeta_token_contract_address: String::new(),
            is_supported: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Accept a u64 encoded either as a JSON number or a JSON string
pub fn u64_from_any<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) if s.is_empty() => Ok(0),
        NumOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
