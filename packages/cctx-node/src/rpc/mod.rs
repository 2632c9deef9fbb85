//! Chain RPC capability interface
//!
//! Observers, signers and tracker reporters talk to a chain only through
//! [`ChainRpc`]. The EVM implementation speaks raw JSON-RPC over reqwest and
//! fails over between configured endpoints.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Deserializer, Serialize};

pub mod evm;

pub use evm::EvmRpcClient;

/// Block with full transaction objects
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    #[serde(deserialize_with = "hex_u64")]
    pub number: u64,
    pub hash: B256,
    #[serde(deserialize_with = "hex_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(deserialize_with = "hex_u64")]
    pub nonce: u64,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default, deserialize_with = "hex_u64")]
    pub gas: u64,
    #[serde(default, deserialize_with = "opt_hex_u128")]
    pub gas_price: Option<u128>,
    /// `None` while the transaction sits in the mempool
    #[serde(default, deserialize_with = "opt_hex_u64")]
    pub block_number: Option<u64>,
    #[serde(default, deserialize_with = "opt_hex_u64")]
    pub transaction_index: Option<u64>,
}

impl RpcTransaction {
    pub fn is_pending(&self) -> bool {
        self.block_number.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    #[serde(deserialize_with = "hex_u64")]
    pub block_number: u64,
    #[serde(default)]
    pub block_hash: B256,
    #[serde(deserialize_with = "hex_u64")]
    pub transaction_index: u64,
    #[serde(default, deserialize_with = "hex_bool")]
    pub status: bool,
    #[serde(default, deserialize_with = "hex_u64")]
    pub gas_used: u64,
    #[serde(default, deserialize_with = "opt_hex_u128")]
    pub effective_gas_price: Option<u128>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(deserialize_with = "hex_u64")]
    pub block_number: u64,
    pub transaction_hash: B256,
    #[serde(deserialize_with = "hex_u64")]
    pub transaction_index: u64,
    #[serde(deserialize_with = "hex_u64")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

/// `eth_getLogs` filter over an inclusive block range
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub address: Address,
    pub topic0: B256,
}

/// Per-chain RPC capabilities consumed by the pipeline
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current head height
    async fn block_number(&self) -> Result<u64>;

    /// Block with full transactions, `None` if unknown
    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>>;

    /// Transaction by hash, `None` if unknown to the node
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>>;

    /// Receipt by hash, `None` while pending or unknown
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>>;

    /// Broadcast a signed, RLP/2718-encoded transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;

    /// Node's suggested legacy gas price in wei
    async fn suggest_gas_price(&self) -> Result<u128>;
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(value: &str) -> std::result::Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
}

fn parse_hex_u128(value: &str) -> std::result::Result<u128, std::num::ParseIntError> {
    u128::from_str_radix(value.trim_start_matches("0x"), 16)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Num(u64),
    Str(String),
}

fn hex_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    match Quantity::deserialize(d)? {
        Quantity::Num(n) => Ok(n),
        Quantity::Str(s) => parse_hex_u64(&s).map_err(serde::de::Error::custom),
    }
}

fn opt_hex_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    match Option::<Quantity>::deserialize(d)? {
        None => Ok(None),
        Some(Quantity::Num(n)) => Ok(Some(n)),
        Some(Quantity::Str(s)) => parse_hex_u64(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn opt_hex_u128<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u128>, D::Error> {
    match Option::<Quantity>::deserialize(d)? {
        None => Ok(None),
        Some(Quantity::Num(n)) => Ok(Some(n as u128)),
        Some(Quantity::Str(s)) => parse_hex_u128(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn hex_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(hex_u64(d)? == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_from_json_rpc() {
        let json = r#"{
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "blockNumber": "0x10",
            "blockHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "transactionIndex": "0x2",
            "status": "0x1",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "logs": []
        }"#;
        let receipt: RpcReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.transaction_index, 2);
        assert!(receipt.status);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.effective_gas_price, Some(1_000_000_000));
    }

    #[test]
    fn test_pending_transaction_has_no_block() {
        let json = r#"{
            "hash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "from": "0x3333333333333333333333333333333333333333",
            "to": null,
            "nonce": "0x7",
            "value": "0x0",
            "input": "0x",
            "gas": "0x5208",
            "gasPrice": "0x1",
            "blockNumber": null,
            "transactionIndex": null
        }"#;
        let tx: RpcTransaction = serde_json::from_str(json).unwrap();
        assert!(tx.is_pending());
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.to, None);
    }

    #[test]
    fn test_failed_receipt_status() {
        let json = r#"{
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "blockNumber": "0x1",
            "transactionIndex": "0x0",
            "status": "0x0"
        }"#;
        let receipt: RpcReceipt = serde_json::from_str(json).unwrap();
        assert!(!receipt.status);
        assert!(receipt.logs.is_empty());
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x1a").unwrap(), 26);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }
}
