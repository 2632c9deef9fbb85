//! EVM JSON-RPC client with endpoint fallback

use alloy::primitives::B256;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::{parse_hex_u64, ChainRpc, LogFilter, RpcBlock, RpcLog, RpcReceipt, RpcTransaction};

/// EVM RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// EVM RPC error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// JSON-RPC client over one or more endpoints, tried in order.
///
/// Transport failures fall through to the next endpoint. An error object
/// returned by a node (e.g. "nonce too low") is final.
pub struct EvmRpcClient {
    urls: Vec<String>,
    client: Client,
}

impl EvmRpcClient {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(eyre!("At least one RPC URL is required"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self { urls, client })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let mut last_error = None;
        for url in &self.urls {
            let response = match self.client.post(url).json(&body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(url = %url, method, error = %e, "RPC endpoint unreachable, trying next");
                    last_error = Some(eyre!(e));
                    continue;
                }
            };

            let parsed = match response.json::<RpcResponse<T>>().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(url = %url, method, error = %e, "Malformed RPC response, trying next");
                    last_error = Some(eyre!(e));
                    continue;
                }
            };

            if let Some(error) = parsed.error {
                return Err(eyre!("RPC error: {} - {}", error.code, error.message));
            }
            return Ok(parsed.result);
        }

        Err(last_error
            .unwrap_or_else(|| eyre!("no RPC endpoints configured"))
            .wrap_err(format!("{} failed on all endpoints", method)))
    }
}

#[async_trait]
impl ChainRpc for EvmRpcClient {
    async fn block_number(&self) -> Result<u64> {
        let hex: String = self
            .call("eth_blockNumber", serde_json::json!([]))
            .await?
            .ok_or_else(|| eyre!("No block number returned"))?;
        Ok(parse_hex_u64(&hex)?)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>> {
        self.call(
            "eth_getBlockByNumber",
            serde_json::json!([format!("0x{:x}", number), true]),
        )
        .await
        .wrap_err_with(|| format!("eth_getBlockByNumber {}", number))
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>> {
        self.call("eth_getTransactionByHash", serde_json::json!([hash]))
            .await
            .wrap_err_with(|| format!("eth_getTransactionByHash {}", hash))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>> {
        self.call("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await
            .wrap_err_with(|| format!("eth_getTransactionReceipt {}", hash))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>> {
        let params = serde_json::json!([{
            "fromBlock": format!("0x{:x}", filter.from_block),
            "toBlock": format!("0x{:x}", filter.to_block),
            "address": filter.address,
            "topics": [filter.topic0],
        }]);
        Ok(self
            .call::<Vec<RpcLog>>("eth_getLogs", params)
            .await
            .wrap_err_with(|| {
                format!(
                    "eth_getLogs [{}, {}] {}",
                    filter.from_block, filter.to_block, filter.address
                )
            })?
            .unwrap_or_default())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        self.call(
            "eth_sendRawTransaction",
            serde_json::json!([format!("0x{}", hex::encode(raw))]),
        )
        .await?
        .ok_or_else(|| eyre!("eth_sendRawTransaction returned no hash"))
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        let hex: String = self
            .call("eth_gasPrice", serde_json::json!([]))
            .await?
            .ok_or_else(|| eyre!("No gas price returned"))?;
        Ok(u128::from_str_radix(hex.trim_start_matches("0x"), 16)?)
    }
}
