//! Threshold signature service interface
//!
//! Signs 32-byte digests on behalf of the custodial (TSS) address. Signatures
//! are returned as 65 bytes `r || s || v` with `v` normalized to 0/1.

use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use base64::Engine;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::ChainId;

#[async_trait]
pub trait TssSigner: Send + Sync {
    /// Sign `digest` for outbound `nonce` on `chain_id`. `height` is the
    /// consensus block the signing round is bound to.
    async fn sign(&self, digest: B256, height: u64, nonce: u64, chain_id: ChainId)
        -> Result<[u8; 65]>;

    /// Custodial EVM address the signatures recover to
    fn evm_address(&self) -> Address;
}

/// Normalize the recovery byte of a 65-byte signature to 0/1
pub fn normalize_recovery_id(mut sig: [u8; 65]) -> Result<[u8; 65]> {
    sig[64] = match sig[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        v => return Err(eyre!("invalid signature recovery byte {}", v)),
    };
    Ok(sig)
}

#[derive(Debug, Serialize)]
struct KeysignRequest {
    digest: B256,
    height: u64,
    nonce: u64,
    chain_id: ChainId,
}

#[derive(Debug, Deserialize)]
struct KeysignResponse {
    /// base64 encoded `r || s || v`
    signature: String,
}

/// Client for a TSS keysign daemon
pub struct HttpTssSigner {
    url: String,
    address: Address,
    client: Client,
}

impl HttpTssSigner {
    pub fn new(url: &str, address: Address) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        info!(url = %url, tss_address = %address, "TSS client initialized");

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            address,
            client,
        })
    }
}

#[async_trait]
impl TssSigner for HttpTssSigner {
    async fn sign(
        &self,
        digest: B256,
        height: u64,
        nonce: u64,
        chain_id: ChainId,
    ) -> Result<[u8; 65]> {
        let request = KeysignRequest {
            digest,
            height,
            nonce,
            chain_id,
        };

        let response = self
            .client
            .post(format!("{}/keysign", self.url))
            .json(&request)
            .send()
            .await
            .wrap_err("TSS keysign request failed")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "TSS keysign failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let body: KeysignResponse = response
            .json()
            .await
            .wrap_err("Malformed TSS keysign response")?;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(body.signature.as_bytes())
            .wrap_err("TSS signature is not base64")?;
        let sig: [u8; 65] = raw
            .as_slice()
            .try_into()
            .map_err(|_| eyre!("TSS signature must be 65 bytes, got {}", raw.len()))?;

        debug!(%digest, nonce, chain_id, "TSS keysign complete");
        normalize_recovery_id(sig)
    }

    fn evm_address(&self) -> Address {
        self.address
    }
}

/// Single-key stand-in for the TSS, for local devnets and tests
pub struct LocalTssSigner {
    signer: PrivateKeySigner,
}

impl LocalTssSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| eyre!("Invalid TSS private key: {}", e))?;
        Ok(Self::new(signer))
    }

    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }
}

#[async_trait]
impl TssSigner for LocalTssSigner {
    async fn sign(
        &self,
        digest: B256,
        _height: u64,
        _nonce: u64,
        _chain_id: ChainId,
    ) -> Result<[u8; 65]> {
        let sig = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| eyre!("local signing failed: {}", e))?;
        normalize_recovery_id(sig.as_bytes())
    }

    fn evm_address(&self) -> Address {
        self.signer.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_recovery_id() {
        let mut sig = [0u8; 65];
        sig[64] = 27;
        assert_eq!(normalize_recovery_id(sig).unwrap()[64], 0);
        sig[64] = 28;
        assert_eq!(normalize_recovery_id(sig).unwrap()[64], 1);
        sig[64] = 1;
        assert_eq!(normalize_recovery_id(sig).unwrap()[64], 1);
        sig[64] = 35;
        assert!(normalize_recovery_id(sig).is_err());
    }

    #[tokio::test]
    async fn test_local_signer_normalized_output() {
        let tss = LocalTssSigner::random();
        let sig = tss.sign(B256::repeat_byte(0x11), 1, 0, 1337).await.unwrap();
        assert!(sig[64] <= 1);
    }

    #[test]
    fn test_local_signer_from_private_key() {
        let tss = LocalTssSigner::from_private_key(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        // address of private key 1
        assert_eq!(
            tss.evm_address(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
                .parse::<Address>()
                .unwrap()
        );
    }
}
