//! Inclusion verification against cached blocks
//!
//! A receipt claims its transaction sits at `(block_number, transaction_index)`.
//! The verifier looks that position up in the (cached) block and rejects the
//! receipt unless the transaction found there has the expected hash. On a
//! mismatch the cached block is evicted so the next check refetches it.

use std::sync::{Arc, Mutex};

use alloy::primitives::B256;
use eyre::Result;
use thiserror::Error;
use tracing::warn;

use crate::bounded_cache::{BoundedCache, CacheConfig};
use crate::rpc::{ChainRpc, RpcBlock, RpcReceipt};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InclusionError {
    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("transaction index {index} out of range [0, {len}), tx {tx_hash} block {block}")]
    IndexOutOfRange {
        index: u64,
        len: usize,
        tx_hash: B256,
        block: u64,
    },

    #[error("transaction at index {index} has different hash {found}, tx {expected} block {block}")]
    HashMismatch {
        index: u64,
        found: B256,
        expected: B256,
        block: u64,
    },
}

pub struct InclusionVerifier {
    rpc: Arc<dyn ChainRpc>,
    cache: Mutex<BoundedCache<u64, Arc<RpcBlock>>>,
}

impl InclusionVerifier {
    pub fn new(rpc: Arc<dyn ChainRpc>, cache_config: &CacheConfig) -> Self {
        Self {
            rpc,
            cache: Mutex::new(BoundedCache::new(
                cache_config.block_cache_size,
                cache_config.ttl_secs,
            )),
        }
    }

    /// Block by number, served from cache when present
    pub async fn block_by_number_cached(&self, number: u64) -> Result<Arc<RpcBlock>> {
        if let Some(block) = self.cached_block(number) {
            return Ok(block);
        }

        let block = self
            .rpc
            .block_by_number(number)
            .await?
            .ok_or(InclusionError::BlockNotFound(number))?;
        let block = Arc::new(block);

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(number, Arc::clone(&block));
        Ok(block)
    }

    pub fn cached_block(&self, number: u64) -> Option<Arc<RpcBlock>> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&number)
            .cloned()
    }

    pub fn remove_cached_block(&self, number: u64) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&number);
    }

    /// Ok only if `tx_hash` is at the position the receipt claims.
    ///
    /// Data-integrity failures are [`InclusionError`]s inside the report.
    pub async fn check_tx_inclusion(&self, tx_hash: B256, receipt: &RpcReceipt) -> Result<()> {
        let block = self.block_by_number_cached(receipt.block_number).await?;

        let index = receipt.transaction_index;
        let len = block.transactions.len();
        let Some(tx_at_index) = block.transactions.get(index as usize) else {
            self.remove_cached_block(receipt.block_number);
            warn!(
                block = receipt.block_number,
                index,
                len,
                tx_hash = %tx_hash,
                "Receipt index beyond cached block"
            );
            return Err(InclusionError::IndexOutOfRange {
                index,
                len,
                tx_hash,
                block: receipt.block_number,
            }
            .into());
        };

        if tx_at_index.hash != tx_hash {
            // clean stale block from cache
            self.remove_cached_block(receipt.block_number);
            warn!(
                block = receipt.block_number,
                index,
                expected = %tx_hash,
                found = %tx_at_index.hash,
                "Receipt position does not match cached block"
            );
            return Err(InclusionError::HashMismatch {
                index,
                found: tx_at_index.hash,
                expected: tx_hash,
                block: receipt.block_number,
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChainRpc, TxBuilder};

    fn receipt_for(hash: B256, block: u64, index: u64) -> RpcReceipt {
        RpcReceipt {
            transaction_hash: hash,
            block_number: block,
            block_hash: B256::ZERO,
            transaction_index: index,
            status: true,
            gas_used: 21_000,
            effective_gas_price: Some(1),
            logs: vec![],
        }
    }

    #[tokio::test]
    async fn test_included_transaction_passes() {
        let rpc = Arc::new(MockChainRpc::new());
        let tx = TxBuilder::new(B256::repeat_byte(0xaa)).build();
        rpc.add_block(10, vec![tx.clone()]);

        let verifier = InclusionVerifier::new(rpc.clone(), &CacheConfig::default());
        verifier
            .check_tx_inclusion(tx.hash, &receipt_for(tx.hash, 10, 0))
            .await
            .unwrap();
        assert!(verifier.cached_block(10).is_some());
    }

    #[tokio::test]
    async fn test_hash_mismatch_rejects_and_evicts() {
        let rpc = Arc::new(MockChainRpc::new());
        let other = TxBuilder::new(B256::repeat_byte(0xbb)).build();
        rpc.add_block(10, vec![other]);

        let verifier = InclusionVerifier::new(rpc.clone(), &CacheConfig::default());
        let claimed = B256::repeat_byte(0xaa);
        let err = verifier
            .check_tx_inclusion(claimed, &receipt_for(claimed, 10, 0))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InclusionError>(),
            Some(InclusionError::HashMismatch { .. })
        ));
        assert!(verifier.cached_block(10).is_none());
    }

    #[tokio::test]
    async fn test_index_out_of_range() {
        let rpc = Arc::new(MockChainRpc::new());
        let tx = TxBuilder::new(B256::repeat_byte(0xaa)).build();
        rpc.add_block(10, vec![tx.clone()]);

        let verifier = InclusionVerifier::new(rpc.clone(), &CacheConfig::default());
        let err = verifier
            .check_tx_inclusion(tx.hash, &receipt_for(tx.hash, 10, 3))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InclusionError>(),
            Some(InclusionError::IndexOutOfRange { len: 1, .. })
        ));
        assert!(verifier.cached_block(10).is_none());
    }

    #[tokio::test]
    async fn test_short_stale_block_refetched() {
        let rpc = Arc::new(MockChainRpc::new());
        let first = TxBuilder::new(B256::repeat_byte(0xa0)).build();
        let wanted = TxBuilder::new(B256::repeat_byte(0xaa)).build();
        rpc.add_block(10, vec![first.clone()]);

        let verifier = InclusionVerifier::new(rpc.clone(), &CacheConfig::default());
        let receipt = receipt_for(wanted.hash, 10, 1);
        assert!(verifier.check_tx_inclusion(wanted.hash, &receipt).await.is_err());

        rpc.add_block(10, vec![first, wanted.clone()]);
        verifier
            .check_tx_inclusion(wanted.hash, &receipt)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_block() {
        let rpc = Arc::new(MockChainRpc::new());
        let verifier = InclusionVerifier::new(rpc.clone(), &CacheConfig::default());
        let hash = B256::repeat_byte(0xaa);
        let err = verifier
            .check_tx_inclusion(hash, &receipt_for(hash, 99, 0))
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<InclusionError>(),
            Some(&InclusionError::BlockNotFound(99))
        );
    }

    #[tokio::test]
    async fn test_refetch_after_eviction_sees_fixed_block() {
        let rpc = Arc::new(MockChainRpc::new());
        let wanted = TxBuilder::new(B256::repeat_byte(0xaa)).build();
        let stale = TxBuilder::new(B256::repeat_byte(0xbb)).build();
        rpc.add_block(10, vec![stale]);

        let verifier = InclusionVerifier::new(rpc.clone(), &CacheConfig::default());
        let receipt = receipt_for(wanted.hash, 10, 0);
        assert!(verifier.check_tx_inclusion(wanted.hash, &receipt).await.is_err());

        // node catches up after a reorg
        rpc.add_block(10, vec![wanted.clone()]);
        verifier
            .check_tx_inclusion(wanted.hash, &receipt)
            .await
            .unwrap();
    }
}
