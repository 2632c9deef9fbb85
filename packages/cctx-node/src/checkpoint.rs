//! Durable per-chain scan checkpoint
//!
//! A checkpoint only ever moves forward: `save` with a lower height than the
//! stored one keeps the stored value and returns it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use eyre::Result;
use sqlx::PgPool;

use crate::db;
use crate::types::ChainId;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last fully scanned block, `None` if the chain was never scanned
    async fn load(&self, chain_id: ChainId) -> Result<Option<u64>>;

    /// Advance the checkpoint; returns the stored value afterwards
    async fn save(&self, chain_id: ChainId, height: u64) -> Result<u64>;
}

/// Postgres-backed checkpoint store
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, chain_id: ChainId) -> Result<Option<u64>> {
        db::get_last_scanned_block(&self.pool, chain_id).await
    }

    async fn save(&self, chain_id: ChainId, height: u64) -> Result<u64> {
        db::advance_last_scanned_block(&self.pool, chain_id, height).await
    }
}

/// In-memory store for tests and ephemeral devnets
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    heights: Mutex<HashMap<ChainId, u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(chain_id: ChainId, height: u64) -> Self {
        let store = Self::new();
        store
            .heights
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chain_id, height);
        store
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, chain_id: ChainId) -> Result<Option<u64>> {
        Ok(self
            .heights
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&chain_id)
            .copied())
    }

    async fn save(&self, chain_id: ChainId, height: u64) -> Result<u64> {
        let mut heights = self.heights.lock().unwrap_or_else(|e| e.into_inner());
        let stored = heights.entry(chain_id).or_insert(height);
        *stored = (*stored).max(height);
        Ok(*stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_is_monotone() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.load(1).await.unwrap(), None);

        assert_eq!(store.save(1, 100).await.unwrap(), 100);
        assert_eq!(store.save(1, 90).await.unwrap(), 100);
        assert_eq!(store.save(1, 101).await.unwrap(), 101);
        assert_eq!(store.load(1).await.unwrap(), Some(101));
    }

    #[tokio::test]
    async fn test_chains_are_independent() {
        let store = MemoryCheckpointStore::with_checkpoint(1, 50);
        store.save(2, 10).await.unwrap();
        assert_eq!(store.load(1).await.unwrap(), Some(50));
        assert_eq!(store.load(2).await.unwrap(), Some(10));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
    async fn test_pg_store_is_monotone() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = db::create_pool(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let store = PgCheckpointStore::new(pool);
        let chain = 9_999_001;
        let first = store.save(chain, 500).await.unwrap();
        assert!(first >= 500);
        assert_eq!(store.save(chain, 1).await.unwrap(), first);
    }
}
