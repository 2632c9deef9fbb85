//! Per-chain outbound transaction cache keyed by TSS nonce
//!
//! Each nonce holds at most one pending (broadcast, unconfirmed) transaction
//! and at most one confirmed `(receipt, transaction)` pair. A pending entry
//! is only replaced by a transaction paying a strictly higher gas price.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::rpc::{RpcReceipt, RpcTransaction};

#[derive(Debug, Clone, Default)]
struct NonceEntry {
    pending: Option<RpcTransaction>,
    confirmed: Option<(RpcReceipt, RpcTransaction)>,
}

#[derive(Debug, Default)]
pub struct PendingTxCache {
    entries: Mutex<HashMap<u64, NonceEntry>>,
}

impl PendingTxCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<u64, NonceEntry>) -> R) -> R {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Record a broadcast transaction for `nonce`.
    ///
    /// Returns false (and keeps the existing entry) if a pending
    /// transaction with an equal or higher gas price is already held.
    pub fn set_pending(&self, nonce: u64, tx: RpcTransaction) -> bool {
        self.with_entries(|entries| {
            let entry = entries.entry(nonce).or_default();
            if let Some(existing) = &entry.pending {
                let old_price = existing.gas_price.unwrap_or(0);
                let new_price = tx.gas_price.unwrap_or(0);
                if new_price <= old_price && existing.hash != tx.hash {
                    debug!(nonce, old_price, new_price, "Keeping pending tx with higher fee");
                    return false;
                }
            }
            entry.pending = Some(tx);
            true
        })
    }

    pub fn get_pending(&self, nonce: u64) -> Option<RpcTransaction> {
        self.with_entries(|entries| entries.get(&nonce).and_then(|e| e.pending.clone()))
    }

    /// Gas price of the pending transaction for `nonce`, if any
    pub fn pending_gas_price(&self, nonce: u64) -> Option<u128> {
        self.with_entries(|entries| {
            entries
                .get(&nonce)
                .and_then(|e| e.pending.as_ref())
                .map(|tx| tx.gas_price.unwrap_or(0))
        })
    }

    pub fn clear_pending(&self, nonce: u64) {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(&nonce) {
                entry.pending = None;
            }
        })
    }

    /// Promote `nonce` to confirmed; the pending half is dropped
    pub fn set_confirmed(&self, nonce: u64, receipt: RpcReceipt, tx: RpcTransaction) {
        self.with_entries(|entries| {
            let entry = entries.entry(nonce).or_default();
            entry.pending = None;
            entry.confirmed = Some((receipt, tx));
        })
    }

    pub fn get_confirmed(&self, nonce: u64) -> Option<(RpcReceipt, RpcTransaction)> {
        self.with_entries(|entries| entries.get(&nonce).and_then(|e| e.confirmed.clone()))
    }

    pub fn is_confirmed(&self, nonce: u64) -> bool {
        self.with_entries(|entries| {
            entries
                .get(&nonce)
                .map(|e| e.confirmed.is_some())
                .unwrap_or(false)
        })
    }

    /// Drop every entry below `nonce` (already finalized on the consensus chain)
    pub fn prune_below(&self, nonce: u64) -> usize {
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|n, _| *n >= nonce);
            before - entries.len()
        })
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
