//! Log validation, ordering and decoding

use std::collections::HashSet;

use alloy::primitives::{Address, B256};
use alloy::sol_types::SolEvent;
use thiserror::Error;
use tracing::warn;

use crate::rpc::RpcLog;
use crate::types::ChainId;

/// Topic counts (signature + indexed params) of the parsed events
pub const TOPICS_DEPOSITED: usize = 2;
pub const TOPICS_ZETA_SENT: usize = 3;
pub const TOPICS_WITHDRAWN: usize = 3;
pub const TOPICS_ZETA_RECEIVED: usize = 4;
pub const TOPICS_ZETA_REVERTED: usize = 3;
pub const TOPICS_WITHDRAWN_AND_CALLED: usize = 3;
pub const TOPICS_GATEWAY_DEPOSITED: usize = 3;
pub const TOPICS_GATEWAY_DEPOSITED_AND_CALLED: usize = 3;
pub const TOPICS_GATEWAY_CALLED: usize = 3;
pub const TOPICS_GATEWAY_EXECUTED: usize = 2;
pub const TOPICS_GATEWAY_REVERTED: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("log emitted by {found}, expected {expected}")]
    WrongEmitter { found: Address, expected: Address },

    #[error("log has {found} topics, expected {expected}")]
    TopicCount { found: usize, expected: usize },

    #[error("log was removed by a reorg")]
    Removed,

    #[error("log has zero transaction hash")]
    ZeroTxHash,

    #[error("log belongs to tx {found}, expected {expected}")]
    TxHashMismatch { found: B256, expected: B256 },
}

/// Sanity checks applied to every log before decoding
pub fn validate_log(
    log: &RpcLog,
    emitter: Address,
    tx_hash: Option<B256>,
    topics: usize,
) -> Result<(), LogError> {
    if log.address != emitter {
        return Err(LogError::WrongEmitter {
            found: log.address,
            expected: emitter,
        });
    }
    if log.topics.len() != topics {
        return Err(LogError::TopicCount {
            found: log.topics.len(),
            expected: topics,
        });
    }
    if log.removed {
        return Err(LogError::Removed);
    }
    if log.transaction_hash == B256::ZERO {
        return Err(LogError::ZeroTxHash);
    }
    if let Some(expected) = tx_hash {
        if log.transaction_hash != expected {
            return Err(LogError::TxHashMismatch {
                found: log.transaction_hash,
                expected,
            });
        }
    }
    Ok(())
}

/// A decoded event with its position on chain
#[derive(Debug, Clone)]
pub struct ParsedEvent<E> {
    pub event: E,
    pub block_number: u64,
    pub tx_hash: B256,
    pub tx_index: u64,
    pub log_index: u64,
}

/// Decode every valid `E` in `logs`, sorted by (block, tx index, log index).
///
/// Logs with another signature are ignored silently. Logs that fail
/// validation or decoding are dropped with a log line.
pub fn collect_events<E: SolEvent>(
    chain_id: ChainId,
    logs: &[RpcLog],
    emitter: Address,
    tx_hash: Option<B256>,
    topics: usize,
) -> Vec<ParsedEvent<E>> {
    let mut events = Vec::new();

    for log in logs {
        if log.topics.first() != Some(&E::SIGNATURE_HASH) {
            continue;
        }
        if let Err(e) = validate_log(log, emitter, tx_hash, topics) {
            warn!(
                chain_id,
                tx_hash = %log.transaction_hash,
                block = log.block_number,
                event = E::SIGNATURE,
                error = %e,
                "Dropping invalid log"
            );
            continue;
        }
        match E::decode_raw_log(log.topics.iter().copied(), &log.data, true) {
            Ok(event) => events.push(ParsedEvent {
                event,
                block_number: log.block_number,
                tx_hash: log.transaction_hash,
                tx_index: log.transaction_index,
                log_index: log.log_index,
            }),
            Err(e) => warn!(
                chain_id,
                tx_hash = %log.transaction_hash,
                block = log.block_number,
                event = E::SIGNATURE,
                error = %e,
                "Undecodable event"
            ),
        }
    }

    events.sort_by_key(|e| (e.block_number, e.tx_index, e.log_index));
    events
}

/// Keep the first event of each transaction
pub fn dedup_by_tx<E>(chain_id: ChainId, events: Vec<ParsedEvent<E>>) -> Vec<ParsedEvent<E>> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| {
            if seen.insert(e.tx_hash) {
                true
            } else {
                warn!(chain_id, tx_hash = %e.tx_hash, log_index = e.log_index, "Multiple inbound events in one tx, keeping the first");
                false
            }
        })
        .collect()
}
