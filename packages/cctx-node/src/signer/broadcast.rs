//! Broadcast with bounded exponential backoff
//!
//! Node error strings are classified into retry, report, reject or drop.
//! Some nodes answer "already known" for a transaction they did accept, so
//! that case still hands the hash to the tracker reporter.

use std::time::Duration;

use alloy::primitives::B256;
use tracing::{debug, info, warn};

use crate::rpc::ChainRpc;
use crate::types::ChainId;

/// Broadcast retry configuration
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff after the first failure
    pub initial_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl BroadcastConfig {
    /// Backoff after failed attempt `attempt` (0-indexed): 1s, 2s, 4s, 8s
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs)
    }
}

/// What to do after a failed broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastAction {
    /// Transient failure, try again after backoff
    Retry,
    /// Stop retrying but hand the hash to the tracker reporter
    Report,
    /// Node refuses the transaction as invalid; retrying the same bytes
    /// cannot succeed
    Reject,
    /// Stop and forget the hash
    Drop,
}

/// Node errors for transactions that fail validation
const REJECTION_PATTERNS: &[&str] = &[
    "insufficient funds",
    "intrinsic gas too low",
    "exceeds block gas limit",
    "invalid sender",
    "invalid chain id",
    "transaction underpriced",
    "fee cap less than block base fee",
    "max fee per gas less than block base fee",
    "oversized data",
];

pub fn classify_broadcast_error(error: &str) -> BroadcastAction {
    let error_lower = error.to_lowercase();

    // Nonce already consumed by another transaction
    if error_lower.contains("nonce too low") {
        return BroadcastAction::Drop;
    }

    // A pending tx for the nonce pays more
    if error_lower.contains("replacement transaction underpriced") {
        return BroadcastAction::Drop;
    }

    if error_lower.contains("already known") {
        return BroadcastAction::Report;
    }

    if REJECTION_PATTERNS.iter().any(|p| error_lower.contains(p)) {
        return BroadcastAction::Reject;
    }

    BroadcastAction::Retry
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Node accepted the transaction
    Accepted,
    /// Node already holds the transaction
    AlreadyKnown,
    /// Every attempt failed transiently
    Exhausted { last_error: String },
    /// Node refused the transaction as invalid
    Rejected { reason: String },
    /// Node rejected the transaction in a way that makes it moot
    Dropped { reason: String },
}

impl BroadcastOutcome {
    /// Whether the hash goes to the tracker reporter
    pub fn should_report(&self) -> bool {
        !matches!(self, BroadcastOutcome::Dropped { .. })
    }

    /// Whether a node holds the transaction in its mempool
    pub fn is_pending(&self) -> bool {
        matches!(self, BroadcastOutcome::Accepted | BroadcastOutcome::AlreadyKnown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastOutcome::Accepted => "accepted",
            BroadcastOutcome::AlreadyKnown => "already_known",
            BroadcastOutcome::Exhausted { .. } => "exhausted",
            BroadcastOutcome::Rejected { .. } => "rejected",
            BroadcastOutcome::Dropped { .. } => "dropped",
        }
    }
}

/// Send `raw` until accepted, refused, or out of attempts
pub async fn broadcast_with_retry(
    rpc: &dyn ChainRpc,
    raw: &[u8],
    tx_hash: B256,
    chain_id: ChainId,
    nonce: u64,
    config: &BroadcastConfig,
) -> BroadcastOutcome {
    let mut last_error = String::new();

    for attempt in 0..config.max_attempts {
        match rpc.send_raw_transaction(raw).await {
            Ok(hash) => {
                if hash != tx_hash {
                    warn!(chain_id, nonce, expected = %tx_hash, returned = %hash, "Node returned unexpected tx hash");
                }
                info!(chain_id, nonce, tx_hash = %tx_hash, attempt, "Broadcast outbound");
                return BroadcastOutcome::Accepted;
            }
            Err(e) => {
                last_error = format!("{:#}", e);
                match classify_broadcast_error(&last_error) {
                    BroadcastAction::Drop => {
                        info!(chain_id, nonce, tx_hash = %tx_hash, error = %last_error, "Broadcast dropped");
                        return BroadcastOutcome::Dropped { reason: last_error };
                    }
                    BroadcastAction::Reject => {
                        warn!(chain_id, nonce, tx_hash = %tx_hash, attempt, error = %last_error, "Broadcast rejected");
                        return BroadcastOutcome::Rejected { reason: last_error };
                    }
                    BroadcastAction::Report => {
                        debug!(chain_id, nonce, tx_hash = %tx_hash, "Transaction already known to node");
                        return BroadcastOutcome::AlreadyKnown;
                    }
                    BroadcastAction::Retry => {
                        warn!(
                            chain_id,
                            nonce,
                            tx_hash = %tx_hash,
                            attempt,
                            max = config.max_attempts,
                            error = %last_error,
                            "Broadcast failed"
                        );
                        if attempt + 1 < config.max_attempts {
                            tokio::time::sleep(config.backoff_for_attempt(attempt)).await;
                        }
                    }
                }
            }
        }
    }

    BroadcastOutcome::Exhausted { last_error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainRpc;

    fn fast() -> BroadcastConfig {
        BroadcastConfig {
            initial_backoff: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let config = BroadcastConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            classify_broadcast_error("RPC error: -32000 - nonce too low"),
            BroadcastAction::Drop
        );
        assert_eq!(
            classify_broadcast_error("replacement transaction underpriced"),
            BroadcastAction::Drop
        );
        assert_eq!(
            classify_broadcast_error("RPC error: -32000 - already known"),
            BroadcastAction::Report
        );
        assert_eq!(
            classify_broadcast_error("insufficient funds for gas * price + value"),
            BroadcastAction::Reject
        );
        assert_eq!(
            classify_broadcast_error("RPC error: -32000 - intrinsic gas too low"),
            BroadcastAction::Reject
        );
        assert_eq!(
            classify_broadcast_error("error sending request: connection refused"),
            BroadcastAction::Retry
        );
    }

    #[tokio::test]
    async fn test_retries_then_accepts() {
        let rpc = MockChainRpc::new();
        rpc.push_send_error("connection reset");
        rpc.push_send_error("timeout");
        let hash = B256::repeat_byte(7);

        let outcome = broadcast_with_retry(&rpc, &[1, 2, 3], hash, 1, 0, &fast()).await;
        assert_eq!(outcome, BroadcastOutcome::Accepted);
        assert_eq!(rpc.sent_raw().len(), 3);
    }

    #[tokio::test]
    async fn test_nonce_too_low_drops_without_retry() {
        let rpc = MockChainRpc::new();
        rpc.push_send_error("nonce too low");

        let outcome = broadcast_with_retry(&rpc, &[1], B256::ZERO, 1, 0, &fast()).await;
        assert!(!outcome.should_report());
        assert_eq!(rpc.sent_raw().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_still_reports() {
        let rpc = MockChainRpc::new();
        for _ in 0..5 {
            rpc.push_send_error("503 service unavailable");
        }

        let outcome = broadcast_with_retry(&rpc, &[1], B256::ZERO, 1, 0, &fast()).await;
        assert!(matches!(outcome, BroadcastOutcome::Exhausted { .. }));
        assert!(outcome.should_report());
        assert!(!outcome.is_pending());
        assert_eq!(rpc.sent_raw().len(), 5);
    }

    #[tokio::test]
    async fn test_invalid_tx_rejected_without_retry() {
        let rpc = MockChainRpc::new();
        rpc.push_send_error("insufficient funds for gas * price + value");

        let outcome = broadcast_with_retry(&rpc, &[1], B256::ZERO, 1, 0, &fast()).await;
        assert!(matches!(outcome, BroadcastOutcome::Rejected { .. }));
        assert!(!outcome.is_pending());
        assert_eq!(rpc.sent_raw().len(), 1);
    }

    #[tokio::test]
    async fn test_already_known_reports() {
        let rpc = MockChainRpc::new();
        rpc.push_send_error("already known");
        let outcome = broadcast_with_retry(&rpc, &[1], B256::ZERO, 1, 0, &fast()).await;
        assert_eq!(outcome, BroadcastOutcome::AlreadyKnown);
        assert!(outcome.should_report());
    }
}
