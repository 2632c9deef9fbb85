//! Confirmation policy and inclusion verification for destination-chain
//! transactions

use crate::rpc::RpcReceipt;

pub mod inclusion;

pub use inclusion::{InclusionError, InclusionVerifier};

/// Result of checking a transaction receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// Mined but still below the required depth; carries blocks remaining
    WaitingConfirmations(u64),
    /// Mined and deep enough
    Confirmed,
}

/// True once `last_height >= receipt_block + confirmation_count`.
///
/// Monotone in `last_height`: once true for a height, true for every greater
/// height with the same receipt.
pub fn has_enough_confirmations(receipt_block: u64, last_height: u64, confirmation_count: u64) -> bool {
    last_height >= receipt_block.saturating_add(confirmation_count)
}

/// Classify a receipt against the current height
pub fn check_confirmations(
    receipt: &RpcReceipt,
    last_height: u64,
    confirmation_count: u64,
) -> ConfirmationResult {
    if has_enough_confirmations(receipt.block_number, last_height, confirmation_count) {
        ConfirmationResult::Confirmed
    } else {
        let required = receipt.block_number.saturating_add(confirmation_count);
        ConfirmationResult::WaitingConfirmations(required - last_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn receipt_at(block: u64) -> RpcReceipt {
        RpcReceipt {
            transaction_hash: B256::repeat_byte(1),
            block_number: block,
            block_hash: B256::ZERO,
            transaction_index: 0,
            status: true,
            gas_used: 21_000,
            effective_gas_price: Some(1),
            logs: vec![],
        }
    }

    #[test]
    fn test_confirmation_boundary() {
        // receipt at N=100, 12 confirmations
        assert!(!has_enough_confirmations(100, 111, 12));
        assert!(has_enough_confirmations(100, 112, 12));
    }

    #[test]
    fn test_confirmation_monotone_in_height() {
        let count = 5;
        let first = (0..200u64)
            .find(|h| has_enough_confirmations(50, *h, count))
            .unwrap();
        assert_eq!(first, 55);
        for h in first..first + 100 {
            assert!(has_enough_confirmations(50, h, count));
        }
    }

    #[test]
    fn test_zero_confirmations() {
        assert!(has_enough_confirmations(10, 10, 0));
        assert!(!has_enough_confirmations(10, 9, 0));
    }

    #[test]
    fn test_no_overflow_near_max() {
        assert!(!has_enough_confirmations(u64::MAX - 1, u64::MAX - 1, 10));
    }

    #[test]
    fn test_check_confirmations_reports_remaining() {
        let receipt = receipt_at(100);
        assert_eq!(
            check_confirmations(&receipt, 105, 12),
            ConfirmationResult::WaitingConfirmations(7)
        );
        assert_eq!(
            check_confirmations(&receipt, 112, 12),
            ConfirmationResult::Confirmed
        );
    }
}
