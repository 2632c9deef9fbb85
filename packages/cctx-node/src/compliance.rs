//! Compliance and donation filters applied before voting or signing

use std::collections::HashSet;

use tracing::info;

use crate::types::{ChainId, CrossChainTx};

/// Payload that marks a plain gift to the TSS address. Never voted on.
pub const DONATION_MESSAGE: &[u8] = b"I am rich!";

pub fn is_donation(message: &[u8]) -> bool {
    message == DONATION_MESSAGE
}

/// Set of restricted addresses, compared case-insensitively
#[derive(Debug, Clone, Default)]
pub struct ComplianceFilter {
    restricted: HashSet<String>,
}

impl ComplianceFilter {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let restricted = addresses
            .into_iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        Self { restricted }
    }

    pub fn is_restricted(&self, address: &str) -> bool {
        !address.is_empty() && self.restricted.contains(&address.trim().to_lowercase())
    }

    pub fn any_restricted(&self, addresses: &[&str]) -> bool {
        addresses.iter().any(|a| self.is_restricted(a))
    }

    /// Sender, origin or current receiver of the CCTX is restricted
    pub fn is_cctx_restricted(&self, cctx: &CrossChainTx) -> bool {
        let receiver = cctx
            .current_outbound()
            .map(|p| p.receiver.as_str())
            .unwrap_or_default();
        self.any_restricted(&[
            &cctx.inbound_params.sender,
            &cctx.inbound_params.tx_origin,
            receiver,
        ])
    }

    pub fn len(&self) -> usize {
        self.restricted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restricted.is_empty()
    }
}

/// Structured compliance log line, emitted on every restricted hit
pub fn log_restricted(chain_id: ChainId, inbound: bool, tx_hash: &str, sender: &str, receiver: &str) {
    info!(
        target: "compliance",
        chain_id,
        inbound,
        tx_hash,
        sender,
        receiver,
        "Restricted address detected"
    );
}
