//! Vote messages posted to the consensus chain
//!
//! A vote's digest is its ballot identifier. Two observers that see the same
//! on-chain event must produce the same digest. The inbound digest excludes
//! `creator` and `inbound_block_height`; the outbound digest excludes
//! `creator`.

use serde::{Deserialize, Serialize};

use crate::hash::{bytes32_to_hex, DigestWriter};
use crate::types::{ChainId, CoinType, ProtocolContractVersion, ReceiveStatus, RevertOptions};

/// Gas limit attached to inbound ERC20 deposits
pub const ERC20_DEPOSIT_GAS_LIMIT: u64 = 1_500_000;

/// Gas limit attached to inbound native token deposits
pub const GAS_DEPOSIT_GAS_LIMIT: u64 = 90_000;

/// Gas limit attached to gateway deposits and calls
pub const GATEWAY_INBOUND_GAS_LIMIT: u64 = 1_500_000;

/// Candidate observation of an inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundVote {
    pub creator: String,
    pub sender: String,
    pub sender_chain_id: ChainId,
    pub tx_origin: String,
    pub receiver: String,
    pub receiver_chain_id: ChainId,
    /// Decimal amount
    pub amount: String,
    /// Inbound payload: hex without prefix, base64 for connector messages
    pub message: String,
    pub inbound_hash: String,
    pub inbound_block_height: u64,
    pub gas_limit: u64,
    pub coin_type: CoinType,
    pub asset: String,
    pub event_index: u64,
    pub protocol_contract_version: ProtocolContractVersion,
    /// Set by gateway inbounds, default otherwise
    #[serde(default)]
    pub revert_options: RevertOptions,
    #[serde(default)]
    pub is_cross_chain_call: bool,
}

impl InboundVote {
    /// Ballot identifier of this vote
    pub fn digest(&self) -> String {
        let mut w = DigestWriter::new("inbound");
        w.text(&self.sender)
            .u64(self.sender_chain_id)
            .text(&self.tx_origin)
            .text(&self.receiver)
            .u64(self.receiver_chain_id)
            .text(&self.amount)
            .text(&self.message)
            .text(&self.inbound_hash)
            .u64(self.gas_limit)
            .text(self.coin_type.as_str())
            .text(&self.asset)
            .u64(self.event_index)
            .text(self.protocol_contract_version.as_str())
            .text(&self.revert_options.revert_address)
            .u64(self.revert_options.call_on_revert as u64)
            .text(&self.revert_options.abort_address)
            .text(&self.revert_options.revert_message)
            .u64(self.revert_options.revert_gas_limit)
            .u64(self.is_cross_chain_call as u64);
        bytes32_to_hex(&w.finish())
    }
}

/// Candidate observation of a mined outbound transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundVote {
    pub creator: String,
    pub cctx_hash: String,
    pub observed_outbound_hash: String,
    pub observed_outbound_block_height: u64,
    pub observed_outbound_gas_used: u64,
    /// Decimal wei
    pub observed_outbound_effective_gas_price: String,
    pub observed_outbound_gas_limit: u64,
    /// Decimal amount
    pub value_received: String,
    pub status: ReceiveStatus,
    pub outbound_chain: ChainId,
    pub outbound_tss_nonce: u64,
    pub coin_type: CoinType,
}

impl OutboundVote {
    /// Ballot identifier of this vote
    pub fn digest(&self) -> String {
        let mut w = DigestWriter::new("outbound");
        w.text(&self.cctx_hash)
            .text(&self.observed_outbound_hash)
            .u64(self.observed_outbound_block_height)
            .u64(self.observed_outbound_gas_used)
            .text(&self.observed_outbound_effective_gas_price)
            .u64(self.observed_outbound_gas_limit)
            .text(&self.value_received)
            .text(self.status.as_str())
            .u64(self.outbound_chain)
            .u64(self.outbound_tss_nonce)
            .text(self.coin_type.as_str());
        bytes32_to_hex(&w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inbound() -> InboundVote {
        InboundVote {
            creator: "zeta1observer".to_string(),
            sender: "0x1111111111111111111111111111111111111111".to_string(),
            sender_chain_id: 1,
            tx_origin: "0x1111111111111111111111111111111111111111".to_string(),
            receiver: "0x2222222222222222222222222222222222222222".to_string(),
            receiver_chain_id: 7000,
            amount: "1000".to_string(),
            message: "".to_string(),
            inbound_hash: "0xaaaa".to_string(),
            inbound_block_height: 100,
            gas_limit: ERC20_DEPOSIT_GAS_LIMIT,
            coin_type: CoinType::Erc20,
            asset: "0x3333333333333333333333333333333333333333".to_string(),
            event_index: 4,
            protocol_contract_version: ProtocolContractVersion::V1,
            revert_options: RevertOptions::default(),
            is_cross_chain_call: false,
        }
    }

    #[test]
    fn test_inbound_digest_ignores_creator_and_height() {
        let a = sample_inbound();
        let mut b = sample_inbound();
        b.creator = "zeta1other".to_string();
        b.inbound_block_height = 999;
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_inbound_digest_covers_event_fields() {
        let base = sample_inbound().digest();

        let mut v = sample_inbound();
        v.amount = "1001".to_string();
        assert_ne!(v.digest(), base);

        let mut v = sample_inbound();
        v.event_index = 5;
        assert_ne!(v.digest(), base);

        let mut v = sample_inbound();
        v.inbound_hash = "0xbbbb".to_string();
        assert_ne!(v.digest(), base);

        let mut v = sample_inbound();
        v.coin_type = CoinType::Gas;
        assert_ne!(v.digest(), base);

        let mut v = sample_inbound();
        v.message = "00".to_string();
        assert_ne!(v.digest(), base);
    }

    #[test]
    fn test_outbound_digest_ignores_creator() {
        let a = OutboundVote {
            creator: "zeta1a".to_string(),
            cctx_hash: "0xcc".to_string(),
            observed_outbound_hash: "0xdd".to_string(),
            observed_outbound_block_height: 10,
            observed_outbound_gas_used: 21_000,
            observed_outbound_effective_gas_price: "1000000000".to_string(),
            observed_outbound_gas_limit: 100_000,
            value_received: "5".to_string(),
            status: ReceiveStatus::Success,
            outbound_chain: 1337,
            outbound_tss_nonce: 3,
            coin_type: CoinType::Gas,
        };
        let mut b = a.clone();
        b.creator = "zeta1b".to_string();
        assert_eq!(a.digest(), b.digest());

        b.status = ReceiveStatus::Failed;
        assert_ne!(a.digest(), b.digest());
    }
}
