//! Outbound transaction parameters derived from a CCTX
//!
//! [`build_outbound_data`] never queries a chain. Everything it needs comes
//! from the CCTX, the pending cache and the compliance filter, so each
//! branch is unit-testable.

use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use eyre::{eyre, Result, WrapErr};
use tracing::{info, warn};

use super::kind::{classify_outbound, ClassifyError, OutboundFacts, OutboundKind};
use crate::compliance::{log_restricted, ComplianceFilter};
use crate::pending::PendingTxCache;
use crate::types::{parse_amount, CctxStatus, ChainId, CoinType, CrossChainTx};

pub const MIN_GAS_LIMIT: u64 = 100_000;
pub const MAX_GAS_LIMIT: u64 = 1_000_000;

/// Chain-side inputs of the builder
pub struct BuildContext<'a> {
    /// Chain this signer serves
    pub chain_id: ChainId,
    pub tss_address: Address,
    /// Consensus height the signing round is bound to
    pub height: u64,
    pub pending: &'a PendingTxCache,
    pub compliance: &'a ComplianceFilter,
}

/// Concrete parameters of one outbound transaction
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundData {
    pub kind: OutboundKind,
    pub cctx_index: B256,
    pub src_chain_id: ChainId,
    pub to_chain_id: ChainId,
    /// Inbound sender, as recorded (may be non-EVM)
    pub sender: String,
    /// Transaction or call recipient on this chain
    pub to: Address,
    /// ERC20 asset, zero for native value
    pub asset: Address,
    pub amount: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub height: u64,
    pub message: Vec<u8>,
    pub revert_message: Vec<u8>,
    /// Receiver of the first outbound attempt, the target a revert undoes
    pub origin_receiver: String,
    pub origin_chain_id: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// CCTX is in a status without an outbound
    NotOutbound(CctxStatus),
    /// A pending transaction for the nonce pays at least as much
    Wait { pending_gas_price: u128, gas_price: u128 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Ready(Box<OutboundData>),
    Skip(SkipReason),
}

/// Clamp a gas limit into `[MIN_GAS_LIMIT, MAX_GAS_LIMIT]`
pub fn clamp_gas_limit(gas_limit: u64) -> u64 {
    gas_limit.clamp(MIN_GAS_LIMIT, MAX_GAS_LIMIT)
}

/// Decode a hex payload (optional `0x`). Undecodable payloads become empty.
pub fn decode_message(raw: &str, cctx_index: &str) -> Vec<u8> {
    let trimmed = raw.trim().trim_start_matches("0x");
    match hex::decode(trimmed) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(cctx = %cctx_index, error = %e, "Undecodable relayed message, sending without it");
            Vec::new()
        }
    }
}

fn parse_address(value: &str, what: &str) -> Result<Address> {
    Address::from_str(value.trim()).map_err(|e| eyre!("invalid {} {:?}: {}", what, value, e))
}

/// Chain and receiver the current attempt targets.
///
/// A revert goes back to the sender chain, to the revert address if one was
/// given and to the inbound sender otherwise.
pub fn outbound_destination(cctx: &CrossChainTx) -> Result<(ChainId, &str)> {
    let params = cctx.current_outbound()?;
    Ok(match cctx.status() {
        CctxStatus::PendingRevert => {
            let revert_address = cctx.revert_options.revert_address.trim();
            let receiver = if revert_address.is_empty() {
                cctx.inbound_params.sender.as_str()
            } else {
                revert_address
            };
            (cctx.inbound_params.sender_chain_id, receiver)
        }
        _ => (params.receiver_chain_id, params.receiver.as_str()),
    })
}

/// Shape of the transaction signed for `cctx`
pub fn outbound_kind_for(cctx: &CrossChainTx, compliance: &ComplianceFilter) -> Result<OutboundKind> {
    let (_, receiver) = outbound_destination(cctx)?;
    let restricted = compliance.is_cctx_restricted(cctx) || compliance.is_restricted(receiver);
    let has_message = !decode_message(&cctx.relayed_message, &cctx.index).is_empty();
    classify_outbound(&OutboundFacts::from_cctx(cctx, has_message, restricted))
        .map_err(|e| eyre!(e).wrap_err(format!("cctx {}", cctx.index)))
}

pub fn build_outbound_data(cctx: &CrossChainTx, ctx: &BuildContext<'_>) -> Result<BuildOutcome> {
    let status = cctx.status();
    if !status.is_pending() {
        return Ok(BuildOutcome::Skip(SkipReason::NotOutbound(status)));
    }

    let params = cctx.current_outbound()?;
    let nonce = params.tss_nonce;
    let (to_chain_id, receiver) = outbound_destination(cctx)?;

    if to_chain_id != ctx.chain_id {
        return Err(eyre!(
            "cctx {} targets chain {}, signer serves chain {}",
            cctx.index,
            to_chain_id,
            ctx.chain_id
        ));
    }

    let gas_limit = clamp_gas_limit(params.gas_limit);
    if gas_limit != params.gas_limit {
        warn!(
            cctx = %cctx.index,
            nonce,
            requested = params.gas_limit,
            clamped = gas_limit,
            "Gas limit clamped"
        );
    }

    let gas_price: u128 = params
        .gas_price
        .trim()
        .parse()
        .map_err(|e| eyre!("cctx {} has malformed gas price {:?}: {}", cctx.index, params.gas_price, e))?;

    if let Some(pending_gas_price) = ctx.pending.pending_gas_price(nonce) {
        if gas_price <= pending_gas_price {
            info!(
                cctx = %cctx.index,
                nonce,
                pending_gas_price,
                gas_price,
                "Pending outbound pays at least as much, waiting"
            );
            return Ok(BuildOutcome::Skip(SkipReason::Wait {
                pending_gas_price,
                gas_price,
            }));
        }
    }

    let message = decode_message(&cctx.relayed_message, &cctx.index);
    let revert_message = decode_message(&cctx.revert_options.revert_message, &cctx.index);

    let restricted =
        ctx.compliance.is_cctx_restricted(cctx) || ctx.compliance.is_restricted(receiver);
    if restricted {
        log_restricted(
            ctx.chain_id,
            false,
            &cctx.inbound_params.observed_hash,
            &cctx.inbound_params.sender,
            receiver,
        );
    }

    let facts = OutboundFacts::from_cctx(cctx, !message.is_empty(), restricted);
    let kind = match classify_outbound(&facts) {
        Ok(kind) => kind,
        Err(ClassifyError::NotOutbound(status)) => {
            return Ok(BuildOutcome::Skip(SkipReason::NotOutbound(status)))
        }
        Err(e) => return Err(eyre!(e).wrap_err(format!("cctx {}", cctx.index))),
    };

    let origin = cctx.original_outbound()?;

    let cctx_index =
        B256::from_str(&cctx.index).wrap_err_with(|| format!("invalid cctx index {}", cctx.index))?;

    let (to, amount) = if kind == OutboundKind::Cancel {
        (ctx.tss_address, U256::ZERO)
    } else {
        (parse_address(receiver, "receiver")?, parse_amount(&params.amount)?)
    };

    let asset = match cctx.inbound_params.coin_type {
        CoinType::Erc20 if kind != OutboundKind::Cancel => {
            parse_address(&cctx.inbound_params.asset, "asset")?
        }
        _ => Address::ZERO,
    };

    Ok(BuildOutcome::Ready(Box::new(OutboundData {
        kind,
        cctx_index,
        src_chain_id: cctx.inbound_params.sender_chain_id,
        to_chain_id,
        sender: cctx.inbound_params.sender.clone(),
        to,
        asset,
        amount,
        gas_limit,
        gas_price,
        nonce,
        height: ctx.height,
        message,
        revert_message,
        origin_receiver: origin.receiver.clone(),
        origin_chain_id: origin.receiver_chain_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_cctx, TxBuilder};

    const CHAIN: ChainId = 1337;

    struct Fixture {
        pending: PendingTxCache,
        compliance: ComplianceFilter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                pending: PendingTxCache::new(),
                compliance: ComplianceFilter::default(),
            }
        }

        fn ctx(&self) -> BuildContext<'_> {
            BuildContext {
                chain_id: CHAIN,
                tss_address: Address::repeat_byte(0x55),
                height: 42,
                pending: &self.pending,
                compliance: &self.compliance,
            }
        }
    }

    fn ready(outcome: BuildOutcome) -> OutboundData {
        match outcome {
            BuildOutcome::Ready(data) => *data,
            BuildOutcome::Skip(reason) => panic!("unexpected skip: {:?}", reason),
        }
    }

    #[test]
    fn test_gas_limit_clamped_up() {
        let fx = Fixture::new();
        let mut cctx = sample_cctx(CHAIN, 100, CoinType::Gas);
        cctx.outbound_params[0].gas_limit = 50_000;

        let data = ready(build_outbound_data(&cctx, &fx.ctx()).unwrap());
        assert_eq!(data.gas_limit, 100_000);
        assert_eq!(data.kind, OutboundKind::GasWithdraw);
    }

    #[test]
    fn test_gas_limit_clamped_down() {
        assert_eq!(clamp_gas_limit(5_000_000), MAX_GAS_LIMIT);
        assert_eq!(clamp_gas_limit(250_000), 250_000);
    }

    #[test]
    fn test_malformed_gas_price_is_error() {
        let fx = Fixture::new();
        let mut cctx = sample_cctx(CHAIN, 1, CoinType::Gas);
        cctx.outbound_params[0].gas_price = "1.5gwei".to_string();
        assert!(build_outbound_data(&cctx, &fx.ctx()).is_err());
    }

    #[test]
    fn test_wrong_chain_is_error() {
        let fx = Fixture::new();
        let cctx = sample_cctx(97, 1, CoinType::Gas);
        assert!(build_outbound_data(&cctx, &fx.ctx()).is_err());
    }

    #[test]
    fn test_terminal_status_skips() {
        let fx = Fixture::new();
        let mut cctx = sample_cctx(CHAIN, 1, CoinType::Gas);
        cctx.cctx_status.status = CctxStatus::OutboundMined;
        assert_eq!(
            build_outbound_data(&cctx, &fx.ctx()).unwrap(),
            BuildOutcome::Skip(SkipReason::NotOutbound(CctxStatus::OutboundMined))
        );
    }

    #[test]
    fn test_replacement_requires_strictly_higher_fee() {
        let fx = Fixture::new();
        let cctx = sample_cctx(CHAIN, 9, CoinType::Gas);
        let price: u128 = cctx.outbound_params[0].gas_price.parse().unwrap();

        fx.pending.set_pending(
            9,
            TxBuilder::new(B256::repeat_byte(1))
                .nonce(9)
                .gas_price(price)
                .build(),
        );
        assert_eq!(
            build_outbound_data(&cctx, &fx.ctx()).unwrap(),
            BuildOutcome::Skip(SkipReason::Wait {
                pending_gas_price: price,
                gas_price: price
            })
        );

        fx.pending.clear_pending(9);
        fx.pending.set_pending(
            9,
            TxBuilder::new(B256::repeat_byte(1))
                .nonce(9)
                .gas_price(price - 1)
                .build(),
        );
        let data = ready(build_outbound_data(&cctx, &fx.ctx()).unwrap());
        assert_eq!(data.gas_price, price);
    }

    #[test]
    fn test_bad_message_becomes_empty() {
        let fx = Fixture::new();
        let mut cctx = sample_cctx(CHAIN, 1, CoinType::Gas);
        cctx.relayed_message = "zz-not-hex".to_string();
        let data = ready(build_outbound_data(&cctx, &fx.ctx()).unwrap());
        assert!(data.message.is_empty());
    }

    #[test]
    fn test_pending_revert_routes_to_sender() {
        let fx = Fixture::new();
        let mut cctx = sample_cctx(CHAIN, 3, CoinType::Gas);
        cctx.inbound_params.sender_chain_id = CHAIN;
        cctx.outbound_params[0].receiver_chain_id = 7000;
        let mut revert = cctx.outbound_params[0].clone();
        revert.receiver_chain_id = CHAIN;
        cctx.outbound_params.push(revert);
        cctx.cctx_status.status = CctxStatus::PendingRevert;

        let data = ready(build_outbound_data(&cctx, &fx.ctx()).unwrap());
        assert_eq!(
            data.to,
            Address::from_str(&cctx.inbound_params.sender).unwrap()
        );
        assert_eq!(data.to_chain_id, CHAIN);
    }

    #[test]
    fn test_restricted_receiver_cancels() {
        let mut fx = Fixture::new();
        let cctx = sample_cctx(CHAIN, 4, CoinType::Erc20);
        fx.compliance = ComplianceFilter::new([cctx.outbound_params[0].receiver.as_str()]);

        let data = ready(build_outbound_data(&cctx, &fx.ctx()).unwrap());
        assert_eq!(data.kind, OutboundKind::Cancel);
        assert_eq!(data.to, Address::repeat_byte(0x55));
        assert_eq!(data.amount, U256::ZERO);
        assert_eq!(data.asset, Address::ZERO);
    }

    #[test]
    fn test_erc20_carries_asset() {
        let fx = Fixture::new();
        let cctx = sample_cctx(CHAIN, 4, CoinType::Erc20);
        let data = ready(build_outbound_data(&cctx, &fx.ctx()).unwrap());
        assert_eq!(data.kind, OutboundKind::Erc20Withdraw);
        assert_eq!(
            data.asset,
            Address::from_str(&cctx.inbound_params.asset).unwrap()
        );
    }
}
