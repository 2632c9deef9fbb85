//! Outbound transaction shapes
//!
//! Which transaction the signer builds for a CCTX is a pure function of the
//! CCTX itself: status, coin type, protocol version, whether a message is
//! relayed, whether the revert wants a callback, and the compliance flag.
//! Nothing here touches the network.

use std::fmt;

use thiserror::Error;

use crate::types::{CctxStatus, CoinType, CrossChainTx, ProtocolContractVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundKind {
    /// Zero-value self transfer that burns the nonce of a restricted CCTX
    Cancel,
    /// Plain native-value transfer
    GasWithdraw,
    /// `ERC20Custody.withdraw`
    Erc20Withdraw,
    /// `GatewayEVM.execute` carrying native value
    GasWithdrawAndCall,
    /// `ERC20Custody.withdrawAndCall`
    Erc20WithdrawAndCall,
    /// `GatewayEVM.execute` without value
    Call,
    /// `ZetaConnector.onReceive`
    ConnectorOnReceive,
    /// `ZetaConnector.onRevert`
    ConnectorOnRevert,
    /// `GatewayEVM.executeRevert` carrying the refunded native value
    GasRevertAndCall,
    /// `ERC20Custody.withdrawAndRevert`
    Erc20RevertAndCall,
}

impl OutboundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundKind::Cancel => "cancel",
            OutboundKind::GasWithdraw => "gas_withdraw",
            OutboundKind::Erc20Withdraw => "erc20_withdraw",
            OutboundKind::GasWithdrawAndCall => "gas_withdraw_and_call",
            OutboundKind::Erc20WithdrawAndCall => "erc20_withdraw_and_call",
            OutboundKind::Call => "call",
            OutboundKind::ConnectorOnReceive => "connector_on_receive",
            OutboundKind::ConnectorOnRevert => "connector_on_revert",
            OutboundKind::GasRevertAndCall => "gas_revert_and_call",
            OutboundKind::Erc20RevertAndCall => "erc20_revert_and_call",
        }
    }

    /// Whether the transaction is a revert back to the inbound sender
    pub fn is_revert(&self) -> bool {
        matches!(
            self,
            OutboundKind::ConnectorOnRevert
                | OutboundKind::GasRevertAndCall
                | OutboundKind::Erc20RevertAndCall
        )
    }
}

impl fmt::Display for OutboundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("status {0} has no outbound")]
    NotOutbound(CctxStatus),

    #[error("unsupported outbound: coin type {coin_type} status {status} protocol {version:?}")]
    Unsupported {
        coin_type: CoinType,
        status: CctxStatus,
        version: ProtocolContractVersion,
    },
}

/// Everything classification depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundFacts {
    pub status: CctxStatus,
    pub coin_type: CoinType,
    pub version: ProtocolContractVersion,
    pub has_message: bool,
    pub call_on_revert: bool,
    pub restricted: bool,
}

impl OutboundFacts {
    pub fn from_cctx(cctx: &CrossChainTx, has_message: bool, restricted: bool) -> Self {
        Self {
            status: cctx.status(),
            coin_type: cctx.inbound_params.coin_type,
            version: cctx.protocol_contract_version,
            has_message,
            call_on_revert: cctx.revert_options.call_on_revert,
            restricted,
        }
    }
}

pub fn classify_outbound(facts: &OutboundFacts) -> Result<OutboundKind, ClassifyError> {
    use CctxStatus::{PendingOutbound, PendingRevert};
    use CoinType::{Erc20, Gas, NoAssetCall, Zeta};
    use ProtocolContractVersion::{V1, V2};

    if !facts.status.is_pending() {
        return Err(ClassifyError::NotOutbound(facts.status));
    }
    if facts.restricted {
        return Ok(OutboundKind::Cancel);
    }

    let kind = match (facts.version, facts.status, facts.coin_type) {
        (V1, PendingOutbound, Gas) => Some(OutboundKind::GasWithdraw),
        (V1, PendingOutbound, Erc20) => Some(OutboundKind::Erc20Withdraw),
        (V1, PendingOutbound, Zeta) => Some(OutboundKind::ConnectorOnReceive),
        (V1, PendingRevert, Gas) => Some(OutboundKind::GasWithdraw),
        (V1, PendingRevert, Erc20) => Some(OutboundKind::Erc20Withdraw),
        (V1, PendingRevert, Zeta) => Some(OutboundKind::ConnectorOnRevert),

        (V2, PendingOutbound, Gas) if facts.has_message => Some(OutboundKind::GasWithdrawAndCall),
        (V2, PendingOutbound, Gas) => Some(OutboundKind::GasWithdraw),
        (V2, PendingOutbound, Erc20) if facts.has_message => {
            Some(OutboundKind::Erc20WithdrawAndCall)
        }
        (V2, PendingOutbound, Erc20) => Some(OutboundKind::Erc20Withdraw),
        (V2, PendingOutbound, NoAssetCall) => Some(OutboundKind::Call),
        (V2, PendingRevert, Gas) if facts.call_on_revert => Some(OutboundKind::GasRevertAndCall),
        (V2, PendingRevert, Gas) => Some(OutboundKind::GasWithdraw),
        (V2, PendingRevert, Erc20) if facts.call_on_revert => {
            Some(OutboundKind::Erc20RevertAndCall)
        }
        (V2, PendingRevert, Erc20) => Some(OutboundKind::Erc20Withdraw),
        (V2, PendingRevert, NoAssetCall) if facts.call_on_revert => {
            Some(OutboundKind::GasRevertAndCall)
        }

        _ => None,
    };

    kind.ok_or(ClassifyError::Unsupported {
        coin_type: facts.coin_type,
        status: facts.status,
        version: facts.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(
        version: ProtocolContractVersion,
        status: CctxStatus,
        coin_type: CoinType,
    ) -> OutboundFacts {
        OutboundFacts {
            status,
            coin_type,
            version,
            has_message: false,
            call_on_revert: false,
            restricted: false,
        }
    }

    #[test]
    fn test_restricted_is_cancel() {
        let mut f = facts(
            ProtocolContractVersion::V2,
            CctxStatus::PendingOutbound,
            CoinType::Erc20,
        );
        f.restricted = true;
        f.has_message = true;
        assert_eq!(classify_outbound(&f), Ok(OutboundKind::Cancel));
    }

    #[test]
    fn test_terminal_status_not_outbound() {
        let mut f = facts(
            ProtocolContractVersion::V1,
            CctxStatus::OutboundMined,
            CoinType::Gas,
        );
        f.restricted = true;
        assert_eq!(
            classify_outbound(&f),
            Err(ClassifyError::NotOutbound(CctxStatus::OutboundMined))
        );
    }

    #[test]
    fn test_v1_shapes() {
        use CctxStatus::*;
        use CoinType::*;
        let v1 = ProtocolContractVersion::V1;
        assert_eq!(
            classify_outbound(&facts(v1, PendingOutbound, Gas)),
            Ok(OutboundKind::GasWithdraw)
        );
        assert_eq!(
            classify_outbound(&facts(v1, PendingOutbound, Erc20)),
            Ok(OutboundKind::Erc20Withdraw)
        );
        assert_eq!(
            classify_outbound(&facts(v1, PendingOutbound, Zeta)),
            Ok(OutboundKind::ConnectorOnReceive)
        );
        assert_eq!(
            classify_outbound(&facts(v1, PendingRevert, Zeta)),
            Ok(OutboundKind::ConnectorOnRevert)
        );
        assert!(classify_outbound(&facts(v1, PendingOutbound, NoAssetCall)).is_err());
    }

    #[test]
    fn test_v2_message_selects_call_variants() {
        use CctxStatus::*;
        use CoinType::*;
        let v2 = ProtocolContractVersion::V2;

        let mut f = facts(v2, PendingOutbound, Gas);
        assert_eq!(classify_outbound(&f), Ok(OutboundKind::GasWithdraw));
        f.has_message = true;
        assert_eq!(classify_outbound(&f), Ok(OutboundKind::GasWithdrawAndCall));

        let mut f = facts(v2, PendingOutbound, Erc20);
        f.has_message = true;
        assert_eq!(classify_outbound(&f), Ok(OutboundKind::Erc20WithdrawAndCall));

        assert_eq!(
            classify_outbound(&facts(v2, PendingOutbound, NoAssetCall)),
            Ok(OutboundKind::Call)
        );
    }

    #[test]
    fn test_v2_revert_shapes() {
        use CctxStatus::*;
        use CoinType::*;
        let v2 = ProtocolContractVersion::V2;

        assert_eq!(
            classify_outbound(&facts(v2, PendingRevert, Erc20)),
            Ok(OutboundKind::Erc20Withdraw)
        );

        let mut f = facts(v2, PendingRevert, Erc20);
        f.call_on_revert = true;
        assert_eq!(classify_outbound(&f), Ok(OutboundKind::Erc20RevertAndCall));
        assert!(OutboundKind::Erc20RevertAndCall.is_revert());

        let mut f = facts(v2, PendingRevert, Gas);
        f.call_on_revert = true;
        assert_eq!(classify_outbound(&f), Ok(OutboundKind::GasRevertAndCall));

        // nothing to refund and no callback requested
        assert!(classify_outbound(&facts(v2, PendingRevert, NoAssetCall)).is_err());
        assert!(classify_outbound(&facts(v2, PendingOutbound, Zeta)).is_err());
    }
}
