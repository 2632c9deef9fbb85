//! Outbound signer
//!
//! Turns [`OutboundData`] into an EIP-155 legacy transaction, has the TSS
//! sign its hash, checks the signature recovers to the TSS address and
//! broadcasts it. Broadcast hashes go to the [`TrackerReporter`].

use std::str::FromStr;
use std::sync::{Arc, RwLock};

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Address, Bytes, PrimitiveSignature, TxKind, B256, U256};
use alloy::sol_types::SolCall;
use eyre::{Result, WrapErr};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::compliance::ComplianceFilter;
use crate::config::TrackerConfig;
use crate::contracts::{ERC20Custody, GatewayEVM, MessageContext, RevertContext, ZetaConnector};
use crate::metrics;
use crate::observer::{contract_address, ChainObserver};
use crate::outbound::{
    build_outbound_data, BuildContext, BuildOutcome, OutboundData, OutboundKind, SkipReason,
};
use crate::pending::PendingTxCache;
use crate::rpc::{ChainRpc, RpcTransaction};
use crate::tracker::TrackerReporter;
use crate::tss::TssSigner;
use crate::types::{ChainId, ChainParams, CrossChainTx};

pub mod broadcast;

pub use broadcast::{broadcast_with_retry, BroadcastConfig, BroadcastOutcome};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("signature recovers to {recovered}, expected TSS address {expected}")]
    AddressMismatch { expected: Address, recovered: Address },

    #[error("{0} contract address not set for chain {1}")]
    MissingContract(&'static str, ChainId),

    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

/// Contract addresses the signer calls, from chain params
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerContracts {
    pub custody: Option<Address>,
    pub connector: Option<Address>,
    pub gateway: Option<Address>,
}

/// Unsigned transaction fields for one outbound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTxRequest {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
}

/// A signed outbound ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedOutbound {
    pub tx_hash: B256,
    pub raw: Vec<u8>,
    pub nonce: u64,
    pub kind: OutboundKind,
    pub request: OutboundTxRequest,
}

impl SignedOutbound {
    /// The transaction as it looks in the mempool
    pub fn as_pending(&self, from: Address) -> RpcTransaction {
        RpcTransaction {
            hash: self.tx_hash,
            from,
            to: Some(self.request.to),
            nonce: self.nonce,
            value: self.request.value,
            input: self.request.input.clone(),
            gas: self.request.gas_limit,
            gas_price: Some(self.request.gas_price),
            block_number: None,
            transaction_index: None,
        }
    }
}

/// Result of one processing attempt
#[derive(Debug)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Broadcast {
        tx_hash: B256,
        outcome: BroadcastOutcome,
    },
}

/// Inbound sender as an EVM address, zero for non-EVM senders
fn sender_address(sender: &str) -> Address {
    Address::from_str(sender.trim()).unwrap_or_else(|_| {
        debug!(sender, "Inbound sender is not an EVM address");
        Address::ZERO
    })
}

/// Raw bytes of an address-like string, for `bytes` ABI fields
fn address_bytes(value: &str) -> Bytes {
    match Address::from_str(value.trim()) {
        Ok(address) => Bytes::copy_from_slice(address.as_slice()),
        Err(_) => Bytes::copy_from_slice(value.as_bytes()),
    }
}

pub struct Signer {
    chain_id: ChainId,
    rpc: Arc<dyn ChainRpc>,
    tss: Arc<dyn TssSigner>,
    pending: Arc<PendingTxCache>,
    compliance: Arc<ComplianceFilter>,
    tracker: TrackerReporter,
    contracts: RwLock<SignerContracts>,
    broadcast: BroadcastConfig,
}

impl Signer {
    pub fn new(
        chain_id: ChainId,
        rpc: Arc<dyn ChainRpc>,
        tss: Arc<dyn TssSigner>,
        pending: Arc<PendingTxCache>,
        compliance: Arc<ComplianceFilter>,
        tracker: TrackerReporter,
    ) -> Self {
        Self {
            chain_id,
            rpc,
            tss,
            pending,
            compliance,
            tracker,
            contracts: RwLock::new(SignerContracts::default()),
            broadcast: BroadcastConfig::default(),
        }
    }

    /// Signer sharing the observer's RPC, pending cache and inclusion verifier
    pub fn for_observer(
        observer: &ChainObserver,
        tss: Arc<dyn TssSigner>,
        tracker: TrackerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let reporter = TrackerReporter::new(
            Arc::clone(observer.rpc()),
            Arc::clone(observer.consensus()),
            Arc::clone(observer.state()),
            Arc::clone(observer.inclusion()),
            tracker,
            shutdown,
        );
        Self::new(
            observer.chain_id(),
            Arc::clone(observer.rpc()),
            tss,
            Arc::clone(observer.pending()),
            Arc::clone(observer.compliance()),
            reporter,
        )
    }

    pub fn with_broadcast_config(mut self, config: BroadcastConfig) -> Self {
        self.broadcast = config;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn tss_address(&self) -> Address {
        self.tss.evm_address()
    }

    pub fn tracker(&self) -> &TrackerReporter {
        &self.tracker
    }

    pub fn contracts(&self) -> SignerContracts {
        *self.contracts.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Pick up contract addresses from refreshed chain params
    pub fn set_contracts(&self, params: &ChainParams) -> Result<()> {
        let contracts = SignerContracts {
            custody: contract_address(&params.erc20_custody_contract_address, "custody")?,
            connector: contract_address(&params.connector_contract_address, "connector")?,
            gateway: contract_address(&params.gateway_address, "gateway")?,
        };
        let mut current = self.contracts.write().unwrap_or_else(|e| e.into_inner());
        if *current != contracts {
            info!(chain_id = self.chain_id, ?contracts, "Signer contracts updated");
            *current = contracts;
        }
        Ok(())
    }

    fn require(&self, contract: Option<Address>, what: &'static str) -> Result<Address> {
        contract.ok_or_else(|| SignerError::MissingContract(what, self.chain_id).into())
    }

    /// Transaction fields for `data`, one shape per outbound kind
    pub fn build_tx_request(&self, data: &OutboundData) -> Result<OutboundTxRequest> {
        let contracts = self.contracts();
        let message = Bytes::from(data.message.clone());
        let revert_message = Bytes::from(data.revert_message.clone());
        let sender = sender_address(&data.sender);

        let (to, value, input) = match data.kind {
            OutboundKind::Cancel => (self.tss_address(), U256::ZERO, Bytes::new()),
            OutboundKind::GasWithdraw => (data.to, data.amount, Bytes::new()),
            OutboundKind::Erc20Withdraw => {
                let call = ERC20Custody::withdrawCall {
                    recipient: data.to,
                    asset: data.asset,
                    amount: data.amount,
                };
                (self.require(contracts.custody, "custody")?, U256::ZERO, call.abi_encode().into())
            }
            OutboundKind::Erc20WithdrawAndCall => {
                let call = ERC20Custody::withdrawAndCallCall {
                    messageContext: MessageContext { sender },
                    to: data.to,
                    token: data.asset,
                    amount: data.amount,
                    data: message,
                };
                (self.require(contracts.custody, "custody")?, U256::ZERO, call.abi_encode().into())
            }
            OutboundKind::GasWithdrawAndCall | OutboundKind::Call => {
                let value = if data.kind == OutboundKind::Call {
                    U256::ZERO
                } else {
                    data.amount
                };
                let call = GatewayEVM::executeCall {
                    messageContext: MessageContext { sender },
                    destination: data.to,
                    data: message,
                };
                (self.require(contracts.gateway, "gateway")?, value, call.abi_encode().into())
            }
            OutboundKind::GasRevertAndCall => {
                let call = GatewayEVM::executeRevertCall {
                    destination: data.to,
                    data: Bytes::new(),
                    revertContext: RevertContext {
                        sender,
                        asset: Address::ZERO,
                        amount: data.amount,
                        revertMessage: revert_message,
                    },
                };
                (self.require(contracts.gateway, "gateway")?, data.amount, call.abi_encode().into())
            }
            OutboundKind::Erc20RevertAndCall => {
                let call = ERC20Custody::withdrawAndRevertCall {
                    to: data.to,
                    token: data.asset,
                    amount: data.amount,
                    data: Bytes::new(),
                    revertContext: RevertContext {
                        sender,
                        asset: data.asset,
                        amount: data.amount,
                        revertMessage: revert_message,
                    },
                };
                (self.require(contracts.custody, "custody")?, U256::ZERO, call.abi_encode().into())
            }
            OutboundKind::ConnectorOnReceive => {
                let call = ZetaConnector::onReceiveCall {
                    zetaTxSenderAddress: address_bytes(&data.sender),
                    sourceChainId: U256::from(data.src_chain_id),
                    destinationAddress: data.to,
                    zetaValue: data.amount,
                    message,
                    internalSendHash: data.cctx_index,
                };
                (self.require(contracts.connector, "connector")?, U256::ZERO, call.abi_encode().into())
            }
            OutboundKind::ConnectorOnRevert => {
                let call = ZetaConnector::onRevertCall {
                    zetaTxSenderAddress: data.to,
                    sourceChainId: U256::from(data.src_chain_id),
                    destinationAddress: address_bytes(&data.origin_receiver),
                    destinationChainId: U256::from(data.origin_chain_id),
                    remainingZetaValue: data.amount,
                    message,
                    internalSendHash: data.cctx_index,
                };
                (self.require(contracts.connector, "connector")?, U256::ZERO, call.abi_encode().into())
            }
        };

        Ok(OutboundTxRequest {
            to,
            value,
            input,
            gas_limit: data.gas_limit,
            gas_price: data.gas_price,
            nonce: data.nonce,
        })
    }

    /// Sign `data` through the TSS and assemble the raw transaction
    pub async fn sign(&self, data: &OutboundData) -> Result<SignedOutbound> {
        let request = self.build_tx_request(data)?;
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: request.nonce,
            gas_price: request.gas_price,
            gas_limit: request.gas_limit,
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.input.clone(),
        };
        let digest = tx.signature_hash();

        let sig = self
            .tss
            .sign(digest, data.height, data.nonce, self.chain_id)
            .await
            .wrap_err_with(|| format!("TSS keysign failed for nonce {}", data.nonce))?;
        let signature = PrimitiveSignature::new(
            U256::from_be_slice(&sig[..32]),
            U256::from_be_slice(&sig[32..64]),
            sig[64] == 1,
        );

        let recovered = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| SignerError::Recovery(e.to_string()))?;
        let expected = self.tss_address();
        if recovered != expected {
            error!(
                chain_id = self.chain_id,
                nonce = data.nonce,
                %expected,
                %recovered,
                "TSS signature recovers to the wrong address"
            );
            return Err(SignerError::AddressMismatch {
                expected,
                recovered,
            }
            .into());
        }

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let raw = envelope.encoded_2718();
        let tx_hash = keccak256(&raw);

        debug!(
            chain_id = self.chain_id,
            nonce = data.nonce,
            kind = %data.kind,
            tx_hash = %tx_hash,
            "Signed outbound"
        );
        Ok(SignedOutbound {
            tx_hash,
            raw,
            nonce: data.nonce,
            kind: data.kind,
            request,
        })
    }

    /// Broadcast `signed` and hand it to the tracker reporter unless the node
    /// dropped it. Only a transaction a node accepted is recorded as pending,
    /// so a refused one never blocks the next attempt at the same fee.
    pub async fn broadcast(&self, signed: &SignedOutbound) -> BroadcastOutcome {
        let outcome = broadcast_with_retry(
            self.rpc.as_ref(),
            &signed.raw,
            signed.tx_hash,
            self.chain_id,
            signed.nonce,
            &self.broadcast,
        )
        .await;
        metrics::record_broadcast(self.chain_id, outcome.as_str());

        match &outcome {
            BroadcastOutcome::Dropped { reason } => {
                info!(
                    chain_id = self.chain_id,
                    nonce = signed.nonce,
                    tx_hash = %signed.tx_hash,
                    reason = %reason,
                    "Outbound dropped by node"
                );
            }
            BroadcastOutcome::Exhausted { last_error } => {
                warn!(
                    chain_id = self.chain_id,
                    nonce = signed.nonce,
                    tx_hash = %signed.tx_hash,
                    error = %last_error,
                    "Broadcast attempts exhausted, tracking hash anyway"
                );
            }
            BroadcastOutcome::Rejected { reason } => {
                warn!(
                    chain_id = self.chain_id,
                    nonce = signed.nonce,
                    tx_hash = %signed.tx_hash,
                    reason = %reason,
                    "Outbound rejected by node, retrying on a later tick"
                );
            }
            _ => {}
        }

        if outcome.is_pending() {
            self.pending
                .set_pending(signed.nonce, signed.as_pending(self.tss_address()));
        }
        if outcome.should_report() {
            self.tracker.report(signed.nonce, signed.tx_hash);
        }
        outcome
    }

    /// Build, sign and broadcast the outbound of `cctx`
    pub async fn try_process_outbound(&self, cctx: &CrossChainTx, height: u64) -> Result<ProcessOutcome> {
        let ctx = BuildContext {
            chain_id: self.chain_id,
            tss_address: self.tss_address(),
            height,
            pending: &self.pending,
            compliance: &self.compliance,
        };

        let data = match build_outbound_data(cctx, &ctx)? {
            BuildOutcome::Ready(data) => data,
            BuildOutcome::Skip(reason) => {
                debug!(chain_id = self.chain_id, cctx = %cctx.index, ?reason, "Outbound skipped");
                return Ok(ProcessOutcome::Skipped(reason));
            }
        };

        info!(
            chain_id = self.chain_id,
            cctx = %cctx.index,
            nonce = data.nonce,
            kind = %data.kind,
            revert = data.kind.is_revert(),
            to = %data.to,
            amount = %data.amount,
            gas_price = data.gas_price,
            "Processing outbound"
        );

        let signed = self
            .sign(&data)
            .await
            .inspect_err(|_| metrics::record_error(self.chain_id, "sign"))?;
        let outcome = self.broadcast(&signed).await;
        if outcome.is_pending() {
            info!(
                chain_id = self.chain_id,
                cctx = %cctx.index,
                nonce = data.nonce,
                tx_hash = %signed.tx_hash,
                "Outbound broadcast"
            );
        }
        Ok(ProcessOutcome::Broadcast {
            tx_hash: signed.tx_hash,
            outcome,
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("chain_id", &self.chain_id)
            .field("contracts", &self.contracts())
            .finish_non_exhaustive()
    }
}
