//! Inbound observation: window scan, per-category voting, inbound trackers

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use base64::Engine;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, error, info, warn};

use super::events::{
    collect_events, dedup_by_tx, ParsedEvent, TOPICS_DEPOSITED, TOPICS_GATEWAY_CALLED,
    TOPICS_GATEWAY_DEPOSITED, TOPICS_GATEWAY_DEPOSITED_AND_CALLED, TOPICS_ZETA_SENT,
};
use super::{contract_address, ChainObserver, ObserverError};
use crate::compliance::{is_donation, log_restricted};
use crate::confirmation::has_enough_confirmations;
use crate::contracts::{self, ERC20Custody::Deposited, GatewayEVM, ZetaConnector::ZetaSent};
use crate::metrics;
use crate::rpc::{LogFilter, RpcReceipt, RpcTransaction};
use crate::types::{ChainParams, CoinType, ProtocolContractVersion, RevertOptions};
use crate::vote::{InboundVote, ERC20_DEPOSIT_GAS_LIMIT, GAS_DEPOSIT_GAS_LIMIT, GATEWAY_INBOUND_GAS_LIMIT};

/// Inbound trackers handled per tick
pub const MAX_INBOUND_TRACKERS_PER_TICK: usize = 50;

/// Receiver encoded in the first 20 bytes of a legacy memo, if non-zero
fn legacy_memo_receiver(message: &[u8]) -> Option<String> {
    if message.len() < 20 {
        return None;
    }
    let address = Address::from_slice(&message[..20]);
    (address != Address::ZERO).then(|| address.to_string())
}

fn bytes_to_eth_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Empty for the zero address
fn optional_address(address: Address) -> String {
    if address == Address::ZERO {
        String::new()
    } else {
        address.to_string()
    }
}

/// Zero asset is the gas token, the zeta token is Zeta, anything else ERC20
fn gateway_coin_type(asset: Address, zeta_token: &str) -> CoinType {
    if asset == Address::ZERO {
        CoinType::Gas
    } else if !zeta_token.is_empty() && asset.to_string().eq_ignore_ascii_case(zeta_token.trim()) {
        CoinType::Zeta
    } else {
        CoinType::Erc20
    }
}

impl From<&contracts::RevertOptions> for RevertOptions {
    fn from(options: &contracts::RevertOptions) -> Self {
        Self {
            revert_address: optional_address(options.revertAddress),
            call_on_revert: options.callOnRevert,
            abort_address: optional_address(options.abortAddress),
            revert_message: hex::encode(&options.revertMessage),
            revert_gas_limit: saturating_u64(options.onRevertGasLimit),
        }
    }
}

/// Inbound event emitted by the gateway contract
trait GatewayInbound: SolEvent + Send + Sync {
    const TOPICS: usize;
    const LABEL: &'static str;

    fn sender(&self) -> Address;
    fn receiver(&self) -> Address;
    fn amount(&self) -> U256;
    /// None for calls carrying no asset
    fn asset(&self) -> Option<Address>;
    fn payload(&self) -> &[u8];
    fn revert_options(&self) -> &contracts::RevertOptions;
    fn is_cross_chain_call(&self) -> bool;
}

impl GatewayInbound for GatewayEVM::Deposited {
    const TOPICS: usize = TOPICS_GATEWAY_DEPOSITED;
    const LABEL: &'static str = "Deposited";

    fn sender(&self) -> Address {
        self.sender
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn amount(&self) -> U256 {
        self.amount
    }
    fn asset(&self) -> Option<Address> {
        Some(self.asset)
    }
    fn payload(&self) -> &[u8] {
        &self.payload
    }
    fn revert_options(&self) -> &contracts::RevertOptions {
        &self.revertOptions
    }
    // older gateways emit deposit-and-call as a Deposited with a payload
    fn is_cross_chain_call(&self) -> bool {
        !self.payload.is_empty()
    }
}

impl GatewayInbound for GatewayEVM::DepositedAndCalled {
    const TOPICS: usize = TOPICS_GATEWAY_DEPOSITED_AND_CALLED;
    const LABEL: &'static str = "DepositedAndCalled";

    fn sender(&self) -> Address {
        self.sender
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn amount(&self) -> U256 {
        self.amount
    }
    fn asset(&self) -> Option<Address> {
        Some(self.asset)
    }
    fn payload(&self) -> &[u8] {
        &self.payload
    }
    fn revert_options(&self) -> &contracts::RevertOptions {
        &self.revertOptions
    }
    fn is_cross_chain_call(&self) -> bool {
        true
    }
}

impl GatewayInbound for GatewayEVM::Called {
    const TOPICS: usize = TOPICS_GATEWAY_CALLED;
    const LABEL: &'static str = "Called";

    fn sender(&self) -> Address {
        self.sender
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn amount(&self) -> U256 {
        U256::ZERO
    }
    fn asset(&self) -> Option<Address> {
        None
    }
    fn payload(&self) -> &[u8] {
        &self.payload
    }
    fn revert_options(&self) -> &contracts::RevertOptions {
        &self.revertOptions
    }
    fn is_cross_chain_call(&self) -> bool {
        false
    }
}

impl ChainObserver {
    /// Scan the next confirmed window and vote every inbound in it.
    ///
    /// Returns the last scanned block after this tick.
    pub async fn observe_inbound(&self) -> Result<u64> {
        let chain_id = self.chain_id();
        let height = self
            .rpc
            .block_number()
            .await
            .wrap_err_with(|| format!("error getting block number for chain {}", chain_id))?;
        self.state.observe_block_height(height)?;
        metrics::set_last_block(chain_id, height);

        let params = self.state.params();
        let last_scanned = self.state.last_block_scanned();
        let confirmed = height.saturating_sub(params.confirmation_count);
        if confirmed <= last_scanned {
            return Ok(last_scanned);
        }

        let start = last_scanned + 1;
        let end = confirmed.min(last_scanned.saturating_add(self.config.max_blocks_per_batch));
        debug!(chain_id, start, end, height, "Scanning inbound window");

        let scanned = [
            self.observe_erc20_deposited(&params, start, end).await,
            self.observe_zeta_sent(&params, start, end).await,
            self.observe_tss_receive(start, end).await,
            self.observe_gateway::<GatewayEVM::Deposited>(&params, start, end).await,
            self.observe_gateway::<GatewayEVM::Called>(&params, start, end).await,
            self.observe_gateway::<GatewayEVM::DepositedAndCalled>(&params, start, end).await,
        ];
        let lowest = scanned.into_iter().min().unwrap_or(last_scanned);

        if lowest > last_scanned {
            let stored = self
                .checkpoints
                .save(chain_id, lowest)
                .await
                .wrap_err_with(|| format!("error saving checkpoint for chain {}", chain_id))?;
            self.state.set_last_block_scanned(lowest);
            metrics::record_blocks_scanned(chain_id, lowest - last_scanned, lowest);
            info!(chain_id, from = start, to = lowest, stored, "Scanned inbound blocks");
        }

        Ok(lowest.max(last_scanned))
    }

    /// Custody deposits in `[start, end]`; returns the last block fully voted
    async fn observe_erc20_deposited(&self, params: &ChainParams, start: u64, end: u64) -> u64 {
        let chain_id = self.chain_id();
        let custody = match contract_address(&params.erc20_custody_contract_address, "custody") {
            Ok(Some(address)) => address,
            Ok(None) => return end,
            Err(e) => {
                error!(chain_id, error = %e, "Cannot scan custody deposits");
                return start - 1;
            }
        };

        let filter = LogFilter {
            from_block: start,
            to_block: end,
            address: custody,
            topic0: Deposited::SIGNATURE_HASH,
        };
        let logs = match self.rpc.get_logs(&filter).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(chain_id, start, end, error = %e, "Error fetching Deposited logs");
                metrics::record_error(chain_id, "get_logs");
                return start - 1;
            }
        };

        let events = collect_events::<Deposited>(chain_id, &logs, custody, None, TOPICS_DEPOSITED);
        for event in dedup_by_tx(chain_id, events) {
            let sender = match self.rpc.transaction_by_hash(event.tx_hash).await {
                Ok(Some(tx)) => tx.from,
                Ok(None) => {
                    warn!(chain_id, tx_hash = %event.tx_hash, "Deposit transaction not found");
                    return event.block_number - 1;
                }
                Err(e) => {
                    warn!(chain_id, tx_hash = %event.tx_hash, error = %e, "Error fetching deposit transaction");
                    return event.block_number - 1;
                }
            };

            if let Some(vote) = self.deposited_vote(&event, sender) {
                if let Err(e) = self.post_inbound_vote(&vote).await {
                    error!(chain_id, tx_hash = %event.tx_hash, error = %e, "Error posting inbound vote");
                    return event.block_number - 1;
                }
            }
        }
        end
    }

    /// Connector sends in `[start, end]`; returns the last block fully voted
    async fn observe_zeta_sent(&self, params: &ChainParams, start: u64, end: u64) -> u64 {
        let chain_id = self.chain_id();
        let connector = match contract_address(&params.connector_contract_address, "connector") {
            Ok(Some(address)) => address,
            Ok(None) => return end,
            Err(e) => {
                error!(chain_id, error = %e, "Cannot scan connector sends");
                return start - 1;
            }
        };

        let filter = LogFilter {
            from_block: start,
            to_block: end,
            address: connector,
            topic0: ZetaSent::SIGNATURE_HASH,
        };
        let logs = match self.rpc.get_logs(&filter).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(chain_id, start, end, error = %e, "Error fetching ZetaSent logs");
                metrics::record_error(chain_id, "get_logs");
                return start - 1;
            }
        };

        let events = collect_events::<ZetaSent>(chain_id, &logs, connector, None, TOPICS_ZETA_SENT);
        for event in dedup_by_tx(chain_id, events) {
            if let Some(vote) = self.zeta_sent_vote(params, &event) {
                if let Err(e) = self.post_inbound_vote(&vote).await {
                    error!(chain_id, tx_hash = %event.tx_hash, error = %e, "Error posting inbound vote");
                    return event.block_number - 1;
                }
            }
        }
        end
    }

    /// Gateway events of one kind in `[start, end]`; returns the last block fully voted
    async fn observe_gateway<E: GatewayInbound>(&self, params: &ChainParams, start: u64, end: u64) -> u64 {
        let chain_id = self.chain_id();
        let gateway = match contract_address(&params.gateway_address, "gateway") {
            Ok(Some(address)) => address,
            Ok(None) => return end,
            Err(e) => {
                error!(chain_id, error = %e, event = E::LABEL, "Cannot scan gateway events");
                return start - 1;
            }
        };

        let filter = LogFilter {
            from_block: start,
            to_block: end,
            address: gateway,
            topic0: E::SIGNATURE_HASH,
        };
        let logs = match self.rpc.get_logs(&filter).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(chain_id, start, end, event = E::LABEL, error = %e, "Error fetching gateway logs");
                metrics::record_error(chain_id, "get_logs");
                return start - 1;
            }
        };

        let events = collect_events::<E>(chain_id, &logs, gateway, None, E::TOPICS);
        for event in dedup_by_tx(chain_id, events) {
            if let Some(vote) = self.gateway_vote(params, &event) {
                if let Err(e) = self.post_inbound_vote(&vote).await {
                    error!(chain_id, tx_hash = %event.tx_hash, error = %e, "Error posting inbound vote");
                    return event.block_number - 1;
                }
            }
        }
        end
    }

    /// Native transfers to the TSS address, walked block by block
    async fn observe_tss_receive(&self, start: u64, end: u64) -> u64 {
        for block_number in start..=end {
            if let Err(e) = self.observe_tss_receive_in_block(block_number).await {
                error!(
                    chain_id = self.chain_id(),
                    block = block_number,
                    error = %e,
                    "Error observing TSS receive"
                );
                return block_number - 1;
            }
        }
        end
    }

    async fn observe_tss_receive_in_block(&self, block_number: u64) -> Result<()> {
        let block = self.inclusion.block_by_number_cached(block_number).await?;
        for tx in block.transactions.iter().filter(|tx| tx.to == Some(self.tss_address)) {
            let receipt = self
                .rpc
                .transaction_receipt(tx.hash)
                .await?
                .ok_or_else(|| eyre!("receipt not found for inbound {}", tx.hash))?;

            if !receipt.status {
                warn!(chain_id = self.chain_id(), tx_hash = %tx.hash, "Skipping failed transfer to TSS");
                metrics::record_filtered(self.chain_id(), "failed_tx");
                continue;
            }

            if let Some(vote) = self.tss_receive_vote(tx, receipt.block_number) {
                self.post_inbound_vote(&vote).await?;
            }
        }
        Ok(())
    }

    /// Vote inbounds that users reported through inbound trackers.
    ///
    /// Covers events the window scan missed. Returns the number of votes
    /// posted.
    pub async fn observe_inbound_trackers(&self) -> Result<usize> {
        let chain_id = self.chain_id();
        let trackers = self
            .consensus
            .inbound_trackers(chain_id)
            .await
            .wrap_err_with(|| format!("error fetching inbound trackers for chain {}", chain_id))?;
        let params = self.state.params();
        let last_block = self.state.last_block();

        let mut voted = 0;
        for tracker in trackers.iter().take(MAX_INBOUND_TRACKERS_PER_TICK) {
            let hash: B256 = tracker
                .tx_hash
                .parse()
                .map_err(|e| eyre!("invalid inbound tracker hash {}: {}", tracker.tx_hash, e))?;

            let tx = self
                .rpc
                .transaction_by_hash(hash)
                .await?
                .ok_or_else(|| eyre!("inbound {} not found on chain {}", hash, chain_id))?;
            let Some(receipt) = self.rpc.transaction_receipt(hash).await? else {
                debug!(chain_id, tx_hash = %hash, "Inbound tracker not mined yet");
                continue;
            };

            if !has_enough_confirmations(receipt.block_number, last_block, params.confirmation_count) {
                debug!(
                    chain_id,
                    tx_hash = %hash,
                    receipt_block = receipt.block_number,
                    last_block,
                    "Inbound tracker not confirmed yet"
                );
                continue;
            }

            info!(chain_id, tx_hash = %hash, coin_type = %tracker.coin_type, "Checking inbound tracker");
            let vote = match self.gateway_vote_from_receipt(&params, &receipt)? {
                Some(vote) => vote,
                None => self.legacy_tracker_vote(&params, tracker.coin_type, &tx, &receipt)?,
            };

            match vote {
                Some(vote) => {
                    self.post_inbound_vote(&vote).await?;
                    voted += 1;
                }
                None => info!(chain_id, tx_hash = %hash, "No vote built for inbound tracker"),
            }
        }
        Ok(voted)
    }

    /// Vote from the first gateway event in the receipt.
    ///
    /// Outer `None` when the receipt carries no gateway event or no gateway
    /// is configured; inner `None` when the event is filtered.
    fn gateway_vote_from_receipt(
        &self,
        params: &ChainParams,
        receipt: &RpcReceipt,
    ) -> Result<Option<Option<InboundVote>>> {
        let Some(gateway) = contract_address(&params.gateway_address, "gateway")? else {
            return Ok(None);
        };
        Ok(self
            .gateway_receipt_vote::<GatewayEVM::Deposited>(params, gateway, receipt)
            .or_else(|| self.gateway_receipt_vote::<GatewayEVM::DepositedAndCalled>(params, gateway, receipt))
            .or_else(|| self.gateway_receipt_vote::<GatewayEVM::Called>(params, gateway, receipt)))
    }

    fn gateway_receipt_vote<E: GatewayInbound>(
        &self,
        params: &ChainParams,
        gateway: Address,
        receipt: &RpcReceipt,
    ) -> Option<Option<InboundVote>> {
        collect_events::<E>(
            self.chain_id(),
            &receipt.logs,
            gateway,
            Some(receipt.transaction_hash),
            E::TOPICS,
        )
        .into_iter()
        .next()
        .map(|event| self.gateway_vote(params, &event))
    }

    fn legacy_tracker_vote(
        &self,
        params: &ChainParams,
        coin_type: CoinType,
        tx: &RpcTransaction,
        receipt: &RpcReceipt,
    ) -> Result<Option<InboundVote>> {
        match coin_type {
            CoinType::Zeta => self.zeta_sent_vote_from_receipt(params, receipt),
            CoinType::Erc20 => self.deposited_vote_from_receipt(params, tx, receipt),
            CoinType::Gas => self.gas_vote_from_receipt(tx, receipt),
            other => Err(eyre!(
                "unknown coin type {} for inbound {} chain {}",
                other,
                tx.hash,
                self.chain_id()
            )),
        }
    }

    fn deposited_vote_from_receipt(
        &self,
        params: &ChainParams,
        tx: &RpcTransaction,
        receipt: &RpcReceipt,
    ) -> Result<Option<InboundVote>> {
        let Some(custody) = contract_address(&params.erc20_custody_contract_address, "custody")? else {
            return Err(eyre!("custody contract not set for chain {}", self.chain_id()));
        };
        let events = collect_events::<Deposited>(
            self.chain_id(),
            &receipt.logs,
            custody,
            Some(tx.hash),
            TOPICS_DEPOSITED,
        );
        Ok(events
            .into_iter()
            .next()
            .and_then(|event| self.deposited_vote(&event, tx.from)))
    }

    fn zeta_sent_vote_from_receipt(
        &self,
        params: &ChainParams,
        receipt: &RpcReceipt,
    ) -> Result<Option<InboundVote>> {
        let Some(connector) = contract_address(&params.connector_contract_address, "connector")? else {
            return Err(eyre!("connector contract not set for chain {}", self.chain_id()));
        };
        let events = collect_events::<ZetaSent>(
            self.chain_id(),
            &receipt.logs,
            connector,
            Some(receipt.transaction_hash),
            TOPICS_ZETA_SENT,
        );
        Ok(events
            .into_iter()
            .next()
            .and_then(|event| self.zeta_sent_vote(params, &event)))
    }

    fn gas_vote_from_receipt(&self, tx: &RpcTransaction, receipt: &RpcReceipt) -> Result<Option<InboundVote>> {
        if tx.to != Some(self.tss_address) {
            return Err(ObserverError::NotToTss {
                tx_hash: tx.hash.to_string(),
                to: tx.to,
            }
            .into());
        }
        if !receipt.status {
            return Err(ObserverError::FailedInbound {
                tx_hash: tx.hash.to_string(),
            }
            .into());
        }
        Ok(self.tss_receive_vote(tx, receipt.block_number))
    }

    /// Apply the compliance filter; true means the inbound must not be voted
    fn is_restricted_inbound(&self, tx_hash: &str, sender: &str, receiver: &str, others: &[&str]) -> bool {
        let mut addresses = vec![sender, receiver];
        addresses.extend_from_slice(others);
        if self.compliance.any_restricted(&addresses) {
            log_restricted(self.chain_id(), true, tx_hash, sender, receiver);
            metrics::record_filtered(self.chain_id(), "restricted");
            return true;
        }
        false
    }

    fn is_donation_inbound(&self, tx_hash: &str, message: &[u8]) -> bool {
        if is_donation(message) {
            info!(chain_id = self.chain_id(), tx_hash, "Thank you rich folk for your donation!");
            metrics::record_filtered(self.chain_id(), "donation");
            return true;
        }
        false
    }

    pub(crate) fn deposited_vote(&self, event: &ParsedEvent<Deposited>, sender: Address) -> Option<InboundVote> {
        let tx_hash = event.tx_hash.to_string();
        let sender = sender.to_string();
        let receiver = bytes_to_eth_hex(&event.event.recipient);
        let memo_receiver = legacy_memo_receiver(&event.event.message).unwrap_or_default();

        if self.is_restricted_inbound(&tx_hash, &sender, &receiver, &[&memo_receiver]) {
            return None;
        }
        if self.is_donation_inbound(&tx_hash, &event.event.message) {
            return None;
        }

        info!(
            chain_id = self.chain_id(),
            tx_hash = %tx_hash,
            block = event.block_number,
            from = %sender,
            amount = %event.event.amount,
            "Deposited inbound detected"
        );

        Some(InboundVote {
            creator: self.consensus.operator_address().to_string(),
            sender,
            sender_chain_id: self.chain_id(),
            tx_origin: String::new(),
            receiver,
            receiver_chain_id: self.consensus_chain_id,
            amount: event.event.amount.to_string(),
            message: hex::encode(&event.event.message),
            inbound_hash: tx_hash,
            inbound_block_height: event.block_number,
            gas_limit: ERC20_DEPOSIT_GAS_LIMIT,
            coin_type: CoinType::Erc20,
            asset: event.event.asset.to_string(),
            event_index: event.log_index,
            protocol_contract_version: ProtocolContractVersion::V1,
            revert_options: RevertOptions::default(),
            is_cross_chain_call: false,
        })
    }

    pub(crate) fn zeta_sent_vote(&self, params: &ChainParams, event: &ParsedEvent<ZetaSent>) -> Option<InboundVote> {
        let tx_hash = event.tx_hash.to_string();
        let sender = event.event.zetaTxSenderAddress.to_string();
        let tx_origin = event.event.sourceTxOriginAddress.to_string();
        let receiver = bytes_to_eth_hex(&event.event.destinationAddress);

        let Ok(receiver_chain_id) = u64::try_from(event.event.destinationChainId) else {
            warn!(
                chain_id = self.chain_id(),
                tx_hash = %tx_hash,
                destination_chain_id = %event.event.destinationChainId,
                "Destination chain id out of range"
            );
            return None;
        };

        if self.is_restricted_inbound(&tx_hash, &sender, &receiver, &[&tx_origin]) {
            return None;
        }
        if self.is_donation_inbound(&tx_hash, &event.event.message) {
            return None;
        }
        if receiver_chain_id != self.consensus_chain_id
            && !params.zeta_token_contract_address.is_empty()
            && receiver.eq_ignore_ascii_case(&params.zeta_token_contract_address)
        {
            warn!(
                chain_id = self.chain_id(),
                tx_hash = %tx_hash,
                destination = %receiver,
                "Potential attack attempt: destination is the zeta token contract"
            );
            metrics::record_filtered(self.chain_id(), "token_destination");
            return None;
        }

        let message = base64::engine::general_purpose::STANDARD.encode(&event.event.message);
        info!(
            chain_id = self.chain_id(),
            tx_hash = %tx_hash,
            block = event.block_number,
            from = %sender,
            amount = %event.event.zetaValueAndGas,
            "ZetaSent inbound detected"
        );

        Some(InboundVote {
            creator: self.consensus.operator_address().to_string(),
            sender,
            sender_chain_id: self.chain_id(),
            tx_origin,
            receiver,
            receiver_chain_id,
            amount: event.event.zetaValueAndGas.to_string(),
            message,
            inbound_hash: tx_hash,
            inbound_block_height: event.block_number,
            gas_limit: saturating_u64(event.event.destinationGasLimit),
            coin_type: CoinType::Zeta,
            asset: String::new(),
            event_index: event.log_index,
            protocol_contract_version: ProtocolContractVersion::V1,
            revert_options: RevertOptions::default(),
            is_cross_chain_call: false,
        })
    }

    pub(crate) fn tss_receive_vote(&self, tx: &RpcTransaction, block_number: u64) -> Option<InboundVote> {
        let tx_hash = tx.hash.to_string();
        let sender = tx.from.to_string();
        let memo_receiver = legacy_memo_receiver(&tx.input).unwrap_or_default();

        if self.is_restricted_inbound(&tx_hash, &sender, &sender, &[&memo_receiver]) {
            return None;
        }
        if self.is_donation_inbound(&tx_hash, &tx.input) {
            return None;
        }

        info!(
            chain_id = self.chain_id(),
            tx_hash = %tx_hash,
            block = block_number,
            from = %sender,
            value = %tx.value,
            "TSS inbound detected"
        );

        Some(InboundVote {
            creator: self.consensus.operator_address().to_string(),
            sender: sender.clone(),
            sender_chain_id: self.chain_id(),
            tx_origin: sender.clone(),
            receiver: sender,
            receiver_chain_id: self.consensus_chain_id,
            amount: tx.value.to_string(),
            message: hex::encode(&tx.input),
            inbound_hash: tx_hash,
            inbound_block_height: block_number,
            gas_limit: GAS_DEPOSIT_GAS_LIMIT,
            coin_type: CoinType::Gas,
            asset: String::new(),
            event_index: 0,
            protocol_contract_version: ProtocolContractVersion::V1,
            revert_options: RevertOptions::default(),
            is_cross_chain_call: false,
        })
    }

    fn gateway_vote<E: GatewayInbound>(&self, params: &ChainParams, event: &ParsedEvent<E>) -> Option<InboundVote> {
        let tx_hash = event.tx_hash.to_string();
        let sender = event.event.sender().to_string();
        let receiver = event.event.receiver().to_string();

        if self.is_restricted_inbound(&tx_hash, &sender, &receiver, &[]) {
            return None;
        }
        if self.is_donation_inbound(&tx_hash, event.event.payload()) {
            return None;
        }

        let (coin_type, asset) = match event.event.asset() {
            Some(asset) => (
                gateway_coin_type(asset, &params.zeta_token_contract_address),
                asset.to_string(),
            ),
            None => (CoinType::NoAssetCall, String::new()),
        };
        info!(
            chain_id = self.chain_id(),
            tx_hash = %tx_hash,
            block = event.block_number,
            from = %sender,
            amount = %event.event.amount(),
            event = E::LABEL,
            "Gateway inbound detected"
        );

        Some(InboundVote {
            creator: self.consensus.operator_address().to_string(),
            sender,
            sender_chain_id: self.chain_id(),
            tx_origin: String::new(),
            receiver,
            receiver_chain_id: self.consensus_chain_id,
            amount: event.event.amount().to_string(),
            message: hex::encode(event.event.payload()),
            inbound_hash: tx_hash,
            inbound_block_height: event.block_number,
            gas_limit: GATEWAY_INBOUND_GAS_LIMIT,
            coin_type,
            asset,
            event_index: event.log_index,
            protocol_contract_version: ProtocolContractVersion::V2,
            revert_options: event.event.revert_options().into(),
            is_cross_chain_call: event.event.is_cross_chain_call(),
        })
    }

    async fn post_inbound_vote(&self, vote: &InboundVote) -> Result<()> {
        let chain_id = self.chain_id();
        match self.consensus.post_vote_inbound(vote).await {
            Ok(receipt) => {
                metrics::record_vote(chain_id, "inbound", true);
                info!(
                    chain_id,
                    inbound_hash = %vote.inbound_hash,
                    ballot = %receipt.ballot,
                    tx_hash = %receipt.tx_hash,
                    "Posted inbound vote"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_vote(chain_id, "inbound", false);
                Err(e.wrap_err(format!("error posting inbound vote for {}", vote.inbound_hash)))
            }
        }
    }
}
