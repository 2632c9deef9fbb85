//! Outbound watching, outbound votes, gas price and RPC health

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, error, info, warn};

use super::events::{
    collect_events, TOPICS_GATEWAY_EXECUTED, TOPICS_GATEWAY_REVERTED, TOPICS_WITHDRAWN,
    TOPICS_WITHDRAWN_AND_CALLED, TOPICS_ZETA_RECEIVED, TOPICS_ZETA_REVERTED,
};
use super::{contract_address, ChainObserver, RpcStatus, RPC_STALE_THRESHOLD_SECS};
use crate::confirmation::has_enough_confirmations;
use crate::contracts::ERC20Custody::{Withdrawn, WithdrawnAndCalled};
use crate::contracts::GatewayEVM::{Executed, Reverted};
use crate::contracts::ZetaConnector::{ZetaReceived, ZetaReverted};
use crate::metrics;
use crate::outbound::data::decode_message;
use crate::outbound::{outbound_destination, outbound_kind_for, OutboundKind};
use crate::rpc::{RpcReceipt, RpcTransaction};
use crate::types::{parse_amount, CrossChainTx, ReceiveStatus};
use crate::vote::OutboundVote;

/// What the outbound event must show
struct ExpectedOutbound<'a> {
    receiver: &'a str,
    /// Inbound asset, empty for native value
    asset: &'a str,
    amount: U256,
    message: Vec<u8>,
}

fn same_address(found: Address, expected: &str) -> bool {
    let expected = expected.trim();
    if expected.is_empty() {
        return found == Address::ZERO;
    }
    found.to_string().eq_ignore_ascii_case(expected)
}

impl ExpectedOutbound<'_> {
    fn check_receiver(&self, event: &str, found: Address) -> Result<()> {
        if !same_address(found, self.receiver) {
            return Err(eyre!(
                "receiver mismatch in {} event, want {} got {}",
                event,
                self.receiver,
                found
            ));
        }
        Ok(())
    }

    fn check_asset(&self, event: &str, found: Address) -> Result<()> {
        if !same_address(found, self.asset) {
            return Err(eyre!(
                "asset mismatch in {} event, want {:?} got {}",
                event,
                self.asset,
                found
            ));
        }
        Ok(())
    }

    fn check_message(&self, event: &str, found: &[u8]) -> Result<()> {
        if found != self.message.as_slice() {
            return Err(eyre!(
                "message mismatch in {} event, want {} got {}",
                event,
                hex::encode(&self.message),
                hex::encode(found)
            ));
        }
        Ok(())
    }

    /// The delivered amount once it matches
    fn check_amount(&self, event: &str, found: U256) -> Result<U256> {
        if found != self.amount {
            return Err(eyre!(
                "amount mismatch in {} event, want {} got {}",
                event,
                self.amount,
                found
            ));
        }
        Ok(found)
    }
}

impl ChainObserver {
    /// Check that `tx_hash` is a mined, confirmed and included TSS
    /// transaction for `nonce`. A pending one is recorded in the cache.
    pub async fn check_confirmed_tx(
        &self,
        tx_hash: B256,
        nonce: u64,
    ) -> Option<(RpcReceipt, RpcTransaction)> {
        let chain_id = self.chain_id();

        let tx = match self.rpc.transaction_by_hash(tx_hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                debug!(chain_id, nonce, tx_hash = %tx_hash, "Outbound not found");
                return None;
            }
            Err(e) => {
                error!(chain_id, nonce, tx_hash = %tx_hash, error = %e, "Error getting outbound transaction");
                return None;
            }
        };

        if tx.from != self.tss_address {
            error!(
                chain_id,
                nonce,
                tx_hash = %tx_hash,
                sender = %tx.from,
                tss = %self.tss_address,
                "Outbound sender is not the TSS address"
            );
            return None;
        }
        if tx.nonce != nonce {
            error!(chain_id, tx_hash = %tx_hash, wanted = nonce, got = tx.nonce, "Outbound nonce mismatch");
            return None;
        }

        if tx.is_pending() {
            self.pending.set_pending(nonce, tx);
            return None;
        }

        let receipt = match self.rpc.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return None,
            Err(e) => {
                warn!(chain_id, nonce, tx_hash = %tx_hash, error = %e, "Error getting outbound receipt");
                return None;
            }
        };

        let last_block = self.state.last_block();
        let confirmations = self.state.params().confirmation_count;
        if !has_enough_confirmations(receipt.block_number, last_block, confirmations) {
            debug!(
                chain_id,
                nonce,
                tx_hash = %tx_hash,
                receipt_block = receipt.block_number,
                last_block,
                "Outbound included but not confirmed"
            );
            return None;
        }

        if let Err(e) = self.inclusion.check_tx_inclusion(tx.hash, &receipt).await {
            error!(chain_id, nonce, tx_hash = %tx_hash, error = %e, "Outbound inclusion check failed");
            return None;
        }

        Some((receipt, tx))
    }

    /// Walk outbound trackers and record confirmed outbounds.
    ///
    /// Returns the number of nonces newly confirmed.
    pub async fn process_outbound_trackers(&self) -> Result<usize> {
        let chain_id = self.chain_id();
        let height = self.rpc.block_number().await?;
        self.state.observe_block_height(height)?;

        let trackers = self
            .consensus
            .outbound_trackers(chain_id)
            .await
            .wrap_err_with(|| format!("error fetching outbound trackers for chain {}", chain_id))?;

        let mut newly_confirmed = 0;
        for tracker in trackers {
            let nonce = tracker.nonce;
            if self.pending.is_confirmed(nonce) {
                continue;
            }

            let mut confirmed = Vec::new();
            for entry in &tracker.hash_list {
                let Ok(hash) = entry.tx_hash.parse::<B256>() else {
                    warn!(chain_id, nonce, tx_hash = %entry.tx_hash, "Malformed tracker hash");
                    continue;
                };
                if let Some(pair) = self.check_confirmed_tx(hash, nonce).await {
                    info!(chain_id, nonce, tx_hash = %hash, "Confirmed outbound");
                    confirmed.push(pair);
                }
            }

            match confirmed.len() {
                0 => {}
                1 => {
                    let (receipt, tx) = confirmed.remove(0);
                    self.pending.set_confirmed(nonce, receipt, tx);
                    newly_confirmed += 1;
                }
                n => {
                    // cannot tell which hash is real, e.g. a glitchy endpoint
                    error!(chain_id, nonce, count = n, "Confirmed multiple outbounds for one nonce");
                }
            }
        }
        Ok(newly_confirmed)
    }

    /// Post the outbound vote for `cctx` if its nonce is confirmed locally.
    ///
    /// Returns true once a vote was posted.
    pub async fn vote_outbound_if_confirmed(&self, cctx: &CrossChainTx) -> Result<bool> {
        let nonce = cctx.nonce()?;
        let Some((receipt, tx)) = self.pending.get_confirmed(nonce) else {
            return Ok(false);
        };

        let status = if receipt.status {
            ReceiveStatus::Success
        } else {
            ReceiveStatus::Failed
        };

        let kind = outbound_kind_for(cctx, &self.compliance)?;
        let value = if kind == OutboundKind::Cancel {
            // cancelled outbound: echo the cctx amount
            parse_amount(&cctx.current_outbound()?.amount)?
        } else {
            self.parse_received_value(cctx, kind, &receipt, &tx)?
        };

        let vote = OutboundVote {
            creator: self.consensus.operator_address().to_string(),
            cctx_hash: cctx.index.clone(),
            observed_outbound_hash: receipt.transaction_hash.to_string(),
            observed_outbound_block_height: receipt.block_number,
            observed_outbound_gas_used: receipt.gas_used,
            observed_outbound_effective_gas_price: receipt
                .effective_gas_price
                .or(tx.gas_price)
                .unwrap_or_default()
                .to_string(),
            observed_outbound_gas_limit: tx.gas,
            value_received: value.to_string(),
            status,
            outbound_chain: self.chain_id(),
            outbound_tss_nonce: nonce,
            coin_type: cctx.inbound_params.coin_type,
        };

        match self.consensus.post_vote_outbound(&vote).await {
            Ok(posted) => {
                metrics::record_vote(self.chain_id(), "outbound", true);
                info!(
                    chain_id = self.chain_id(),
                    nonce,
                    cctx = %cctx.index,
                    outbound_hash = %vote.observed_outbound_hash,
                    status = status.as_str(),
                    ballot = %posted.ballot,
                    "Posted outbound vote"
                );
                Ok(true)
            }
            Err(e) => {
                metrics::record_vote(self.chain_id(), "outbound", false);
                Err(e.wrap_err(format!("error posting outbound vote for nonce {}", nonce)))
            }
        }
    }

    /// Value delivered by the outbound, read from the receipt.
    ///
    /// Failed outbounds deliver nothing. Plain transfers use the tx value;
    /// every contract call must carry the event its target emits, matching
    /// the receiver, asset, amount and relayed message of the CCTX.
    fn parse_received_value(
        &self,
        cctx: &CrossChainTx,
        kind: OutboundKind,
        receipt: &RpcReceipt,
        tx: &RpcTransaction,
    ) -> Result<U256> {
        if !receipt.status {
            return Ok(U256::ZERO);
        }

        let params = self.state.params();
        let (_, receiver) = outbound_destination(cctx)?;
        let expected = ExpectedOutbound {
            receiver,
            asset: &cctx.inbound_params.asset,
            amount: parse_amount(&cctx.current_outbound()?.amount)?,
            message: decode_message(&cctx.relayed_message, &cctx.index),
        };

        match kind {
            OutboundKind::Cancel | OutboundKind::GasWithdraw => Ok(tx.value),
            OutboundKind::Erc20Withdraw => {
                let custody = self.required_contract(&params.erc20_custody_contract_address, "custody")?;
                let event: Withdrawn = self.outbound_event(receipt, custody, TOPICS_WITHDRAWN)?;
                expected.check_receiver("Withdrawn", event.recipient)?;
                expected.check_asset("Withdrawn", event.asset)?;
                expected.check_amount("Withdrawn", event.amount)
            }
            OutboundKind::Erc20WithdrawAndCall => {
                let custody = self.required_contract(&params.erc20_custody_contract_address, "custody")?;
                let event: WithdrawnAndCalled =
                    self.outbound_event(receipt, custody, TOPICS_WITHDRAWN_AND_CALLED)?;
                expected.check_receiver("WithdrawnAndCalled", event.to)?;
                expected.check_asset("WithdrawnAndCalled", event.token)?;
                expected.check_message("WithdrawnAndCalled", &event.data)?;
                expected.check_amount("WithdrawnAndCalled", event.amount)
            }
            OutboundKind::GasWithdrawAndCall | OutboundKind::Call => {
                let gateway = self.required_contract(&params.gateway_address, "gateway")?;
                let event: Executed = self.outbound_event(receipt, gateway, TOPICS_GATEWAY_EXECUTED)?;
                expected.check_receiver("Executed", event.destination)?;
                expected.check_message("Executed", &event.data)?;
                expected.check_amount("Executed", event.value)
            }
            OutboundKind::GasRevertAndCall | OutboundKind::Erc20RevertAndCall => {
                let gateway = self.required_contract(&params.gateway_address, "gateway")?;
                let event: Reverted = self.outbound_event(receipt, gateway, TOPICS_GATEWAY_REVERTED)?;
                expected.check_receiver("Reverted", event.to)?;
                expected.check_asset("Reverted", event.token)?;
                expected.check_amount("Reverted", event.amount)
            }
            OutboundKind::ConnectorOnReceive => {
                let connector = self.required_contract(&params.connector_contract_address, "connector")?;
                let index = cctx.index.parse::<B256>().wrap_err("invalid cctx index")?;
                let event: ZetaReceived = self.outbound_event(receipt, connector, TOPICS_ZETA_RECEIVED)?;
                if event.internalSendHash != index {
                    return Err(eyre!("ZetaReceived event does not match cctx {}", cctx.index));
                }
                expected.check_amount("ZetaReceived", event.zetaValue)
            }
            OutboundKind::ConnectorOnRevert => {
                let connector = self.required_contract(&params.connector_contract_address, "connector")?;
                let index = cctx.index.parse::<B256>().wrap_err("invalid cctx index")?;
                let event: ZetaReverted = self.outbound_event(receipt, connector, TOPICS_ZETA_REVERTED)?;
                if event.internalSendHash != index {
                    return Err(eyre!("ZetaReverted event does not match cctx {}", cctx.index));
                }
                expected.check_amount("ZetaReverted", event.remainingZetaValue)
            }
        }
    }

    fn required_contract(&self, value: &str, what: &'static str) -> Result<Address> {
        contract_address(value, what)?
            .ok_or_else(|| eyre!("{} contract not set for chain {}", what, self.chain_id()))
    }

    /// First valid `E` emitted by `emitter` in the outbound receipt
    fn outbound_event<E: SolEvent>(&self, receipt: &RpcReceipt, emitter: Address, topics: usize) -> Result<E> {
        collect_events::<E>(
            self.chain_id(),
            &receipt.logs,
            emitter,
            Some(receipt.transaction_hash),
            topics,
        )
        .into_iter()
        .next()
        .map(|parsed| parsed.event)
        .ok_or_else(|| eyre!("no {} event in outbound {}", E::SIGNATURE, receipt.transaction_hash))
    }

    /// Post the node's suggested gas price with the current height
    pub async fn post_gas_price(&self) -> Result<String> {
        let chain_id = self.chain_id();
        let gas_price = self
            .rpc
            .suggest_gas_price()
            .await
            .wrap_err_with(|| format!("error getting gas price for chain {}", chain_id))?;
        let block = self.rpc.block_number().await?;

        let tx_hash = self
            .consensus
            .post_gas_price(chain_id, gas_price, block)
            .await
            .wrap_err_with(|| format!("error posting gas price for chain {}", chain_id))?;
        debug!(chain_id, gas_price, block, tx_hash = %tx_hash, "Posted gas price");
        Ok(tx_hash)
    }

    /// Check how old the latest block is and record RPC health
    pub async fn check_rpc_status(&self) -> Result<RpcStatus> {
        let chain_id = self.chain_id();
        let latest = self.rpc.block_number().await?;
        let block = self
            .rpc
            .block_by_number(latest)
            .await?
            .ok_or_else(|| eyre!("latest block {} not found on chain {}", latest, chain_id))?;

        let now = Utc::now();
        let age = now.timestamp() - block.timestamp as i64;
        metrics::record_rpc_latency(chain_id, age.max(0) as f64);

        let healthy = age <= RPC_STALE_THRESHOLD_SECS;
        if !healthy {
            warn!(chain_id, latest_block = latest, age_secs = age, "RPC stale");
        }

        let status = RpcStatus {
            healthy,
            latest_block: latest,
            block_age_secs: age,
            checked_at: Some(now),
        };
        self.state.set_rpc_status(status.clone());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::RevertContext;
    use crate::rpc::RpcLog;
    use crate::testing::{
        event_log, sample_cctx, withdrawn_log, OutboundHarness, TxBuilder, CUSTODY, GATEWAY, TSS,
    };
    use crate::types::{CctxStatus, CoinType};
    use alloy::primitives::Bytes;
    use std::str::FromStr;

    const MESSAGE: &[u8] = &[0xde, 0xad, 0xbe, 0xef];

    /// Confirm nonce `nonce` with a successful receipt carrying `logs`
    fn confirm_with_logs(h: &OutboundHarness, nonce: u64, hash: B256, value: U256, logs: Vec<RpcLog>) {
        let tx = TxBuilder::new(hash)
            .from(TSS)
            .nonce(nonce)
            .value(value)
            .block(40, 0)
            .build();
        let mut receipt = h.rpc.receipt_for(hash, 40, 0, true);
        receipt.logs = logs;
        h.observer.pending().set_confirmed(nonce, receipt, tx);
    }

    fn address(value: &str) -> Address {
        Address::from_str(value).unwrap()
    }

    const CHAIN: u64 = 1337;

    #[tokio::test]
    async fn test_tracker_hash_confirmed_after_depth() {
        let h = OutboundHarness::new(CHAIN);
        let hash = B256::repeat_byte(0x0f);
        let tx = TxBuilder::new(hash).from(TSS).nonce(7).block(50, 0).build();
        h.rpc.add_block(50, vec![tx.clone()]);
        h.rpc.add_transaction(tx);
        h.rpc.add_receipt_for(hash, 50, 0, true);
        h.consensus.add_outbound_tracker_entry(CHAIN, 7, hash);

        // receipt at 50, 12 confirmations: 61 is one short
        h.rpc.set_block_number(61);
        assert_eq!(h.observer.process_outbound_trackers().await.unwrap(), 0);
        assert!(!h.observer.pending().is_confirmed(7));

        h.rpc.set_block_number(62);
        assert_eq!(h.observer.process_outbound_trackers().await.unwrap(), 1);
        assert!(h.observer.pending().is_confirmed(7));
    }

    #[tokio::test]
    async fn test_non_tss_sender_rejected() {
        let h = OutboundHarness::new(CHAIN);
        let hash = B256::repeat_byte(0x10);
        let tx = TxBuilder::new(hash)
            .from(Address::repeat_byte(0x99))
            .nonce(7)
            .block(50, 0)
            .build();
        h.rpc.add_transaction(tx);
        h.rpc.add_receipt_for(hash, 50, 0, true);
        h.rpc.set_block_number(100);

        assert!(h.observer.check_confirmed_tx(hash, 7).await.is_none());
    }

    #[tokio::test]
    async fn test_pending_tracker_tx_recorded() {
        let h = OutboundHarness::new(CHAIN);
        let hash = B256::repeat_byte(0x11);
        h.rpc.add_transaction(TxBuilder::new(hash).from(TSS).nonce(3).gas_price(9).build());

        assert!(h.observer.check_confirmed_tx(hash, 3).await.is_none());
        assert_eq!(h.observer.pending().pending_gas_price(3), Some(9));
    }

    #[tokio::test]
    async fn test_erc20_vote_uses_withdrawn_amount() {
        let h = OutboundHarness::new(CHAIN);
        let cctx = sample_cctx(CHAIN, 5, CoinType::Erc20);
        let outbound = cctx.current_outbound().unwrap();
        let hash = B256::repeat_byte(0x12);

        let tx = TxBuilder::new(hash).from(TSS).nonce(5).block(40, 0).build();
        let mut receipt = h.rpc.receipt_for(hash, 40, 0, true);
        receipt.logs.push(withdrawn_log(
            CUSTODY,
            hash,
            40,
            Address::from_str(&outbound.receiver).unwrap(),
            Address::from_str(&cctx.inbound_params.asset).unwrap(),
            parse_amount(&outbound.amount).unwrap(),
        ));
        h.observer.pending().set_confirmed(5, receipt, tx);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
        let votes = h.consensus.outbound_votes();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value_received, outbound.amount);
        assert_eq!(votes[0].status, ReceiveStatus::Success);
        assert_eq!(votes[0].outbound_tss_nonce, 5);
    }

    #[tokio::test]
    async fn test_erc20_vote_without_event_is_error() {
        let h = OutboundHarness::new(CHAIN);
        let cctx = sample_cctx(CHAIN, 5, CoinType::Erc20);
        let hash = B256::repeat_byte(0x13);
        let tx = TxBuilder::new(hash).from(TSS).nonce(5).block(40, 0).build();
        let receipt = h.rpc.receipt_for(hash, 40, 0, true);
        h.observer.pending().set_confirmed(5, receipt, tx);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.is_err());
        assert!(h.consensus.outbound_votes().is_empty());
    }

    #[tokio::test]
    async fn test_erc20_withdraw_and_call_vote() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 5, CoinType::Erc20);
        cctx.relayed_message = hex::encode(MESSAGE);
        let outbound = cctx.current_outbound().unwrap().clone();
        let hash = B256::repeat_byte(0x21);

        let event = WithdrawnAndCalled {
            to: address(&outbound.receiver),
            token: address(&cctx.inbound_params.asset),
            amount: parse_amount(&outbound.amount).unwrap(),
            data: Bytes::from_static(MESSAGE),
        };
        confirm_with_logs(&h, 5, hash, U256::ZERO, vec![event_log(&event, CUSTODY, hash, 40, 0, 0)]);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
        assert_eq!(h.consensus.outbound_votes()[0].value_received, outbound.amount);
    }

    #[tokio::test]
    async fn test_erc20_withdraw_and_call_needs_its_own_event() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 5, CoinType::Erc20);
        cctx.relayed_message = hex::encode(MESSAGE);
        let outbound = cctx.current_outbound().unwrap().clone();
        let hash = B256::repeat_byte(0x22);

        // a plain Withdrawn does not prove the call happened
        let log = withdrawn_log(
            CUSTODY,
            hash,
            40,
            address(&outbound.receiver),
            address(&cctx.inbound_params.asset),
            parse_amount(&outbound.amount).unwrap(),
        );
        confirm_with_logs(&h, 5, hash, U256::ZERO, vec![log]);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.is_err());
        assert!(h.consensus.outbound_votes().is_empty());
    }

    #[tokio::test]
    async fn test_gas_withdraw_and_call_reads_gateway_executed() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 6, CoinType::Gas);
        cctx.relayed_message = hex::encode(MESSAGE);
        let outbound = cctx.current_outbound().unwrap().clone();
        let amount = parse_amount(&outbound.amount).unwrap();
        let hash = B256::repeat_byte(0x23);

        let event = Executed {
            destination: address(&outbound.receiver),
            value: amount,
            data: Bytes::from_static(MESSAGE),
        };
        confirm_with_logs(&h, 6, hash, amount, vec![event_log(&event, GATEWAY, hash, 40, 0, 0)]);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
        assert_eq!(h.consensus.outbound_votes()[0].value_received, outbound.amount);
    }

    #[tokio::test]
    async fn test_executed_with_other_message_is_error() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 6, CoinType::Gas);
        cctx.relayed_message = hex::encode(MESSAGE);
        let outbound = cctx.current_outbound().unwrap().clone();
        let amount = parse_amount(&outbound.amount).unwrap();
        let hash = B256::repeat_byte(0x24);

        let event = Executed {
            destination: address(&outbound.receiver),
            value: amount,
            data: Bytes::from_static(b"other"),
        };
        confirm_with_logs(&h, 6, hash, amount, vec![event_log(&event, GATEWAY, hash, 40, 0, 0)]);

        let err = h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap_err();
        assert!(err.to_string().contains("message mismatch"));
    }

    #[tokio::test]
    async fn test_no_asset_call_votes_zero_value() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 7, CoinType::NoAssetCall);
        cctx.relayed_message = hex::encode(MESSAGE);
        cctx.outbound_params[0].amount = "0".to_string();
        let receiver = address(&cctx.outbound_params[0].receiver);
        let hash = B256::repeat_byte(0x25);

        let event = Executed {
            destination: receiver,
            value: U256::ZERO,
            data: Bytes::from_static(MESSAGE),
        };
        confirm_with_logs(&h, 7, hash, U256::ZERO, vec![event_log(&event, GATEWAY, hash, 40, 0, 0)]);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
        assert_eq!(h.consensus.outbound_votes()[0].value_received, "0");
    }

    #[tokio::test]
    async fn test_erc20_revert_and_call_reads_gateway_reverted() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 8, CoinType::Erc20);
        cctx.cctx_status.status = CctxStatus::PendingRevert;
        cctx.inbound_params.sender_chain_id = CHAIN;
        cctx.revert_options.call_on_revert = true;
        let amount = parse_amount(&cctx.outbound_params[0].amount).unwrap();
        let asset = address(&cctx.inbound_params.asset);
        // no revert address: back to the inbound sender
        let sender = address(&cctx.inbound_params.sender);
        let hash = B256::repeat_byte(0x26);

        let event = Reverted {
            to: sender,
            token: asset,
            amount,
            data: Bytes::new(),
            revertContext: RevertContext {
                sender,
                asset,
                amount,
                revertMessage: Bytes::new(),
            },
        };
        confirm_with_logs(&h, 8, hash, U256::ZERO, vec![event_log(&event, GATEWAY, hash, 40, 0, 0)]);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
        assert_eq!(h.consensus.outbound_votes()[0].value_received, amount.to_string());
    }

    #[tokio::test]
    async fn test_gas_revert_and_call_expects_zero_token() {
        let h = OutboundHarness::new(CHAIN);
        let mut cctx = sample_cctx(CHAIN, 9, CoinType::Gas);
        cctx.cctx_status.status = CctxStatus::PendingRevert;
        cctx.inbound_params.sender_chain_id = CHAIN;
        cctx.revert_options.call_on_revert = true;
        let amount = parse_amount(&cctx.outbound_params[0].amount).unwrap();
        let sender = address(&cctx.inbound_params.sender);
        let hash = B256::repeat_byte(0x27);

        let event = Reverted {
            to: sender,
            token: Address::repeat_byte(0xa5),
            amount,
            data: Bytes::new(),
            revertContext: RevertContext {
                sender,
                asset: Address::ZERO,
                amount,
                revertMessage: Bytes::new(),
            },
        };
        confirm_with_logs(&h, 9, hash, amount, vec![event_log(&event, GATEWAY, hash, 40, 0, 0)]);

        let err = h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap_err();
        assert!(err.to_string().contains("asset mismatch"));
    }

    #[tokio::test]
    async fn test_failed_outbound_votes_zero() {
        let h = OutboundHarness::new(CHAIN);
        let cctx = sample_cctx(CHAIN, 6, CoinType::Gas);
        let hash = B256::repeat_byte(0x14);
        let tx = TxBuilder::new(hash)
            .from(TSS)
            .nonce(6)
            .value(U256::from(10u64))
            .block(40, 0)
            .build();
        let receipt = h.rpc.receipt_for(hash, 40, 0, false);
        h.observer.pending().set_confirmed(6, receipt, tx);

        assert!(h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
        let votes = h.consensus.outbound_votes();
        assert_eq!(votes[0].status, ReceiveStatus::Failed);
        assert_eq!(votes[0].value_received, "0");
    }

    #[tokio::test]
    async fn test_unconfirmed_nonce_not_voted() {
        let h = OutboundHarness::new(CHAIN);
        let cctx = sample_cctx(CHAIN, 8, CoinType::Gas);
        assert!(!h.observer.vote_outbound_if_confirmed(&cctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_rpc_status_stale() {
        let h = OutboundHarness::new(CHAIN);
        h.rpc.set_block_number(10);
        h.rpc.set_block_timestamp(10, Utc::now().timestamp() as u64 - 500);

        let status = h.observer.check_rpc_status().await.unwrap();
        assert!(!status.healthy);
        assert!(!h.observer.state().rpc_status().healthy);

        h.rpc.set_block_number(11);
        h.rpc.set_block_timestamp(11, Utc::now().timestamp() as u64);
        assert!(h.observer.check_rpc_status().await.unwrap().healthy);
    }

    #[tokio::test]
    async fn test_gas_price_posted() {
        let h = OutboundHarness::new(CHAIN);
        h.rpc.set_gas_price(33);
        h.rpc.set_block_number(77);
        h.observer.post_gas_price().await.unwrap();
        assert_eq!(h.consensus.gas_prices(), vec![(CHAIN, 33, 77)]);
    }
}
