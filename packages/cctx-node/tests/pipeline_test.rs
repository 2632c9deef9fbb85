//! End-to-end pipeline tests over the in-memory chain and consensus fakes
//!
//! Run with: cargo test --test pipeline_test

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use eyre::Result;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

use cctx_node::compliance::{ComplianceFilter, DONATION_MESSAGE};
use cctx_node::config::SchedulerConfig;
use cctx_node::confirmation::has_enough_confirmations;
use cctx_node::outbound::data::{
    build_outbound_data, clamp_gas_limit, BuildContext, BuildOutcome, SkipReason, MIN_GAS_LIMIT,
};
use cctx_node::pending::PendingTxCache;
use cctx_node::scheduler::retry_interval;
use cctx_node::testing::{
    deposited_log, sample_cctx, tss_signer, InboundHarness, SchedulerHarness, TxBuilder, CHAIN_ID,
    CUSTODY, TSS,
};
use cctx_node::tss::{LocalTssSigner, TssSigner};
use cctx_node::types::{ChainId, CoinType, ReceiveStatus};

mod helpers {
    use super::*;

    /// Poll `check` every few milliseconds until it holds or two seconds pass
    pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..400 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    /// Deposit from 0x42 with a custody event at block 105
    pub fn add_deposit(h: &InboundHarness, hash: B256, message: &[u8]) {
        h.rpc
            .add_transaction(TxBuilder::new(hash).from(Address::repeat_byte(0x42)).build());
        h.rpc
            .add_logs(vec![deposited_log(CUSTODY, hash, 105, 0, 1, message)]);
    }

    /// TSS that holds every signature until released
    pub struct GatedTss {
        pub inner: LocalTssSigner,
        pub gate: Notify,
    }

    #[async_trait]
    impl TssSigner for GatedTss {
        async fn sign(
            &self,
            digest: B256,
            height: u64,
            nonce: u64,
            chain_id: ChainId,
        ) -> Result<[u8; 65]> {
            self.gate.notified().await;
            self.inner.sign(digest, height, nonce, chain_id).await
        }

        fn evm_address(&self) -> Address {
            self.inner.evm_address()
        }
    }
}

use helpers::*;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_vote_digest_identical_across_observers() {
    let a = InboundHarness::new(100, 20).await;
    let b = InboundHarness::new(100, 20).await;
    let hash = B256::repeat_byte(0xd1);
    add_deposit(&a, hash, b"payload");
    add_deposit(&b, hash, b"payload");

    a.observer.observe_inbound().await.unwrap();
    b.observer.observe_inbound().await.unwrap();

    let (va, vb) = (a.consensus.inbound_votes(), b.consensus.inbound_votes());
    assert_eq!(va.len(), 1);
    assert_eq!(va[0].digest(), vb[0].digest());
    assert_eq!(a.consensus.ballots(), b.consensus.ballots());
}

#[tokio::test]
async fn test_donation_skipped_and_checkpoint_advances() {
    let h = InboundHarness::new(100, 20).await;
    add_deposit(&h, B256::repeat_byte(0xd2), DONATION_MESSAGE);

    assert_eq!(h.observer.observe_inbound().await.unwrap(), 108);
    assert!(h.consensus.inbound_votes().is_empty());
    assert_eq!(h.store_checkpoint().await, Some(108));
}

#[tokio::test]
async fn test_restricted_sender_skipped_and_checkpoint_advances() {
    let compliance = ComplianceFilter::new([Address::repeat_byte(0x42).to_string()]);
    let h = InboundHarness::with_compliance(100, 20, compliance).await;
    add_deposit(&h, B256::repeat_byte(0xd3), b"");

    assert_eq!(h.observer.observe_inbound().await.unwrap(), 108);
    assert!(h.consensus.inbound_votes().is_empty());
    assert_eq!(h.store_checkpoint().await, Some(108));
}

#[tokio::test]
async fn test_failed_vote_replayed_next_tick() {
    let h = InboundHarness::new(100, 20).await;
    add_deposit(&h, B256::repeat_byte(0xd4), b"");
    h.consensus.fail_next_votes(1);

    // held just below the event block
    assert_eq!(h.observer.observe_inbound().await.unwrap(), 104);
    assert!(h.consensus.inbound_votes().is_empty());

    assert_eq!(h.observer.observe_inbound().await.unwrap(), 108);
    assert_eq!(h.consensus.inbound_votes().len(), 1);
}

#[tokio::test]
async fn test_checkpoint_monotone_across_erroring_ticks() {
    let h = InboundHarness::new(100, 20).await;
    h.observer.observe_inbound().await.unwrap();
    assert_eq!(h.store_checkpoint().await, Some(108));

    h.rpc.set_unavailable(true);
    assert_err!(h.observer.observe_inbound().await);
    assert_eq!(h.store_checkpoint().await, Some(108));

    h.rpc.set_unavailable(false);
    h.rpc.set_block_number(140);
    assert_eq!(h.observer.observe_inbound().await.unwrap(), 128);
    assert_eq!(h.store_checkpoint().await, Some(128));
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_outbound_signed_tracked_and_voted() {
    let h = SchedulerHarness::new(Some(1)).await;
    let cctx = sample_cctx(CHAIN_ID, 0, CoinType::Gas);
    h.consensus.add_cctx(cctx.clone());
    h.consensus.set_height(50);

    let report = h.scheduler.schedule_outbound(50).await.unwrap();
    assert_eq!(report.dispatched, vec![0]);
    for task in report.tasks {
        task.await.unwrap();
    }
    let sent = h.rpc.sent_raw();
    assert_eq!(sent.len(), 1);
    let tx_hash = keccak256(&sent[0]);

    // the chain mines it at block 10 and confirms it by 22
    let tx = TxBuilder::new(tx_hash)
        .from(TSS)
        .to(Address::repeat_byte(0x22))
        .nonce(0)
        .value(U256::from(1_000_000u64))
        .gas(250_000)
        .block(10, 0)
        .build();
    h.rpc.add_block(10, vec![tx]);
    h.rpc.add_receipt_for(tx_hash, 10, 0, true);
    h.rpc.set_block_number(22);

    let tracked = eventually(|| !h.consensus.tracker_hashes(CHAIN_ID, 0).is_empty()).await;
    assert!(tracked, "tracker reporter never added the hash");
    assert_eq!(
        h.consensus.tracker_hashes(CHAIN_ID, 0),
        vec![tx_hash.to_string()]
    );

    assert_ok!(h.observer.process_outbound_trackers().await);
    assert!(h.observer.pending().is_confirmed(0));

    let report = h.scheduler.schedule_outbound(51).await.unwrap();
    assert_eq!(report.voted, vec![0]);
    let votes = h.consensus.outbound_votes();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].cctx_hash, cctx.index);
    assert_eq!(votes[0].observed_outbound_hash, tx_hash.to_string());
    assert_eq!(votes[0].observed_outbound_block_height, 10);
    assert_eq!(votes[0].value_received, "1000000");
    assert_eq!(votes[0].status, ReceiveStatus::Success);
    assert_eq!(votes[0].outbound_tss_nonce, 0);
}

#[tokio::test]
async fn test_one_signer_per_nonce() {
    let tss = Arc::new(GatedTss {
        inner: tss_signer(),
        gate: Notify::new(),
    });
    let h = SchedulerHarness::with_tss(
        SchedulerConfig {
            interval: Some(1),
            ..Default::default()
        },
        tss.clone(),
    )
    .await;
    h.consensus.add_cctx(sample_cctx(CHAIN_ID, 3, CoinType::Gas));

    let first = h.scheduler.schedule_outbound(20).await.unwrap();
    assert_eq!(first.dispatched, vec![3]);
    assert!(h.scheduler.is_signing(3));

    // still held by the first task
    let second = h.scheduler.schedule_outbound(21).await.unwrap();
    assert!(second.dispatched.is_empty());

    tss.gate.notify_one();
    for task in first.tasks {
        task.await.unwrap();
    }
    assert!(!h.scheduler.is_signing(3));
    assert_eq!(h.rpc.sent_raw().len(), 1);
}

#[tokio::test]
async fn test_tracked_nonce_uses_non_critical_interval() {
    let h = SchedulerHarness::new(Some(30)).await;
    h.consensus.add_cctx(sample_cctx(CHAIN_ID, 100, CoinType::Gas));
    h.consensus
        .add_outbound_tracker_entry(CHAIN_ID, 100, B256::repeat_byte(0x99));

    // in phase for the base interval, not for twice the base
    let report = h.scheduler.schedule_outbound(130).await.unwrap();
    assert!(report.dispatched.is_empty());

    let report = h.scheduler.schedule_outbound(160).await.unwrap();
    assert_eq!(report.dispatched, vec![100]);
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[test]
fn test_retry_interval_for_tracked_nonce() {
    let tracked = [100u64].into_iter().collect();
    assert_eq!(retry_interval(30, 100, true, &tracked), 60);
}

#[test]
fn test_low_gas_limit_clamped() {
    assert_eq!(clamp_gas_limit(50_000), MIN_GAS_LIMIT);
    assert_eq!(clamp_gas_limit(50_000), 100_000);
}

#[test]
fn test_confirmation_boundary() {
    let (n, c) = (1_000, 12);
    assert!(!has_enough_confirmations(n, n + c - 1, c));
    assert!(has_enough_confirmations(n, n + c, c));
    assert!(has_enough_confirmations(n, n + c + 50, c));
}

#[test]
fn test_replacement_needs_strictly_higher_fee() {
    let pending = PendingTxCache::new();
    let compliance = ComplianceFilter::default();
    let cctx = sample_cctx(CHAIN_ID, 7, CoinType::Gas);
    let ctx = BuildContext {
        chain_id: CHAIN_ID,
        tss_address: TSS,
        height: 1,
        pending: &pending,
        compliance: &compliance,
    };

    let stuck = |gas_price: u128| {
        TxBuilder::new(B256::repeat_byte(0x07))
            .from(TSS)
            .nonce(7)
            .gas_price(gas_price)
            .build()
    };

    // cctx pays 20 gwei
    pending.set_pending(7, stuck(20_000_000_000));
    assert!(matches!(
        build_outbound_data(&cctx, &ctx).unwrap(),
        BuildOutcome::Skip(SkipReason::Wait { .. })
    ));

    pending.set_pending(7, stuck(25_000_000_000));
    assert!(matches!(
        build_outbound_data(&cctx, &ctx).unwrap(),
        BuildOutcome::Skip(SkipReason::Wait { .. })
    ));

    pending.clear_pending(7);
    pending.set_pending(7, stuck(10_000_000_000));
    assert!(matches!(
        build_outbound_data(&cctx, &ctx).unwrap(),
        BuildOutcome::Ready(_)
    ));
}
