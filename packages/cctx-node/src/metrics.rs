//! Prometheus metrics for the CCTX node
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Gauge, GaugeVec, HistogramVec,
};

use crate::types::ChainId;

lazy_static! {
    // Inbound observation
    pub static ref BLOCKS_SCANNED: CounterVec = register_counter_vec!(
        "cctx_node_blocks_scanned_total",
        "Total number of blocks scanned for inbound events",
        &["chain"]
    ).unwrap();

    pub static ref LAST_SCANNED_BLOCK: GaugeVec = register_gauge_vec!(
        "cctx_node_last_scanned_block",
        "Last block whose inbound events were fully voted",
        &["chain"]
    ).unwrap();

    pub static ref LAST_BLOCK: GaugeVec = register_gauge_vec!(
        "cctx_node_last_block",
        "Latest chain height seen",
        &["chain"]
    ).unwrap();

    pub static ref VOTES_POSTED: CounterVec = register_counter_vec!(
        "cctx_node_votes_posted_total",
        "Votes posted to the consensus chain",
        &["chain", "kind", "status"]
    ).unwrap();

    pub static ref EVENTS_FILTERED: CounterVec = register_counter_vec!(
        "cctx_node_events_filtered_total",
        "Inbound events skipped by policy",
        &["chain", "reason"]
    ).unwrap();

    // Outbound
    pub static ref SCHEDULER_DISPATCHES: CounterVec = register_counter_vec!(
        "cctx_node_scheduler_dispatches_total",
        "Outbound signing attempts dispatched by the scheduler",
        &["chain"]
    ).unwrap();

    pub static ref BROADCASTS: CounterVec = register_counter_vec!(
        "cctx_node_broadcasts_total",
        "Outbound broadcasts by result",
        &["chain", "result"]
    ).unwrap();

    pub static ref TRACKER_REPORTS: CounterVec = register_counter_vec!(
        "cctx_node_tracker_reports_total",
        "Outbound tracker reporter outcomes",
        &["chain", "outcome"]
    ).unwrap();

    // RPC health
    pub static ref RPC_LATENCY: HistogramVec = register_histogram_vec!(
        "cctx_node_rpc_latest_block_latency_seconds",
        "Age of the latest block reported by the chain RPC",
        &["chain"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 100.0, 300.0, 900.0]
    ).unwrap();

    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "cctx_node_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "cctx_node_up",
        "Whether the node is up and running"
    ).unwrap();
}

/// Record a scanned block range ending at `last_scanned`
pub fn record_blocks_scanned(chain_id: ChainId, count: u64, last_scanned: u64) {
    let chain = chain_id.to_string();
    BLOCKS_SCANNED
        .with_label_values(&[&chain])
        .inc_by(count as f64);
    LAST_SCANNED_BLOCK
        .with_label_values(&[&chain])
        .set(last_scanned as f64);
}

pub fn set_last_block(chain_id: ChainId, block: u64) {
    LAST_BLOCK
        .with_label_values(&[&chain_id.to_string()])
        .set(block as f64);
}

/// Record a vote post
pub fn record_vote(chain_id: ChainId, kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    VOTES_POSTED
        .with_label_values(&[&chain_id.to_string(), kind, status])
        .inc();
}

pub fn record_filtered(chain_id: ChainId, reason: &str) {
    EVENTS_FILTERED
        .with_label_values(&[&chain_id.to_string(), reason])
        .inc();
}

pub fn record_dispatch(chain_id: ChainId) {
    SCHEDULER_DISPATCHES
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_broadcast(chain_id: ChainId, result: &str) {
    BROADCASTS
        .with_label_values(&[&chain_id.to_string(), result])
        .inc();
}

pub fn record_tracker_report(chain_id: ChainId, outcome: &str) {
    TRACKER_REPORTS
        .with_label_values(&[&chain_id.to_string(), outcome])
        .inc();
}

pub fn record_rpc_latency(chain_id: ChainId, seconds: f64) {
    RPC_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(seconds);
}

/// Record an error
pub fn record_error(chain_id: ChainId, error_type: &str) {
    ERRORS
        .with_label_values(&[&chain_id.to_string(), error_type])
        .inc();
}
