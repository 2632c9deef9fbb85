//! CCTX node: per-chain observer, outbound scheduler and TSS signer
//!
//! The node watches connected EVM chains for inbound deposits and votes
//! them to the consensus chain, then signs, broadcasts and reports the
//! outbound transactions the consensus chain asks for:
//!
//! - **Observer** - Inbound block scanning, inbound/outbound trackers, gas prices, RPC health
//! - **Scheduler** - Per consensus block, decides which pending nonces to (re)try
//! - **Signer** - Builds, TSS-signs and broadcasts outbound transactions
//! - **Tracker** - Reports confirmed outbound hashes to the consensus chain
//! - **Orchestrator** - One long-lived loop per chain per responsibility
//!
//! ## Feature Flags
//!
//! - `testing` - In-memory chain, consensus and TSS fakes for integration tests

// Core types and encodings
pub mod hash;
pub mod types;
pub mod vote;

// Configuration
pub mod chain_config;
pub mod config;

// Shared primitives
pub mod bounded_cache;
pub mod compliance;
pub mod guard;
pub mod pending;

// External interfaces
pub mod consensus;
pub mod contracts;
pub mod rpc;
pub mod tss;

// Persistence
pub mod checkpoint;
pub mod db;

// Pipeline
pub mod confirmation;
pub mod observer;
pub mod outbound;
pub mod scheduler;
pub mod signer;
pub mod tracker;

// Runtime
pub mod api;
pub mod metrics;
pub mod orchestrator;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;
