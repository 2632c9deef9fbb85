//! Outbound transaction planning
//!
//! - [`kind`]: pure selection of the transaction shape
//! - [`data`]: CCTX to concrete transaction parameters

pub mod data;
pub mod kind;

pub use data::{
    build_outbound_data, outbound_destination, outbound_kind_for, BuildContext, BuildOutcome,
    OutboundData, SkipReason,
};
pub use kind::{classify_outbound, ClassifyError, OutboundFacts, OutboundKind};
