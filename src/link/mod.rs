//! # MAVLink protocol engine
//!
//! [`LinkEngine`] owns a [`Transport`](crate::core::io::Transport) and a
//! dedicated receive thread. Inbound bytes run through the incremental
//! [`codec::FrameDecoder`]; validated frames are handed to an installed
//! callback. Outbound messages are stamped with the next sequence number
//! and framed under a transmit lock, so concurrent senders emit a strictly
//! increasing sequence.

pub mod codec;

mod engine;
mod stats;

pub use engine::{FrameCallback, LinkEngine};
pub use stats::{LinkStats, LinkStatsSnapshot};

/// MAVLink dialect this bridge is built against.
///
/// The set of known message types is fixed at build time; messages outside
/// the dialect fail checksum validation and are counted, not delivered.
pub type BridgeDialect = mavio::dialects::common::Common;
