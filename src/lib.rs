//! # mavgate
//!
//! A bidirectional bridge between a MAVLink link and a typed gRPC streaming
//! API. Vehicles and ground stations speak binary MAVLink over UDP or a
//! serial line; arbitrary clients consume the same traffic through
//! server-streaming RPC subscriptions and submit messages back into the link
//! through a unary RPC.
//!
//! The bridge is organized around four subsystems:
//!
//! * [`core::io`]: byte-oriented transports ([`core::io::UdpTransport`],
//!   [`core::io::SerialTransport`]) behind a single [`core::io::Transport`]
//!   capability.
//! * [`link`]: the protocol engine, where a dedicated receive thread drives
//!   an incremental framing decoder, validates checksums, tracks sequence
//!   numbers, and owns the outgoing sequence counter under concurrent sends.
//! * [`router`]: a dynamic set of subscriber filters with fan-out delivery
//!   and automatic eviction of failed subscribers.
//! * [`grpc`]: the tonic service translating subscriptions into long-lived
//!   streams and submitted messages into framed transmissions.
//!
//! [`bridge::Bridge`] wires everything together and owns the lifecycle:
//!
//! ```rust,no_run
//! # #[tokio::main] async fn main() -> mavgate::error::Result<()> {
//! use mavgate::bridge::{Bridge, BridgeConf};
//!
//! let bridge = Bridge::new(BridgeConf {
//!     connection_url: "udp://:14550".to_string(),
//!     grpc_addr: "0.0.0.0:50051".parse().unwrap(),
//!     system_id: 1,
//!     component_id: 1,
//! })?;
//!
//! bridge.start()?;
//! bridge.wait().await?;
//! # Ok(()) }
//! ```

pub mod bridge;
pub mod consts;
pub mod core;
pub mod error;
pub mod grpc;
pub mod link;
pub mod logger;
pub mod prelude;
pub mod router;

pub use bridge::{Bridge, BridgeConf, ConnectionUrl};
pub use error::{Error, Result};
