//! # gRPC surface
//!
//! The bridge exposes two RPCs (see `proto/mavgate.proto`):
//!
//! * `StreamMessages`: server streaming; each call becomes a router
//!   subscription that lives until the client disconnects or the bridge
//!   shuts down.
//! * `SendMessage`: unary; the submitted message is converted to wire form
//!   and pushed through the protocol engine.
//!
//! [`convert`] is the pure mapping between wire frames and the generated
//! [`proto`] types.

pub mod convert;
pub mod proto;

mod service;

pub use service::{BridgeService, SendHandler, SubscriptionStream};
