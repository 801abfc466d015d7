//! # Generated protocol types
//!
//! Types and service stubs compiled from `proto/mavgate.proto` by
//! `tonic-build`. The `MavlinkMessage` payload variants mirror the MAVLink
//! dialect subset fixed at build time.

tonic::include_proto!("mavgate");
