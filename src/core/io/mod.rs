//! # Byte-oriented transports
//!
//! [`Transport`] is the single capability the protocol engine requires from
//! the physical medium. Two backends are provided:
//!
//! * [`UdpTransport`]: datagram I/O with learn-on-receive endpoint
//!   discovery.
//! * [`SerialTransport`]: a serial device in raw 8-N-1 mode.

mod serial;
mod transport;
mod udp;

pub use serial::SerialTransport;
pub use transport::Transport;
pub use udp::UdpTransport;
