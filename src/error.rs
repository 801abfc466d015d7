//! # Errors
//!
//! All mavgate errors are variants of [`Error`]. Fallible operations return
//! [`Result`], re-exported through [`crate::prelude`].

/// Common result type returned by mavgate functions.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors generated by mavgate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MAVLink protocol error from the underlying framing library.
    #[error("MAVLink error: {0}")]
    Mavlink(#[from] mavio::error::Error),

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// gRPC transport error.
    #[error("gRPC transport error: {0}")]
    Rpc(#[from] tonic::transport::Error),

    /// Connection URL does not match any of the supported grammars.
    #[error("invalid connection URL: {0}")]
    InvalidUrl(String),

    /// Requested baud rate is not one of the standard rates.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// Transport is in a state that does not permit the operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol engine lifecycle or send-path error.
    #[error("link error: {0}")]
    Link(String),

    /// Translation between wire and structured message form failed.
    #[error("message conversion error: {0}")]
    Convert(String),
}
