use std::fmt::Debug;

use crate::prelude::*;

/// Uniform byte-oriented interface over a physical medium.
///
/// The protocol engine owns a transport for the whole interval between
/// [`LinkEngine::start`](crate::link::LinkEngine::start) and
/// [`LinkEngine::stop`](crate::link::LinkEngine::stop); no other component
/// touches it in between.
///
/// All reads are non-blocking: `Ok(0)` means "no data right now", `Err(_)`
/// means the transport failed and the connection is over. Writes are
/// best-effort and may return a short count.
pub trait Transport: Debug + Send {
    /// Opens the transport.
    ///
    /// Idempotent: opening an already open transport succeeds without side
    /// effects. A closed transport may be reopened.
    fn open(&mut self) -> Result<()>;

    /// Closes the transport and releases the underlying resource.
    ///
    /// Safe to call when the transport is not open.
    fn close(&mut self);

    /// Returns `true` if the transport is open and ready for I/O.
    fn is_open(&self) -> bool;

    /// Performs one non-blocking read into `buf`.
    ///
    /// Returns the number of bytes read. `Ok(0)` means no data is available
    /// at the moment, not end-of-stream. Would-block conditions are
    /// normalized to `Ok(0)`; any `Err(_)` is fatal for this transport.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` to the transport, best effort.
    ///
    /// May return a short count. Callers that require the full buffer on the
    /// wire must treat a short count as a failure.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}
