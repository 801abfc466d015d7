//! # Shared shutdown state
//!
//! A [`SharedCloser`] is held by every party that may terminate a resource
//! (the owner that stops it, and the worker that dies on a fatal error).
//! [`Closable`] is a read-only view for parties that only need to observe
//! the state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Close flag shared between the parties that may terminate a resource.
///
/// Cloning yields another handle to the same flag; closing through any
/// handle closes all of them.
#[derive(Clone, Debug, Default)]
pub struct SharedCloser(Arc<AtomicBool>);

impl SharedCloser {
    /// Creates a new, open state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a read-only view of the state.
    pub fn as_closable(&self) -> Closable {
        Closable(self.0.clone())
    }

    /// Transitions the state to closed.
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` if the state has been closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Read-only view of a [`SharedCloser`].
#[derive(Clone, Debug)]
pub struct Closable(Arc<AtomicBool>);

impl Closable {
    /// Returns `true` if the associated [`SharedCloser`] has been closed.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
