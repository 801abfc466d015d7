//! # Shared utilities

mod closable;

pub use closable::{Closable, SharedCloser};
