//! # Common constants

use std::time::Duration;

/// Maximum length of a MAVLink packet (`MAVLink 2` with signature).
pub const MAX_PACKET_LEN: usize = 280;

/// Pause between polls of an idle link in the receive loop.
pub const READ_IDLE_INTERVAL: Duration = Duration::from_millis(1);

/// Capacity of the per-subscription delivery channel.
///
/// A subscriber that falls this many messages behind is treated as failed
/// and evicted.
pub const STREAM_CHANNEL_CAPACITY: usize = 256;

/// How long the gRPC server is allowed to drain after shutdown is signalled.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the logger queue. On overflow the oldest record is dropped.
pub const LOG_QUEUE_CAPACITY: usize = 1024;
