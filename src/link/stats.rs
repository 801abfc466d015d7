use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters describing the state of a MAVLink connection.
///
/// Receive-side counters are bumped by the receive thread, `messages_sent`
/// by whoever calls [`LinkEngine::send`](crate::link::LinkEngine::send).
/// All counters are lock-free.
#[derive(Debug, Default)]
pub struct LinkStats {
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    parse_errors: AtomicU64,
    crc_errors: AtomicU64,
    sequence_gaps: AtomicU64,
}

impl LinkStats {
    pub(crate) fn inc_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_crc_errors(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_sequence_gaps(&self) {
        self.sequence_gaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`LinkStats`] counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    /// Frames received and validated.
    pub messages_received: u64,
    /// Frames successfully pushed through the transport.
    pub messages_sent: u64,
    /// Framing errors other than checksum mismatches.
    pub parse_errors: u64,
    /// Frames dropped due to checksum mismatch.
    pub crc_errors: u64,
    /// Discontinuities observed in inbound sequence numbers.
    pub sequence_gaps: u64,
}
