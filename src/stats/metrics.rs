//! Statistics and metrics for stream bridges

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters for one bridge
///
/// Updated from the accept loop and the client session without locking.
#[derive(Debug, Default)]
pub struct BridgeStats {
    connections: AtomicU64,
    rejected: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_dropped: AtomicU64,
    source_failures: AtomicU64,
}

impl BridgeStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A client was accepted
    pub fn on_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// A client was turned away because the device was busy
    pub fn on_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was written; `wire_len` includes the length prefix
    pub fn on_frame_sent(&self, wire_len: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(wire_len as u64, Ordering::Relaxed);
    }

    /// A frame could not be framed and was skipped
    pub fn on_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// The frame source ended with an error
    pub fn on_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`BridgeStats`] at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Clients accepted
    pub connections: u64,
    /// Clients rejected while another was connected
    pub rejected: u64,
    /// Frames written
    pub frames_sent: u64,
    /// Bytes written including length prefixes
    pub bytes_sent: u64,
    /// Oversized frames skipped
    pub frames_dropped: u64,
    /// Sessions that ended with a native error
    pub source_failures: u64,
}

impl std::ops::Add for StatsSnapshot {
    type Output = StatsSnapshot;

    fn add(self, rhs: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections + rhs.connections,
            rejected: self.rejected + rhs.rejected,
            frames_sent: self.frames_sent + rhs.frames_sent,
            bytes_sent: self.bytes_sent + rhs.bytes_sent,
            frames_dropped: self.frames_dropped + rhs.frames_dropped,
            source_failures: self.source_failures + rhs.source_failures,
        }
    }
}

impl std::iter::Sum for StatsSnapshot {
    fn sum<I: Iterator<Item = StatsSnapshot>>(iter: I) -> StatsSnapshot {
        iter.fold(StatsSnapshot::default(), |acc, s| acc + s)
    }
}
