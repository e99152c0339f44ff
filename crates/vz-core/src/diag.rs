//! Diagnostics counters
//!
//! The audio thread never raises; failure modes degrade to skipped or
//! dropped frames and are accounted here with relaxed atomics. Any thread
//! may read a snapshot at any time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process counters for one analyser instance.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Frames abandoned because the audio view was momentarily inconsistent.
    skipped_frames: AtomicU64,
    /// Frames dropped because the frame queue was full.
    dropped_frames: AtomicU64,
    /// Frames successfully pushed to the queue.
    produced_frames: AtomicU64,
    /// Derived-state rebuilds observed at block boundaries.
    constant_rebuilds: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagSnapshot {
    pub skipped_frames: u64,
    pub dropped_frames: u64,
    pub produced_frames: u64,
    pub constant_rebuilds: u64,
}

impl Diagnostics {
    #[inline]
    pub fn count_skipped(&self) {
        self.skipped_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count_produced(&self) {
        self.produced_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count_rebuild(&self) {
        self.constant_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagSnapshot {
        DiagSnapshot {
            skipped_frames: self.skipped_frames.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            produced_frames: self.produced_frames.load(Ordering::Relaxed),
            constant_rebuilds: self.constant_rebuilds.load(Ordering::Relaxed),
        }
    }
}
