//! Version-stamped shared parameter block
//!
//! The control thread mutates parameters through [`SharedParams`]; every
//! mutation bumps a version counter. The audio thread polls the version at
//! the top of each callback and, only when it differs from the last one it
//! observed, takes a snapshot and rebuilds its derived per-block state.
//! Parameter changes therefore become visible at block boundaries only.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{SpectrumParams, VzResult};

/// Shared, versioned parameter block.
pub struct SharedParams {
    version: AtomicU64,
    params: Mutex<SpectrumParams>,
}

impl SharedParams {
    pub fn new(params: SpectrumParams) -> Self {
        Self {
            version: AtomicU64::new(1),
            params: Mutex::new(params),
        }
    }

    /// Current version stamp. Monotonically increasing; never zero.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Snapshot the current parameters together with their version.
    pub fn snapshot(&self) -> (SpectrumParams, u64) {
        let guard = self.params.lock();
        // read the version under the lock so the pair is consistent
        let version = self.version.load(Ordering::Acquire);
        (guard.clone(), version)
    }

    /// Apply a mutation. The change is validated before it is published;
    /// an invalid combination leaves the previous parameters active.
    pub fn update<F>(&self, mutate: F) -> VzResult<u64>
    where
        F: FnOnce(&mut SpectrumParams),
    {
        let mut guard = self.params.lock();
        let mut candidate = guard.clone();
        mutate(&mut candidate);
        candidate.validate()?;
        *guard = candidate;
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(version)
    }

    /// Bump the version without changing parameters. Used when out-of-band
    /// state the derived constants depend on (such as the stream's sample
    /// rate) changes.
    pub fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new(SpectrumParams::default())
    }
}
