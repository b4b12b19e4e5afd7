//! Lightweight peak tracking for answer balances.

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct PeakTracker {
    peak: AtomicI64,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self {
            peak: AtomicI64::new(0),
        }
    }

    /// Record a new current value; updates the peak if higher.
    pub fn record(&self, current: i64) {
        let mut cur = self.peak.load(Ordering::Relaxed);
        while current > cur {
            match self
                .peak
                .compare_exchange(cur, current, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(current, peak = self.peak.load(Ordering::Relaxed), "answers in flight");
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PeakTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeakTracker").field("peak", &self.peak()).finish()
    }
}
