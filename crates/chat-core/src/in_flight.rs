//! In-flight request counter shared between the REST client and dispatch queue

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts outstanding requests; clones share the same counter
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; the count drops again when the guard is dropped
    #[must_use = "the request is only counted while the guard is alive"]
    pub fn enter(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of requests currently outstanding
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }
}

/// RAII guard returned by [`InFlight::enter`]
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}
