use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for one ring-backed component.
///
/// Only updated when `Config::enable_metrics` is set.
#[derive(Debug, Default)]
pub struct Metrics {
    published: AtomicU64,
    consumed: AtomicU64,
    rejected: AtomicU64,
    handler_failures: AtomicU64,
    batches: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sequences published by producers.
    pub published: u64,
    /// Items handed to the consumer-side handler.
    pub consumed: u64,
    /// Sends refused because the ring was full.
    pub rejected: u64,
    /// Items whose handler returned an error or panicked.
    pub handler_failures: u64,
    /// End-of-batch signals delivered by the consumer loop.
    pub batches: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_published(&self, n: u64) {
        self.published.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_consumed(&self, n: u64) {
        self.consumed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_rejected(&self, n: u64) {
        self.rejected.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_handler_failures(&self, n: u64) {
        self.handler_failures.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_batches(&self, n: u64) {
        self.batches.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}
