//! Pipeline counters
//!
//! Written from the render or worker thread with relaxed atomics, read from
//! anywhere. This is the observable channel for per-frame failures that must
//! not stop the stream.

use std::time::Duration;

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Live pipeline statistics
#[derive(Debug, Default)]
pub struct PipelineStats {
    windows_emitted: AtomicU64,
    frames_published: AtomicU64,
    conversion_failures: AtomicU64,
    inference_failures: AtomicU64,
    windows_dropped: AtomicU64,
    inference_overruns: AtomicU64,
    last_inference_us: AtomicU64,
    max_inference_us: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub windows_emitted: u64,
    pub frames_published: u64,
    pub conversion_failures: u64,
    pub inference_failures: u64,
    pub windows_dropped: u64,
    pub inference_overruns: u64,
    pub last_inference_us: u64,
    pub max_inference_us: u64,
}

impl StatsSnapshot {
    /// Frames that produced no published result
    pub fn frames_skipped(&self) -> u64 {
        self.conversion_failures + self.inference_failures + self.windows_dropped
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_window(&self) {
        self.windows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_conversion_failure(&self) {
        self.conversion_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count windows replaced before anyone classified them
    #[inline]
    pub fn record_dropped(&self, count: u64) {
        self.windows_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one inference duration; returns true if it overran `budget`
    #[inline]
    pub fn record_inference_time(&self, elapsed: Duration, budget: Duration) -> bool {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.last_inference_us.store(us, Ordering::Relaxed);
        self.max_inference_us.fetch_max(us, Ordering::Relaxed);

        let overrun = elapsed > budget;
        if overrun {
            self.inference_overruns.fetch_add(1, Ordering::Relaxed);
        }
        overrun
    }

    /// Zero all counters
    pub fn reset(&self) {
        for counter in [
            &self.windows_emitted,
            &self.frames_published,
            &self.conversion_failures,
            &self.inference_failures,
            &self.windows_dropped,
            &self.inference_overruns,
            &self.last_inference_us,
            &self.max_inference_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            windows_emitted: self.windows_emitted.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            windows_dropped: self.windows_dropped.load(Ordering::Relaxed),
            inference_overruns: self.inference_overruns.load(Ordering::Relaxed),
            last_inference_us: self.last_inference_us.load(Ordering::Relaxed),
            max_inference_us: self.max_inference_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let stats = PipelineStats::new();
        stats.record_window();
        stats.record_window();
        stats.record_published();
        stats.record_inference_failure();
        stats.record_dropped(3);

        let snap = stats.snapshot();
        assert_eq!(snap.windows_emitted, 2);
        assert_eq!(snap.frames_published, 1);
        assert_eq!(snap.windows_dropped, 3);
        assert_eq!(snap.frames_skipped(), 4);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_inference_timing() {
        let stats = PipelineStats::new();
        let budget = Duration::from_millis(10);

        assert!(!stats.record_inference_time(Duration::from_millis(4), budget));
        assert!(stats.record_inference_time(Duration::from_millis(25), budget));
        assert!(!stats.record_inference_time(Duration::from_millis(2), budget));

        let snap = stats.snapshot();
        assert_eq!(snap.last_inference_us, 2_000);
        assert_eq!(snap.max_inference_us, 25_000);
        assert_eq!(snap.inference_overruns, 1);
    }
}
