use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing batch outcomes.
#[derive(Default)]
pub struct SkillMetrics {
    records_accepted: AtomicU64,
    records_failed: AtomicU64,
    records_dropped: AtomicU64,
}

impl SkillMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transformed record, accepted or failed.
    pub fn record_result(&self, accepted: bool) {
        let counter = if accepted {
            &self.records_accepted
        } else {
            &self.records_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an item left out of the response for lack of a `recordId`.
    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of batch counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Records queued for enrichment since startup.
    pub records_accepted: u64,
    /// Records answered with an error entry.
    pub records_failed: u64,
    /// Items omitted from responses because they had no `recordId`.
    pub records_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_outcomes() {
        let metrics = SkillMetrics::new();
        metrics.record_result(true);
        metrics.record_result(true);
        metrics.record_result(false);
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_accepted, 2);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(snapshot.records_dropped, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let snapshot = SkillMetrics::new().snapshot();
        assert_eq!(snapshot.records_accepted, 0);
        assert_eq!(snapshot.records_failed, 0);
        assert_eq!(snapshot.records_dropped, 0);
    }
}
