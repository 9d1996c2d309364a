//! Uplink Tracker
//!
//! Delivery counters for the telemetry uplink.

use std::sync::{
    atomic::{AtomicU64, Ordering::Relaxed},
    Arc,
};

use super::common::format_key_value_table;

#[derive(Debug, Default)]
struct UplinkCounters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    abandoned: AtomicU64,
    dropped: AtomicU64,
    unterminated: AtomicU64,
    queued: AtomicU64,
}

/// Outcome counts, returned when the uplink shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UplinkReport {
    pub submitted: u64,
    pub delivered: u64,
    pub retried: u64,
    pub abandoned: u64,
    pub dropped: u64,
    pub unterminated: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UplinkTracker {
    counters: Arc<UplinkCounters>,
}

impl UplinkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) {
        self.counters.submitted.fetch_add(1, Relaxed);
    }

    pub fn delivered(&self) {
        self.counters.delivered.fetch_add(1, Relaxed);
    }

    pub fn retried(&self) {
        self.counters.retried.fetch_add(1, Relaxed);
    }

    pub fn abandoned(&self) {
        self.counters.abandoned.fetch_add(1, Relaxed);
    }

    pub fn dropped(&self) {
        self.counters.dropped.fetch_add(1, Relaxed);
    }

    pub fn unterminated(&self) {
        self.counters.unterminated.fetch_add(1, Relaxed);
    }

    /// Record the current delivery queue depth
    pub fn set_queued(&self, queued: usize) {
        self.counters.queued.store(queued as u64, Relaxed);
    }

    pub fn queued(&self) -> u64 {
        self.counters.queued.load(Relaxed)
    }

    pub fn report(&self) -> UplinkReport {
        let c = &self.counters;
        UplinkReport {
            submitted: c.submitted.load(Relaxed),
            delivered: c.delivered.load(Relaxed),
            retried: c.retried.load(Relaxed),
            abandoned: c.abandoned.load(Relaxed),
            dropped: c.dropped.load(Relaxed),
            unterminated: c.unterminated.load(Relaxed),
        }
    }

    /// Get formatted status table for logging
    pub fn get_status_table(&self) -> String {
        let report = self.report();
        format_key_value_table(
            "Telemetry Uplink",
            &[
                ("Submitted", report.submitted.to_string()),
                ("Delivered", report.delivered.to_string()),
                ("Retries", report.retried.to_string()),
                ("Abandoned", report.abandoned.to_string()),
                ("Dropped", report.dropped.to_string()),
                ("Unterminated", report.unterminated.to_string()),
                ("Queued", self.queued().to_string()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let tracker = UplinkTracker::new();
        let clone = tracker.clone();
        tracker.submitted();
        tracker.submitted();
        clone.delivered();
        clone.set_queued(1);

        let report = tracker.report();
        assert_eq!(report.submitted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(tracker.queued(), 1);
        assert!(tracker.get_status_table().contains("Submitted"));
    }
}
