//! Scan Tracker
//!
//! Counters for the scan duty cycle. Written only by the scan activity,
//! read by anyone holding a clone.

use std::sync::{
    atomic::{AtomicU64, Ordering::Relaxed},
    Arc,
};

use super::common::format_key_value_table;

#[derive(Debug, Default)]
struct ScanCounters {
    windows_opened: AtomicU64,
    observations: AtomicU64,
    discarded_late: AtomicU64,
    discarded_malformed: AtomicU64,
    discarded_unregistered: AtomicU64,
    radio_failures: AtomicU64,
}

/// Snapshot of the scan counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanStats {
    pub windows_opened: u64,
    pub observations: u64,
    pub discarded_late: u64,
    pub discarded_malformed: u64,
    pub discarded_unregistered: u64,
    pub radio_failures: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanTracker {
    counters: Arc<ScanCounters>,
}

impl ScanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window_opened(&self) {
        self.counters.windows_opened.fetch_add(1, Relaxed);
    }

    pub fn observation(&self) {
        self.counters.observations.fetch_add(1, Relaxed);
    }

    pub fn discarded_late(&self) {
        self.counters.discarded_late.fetch_add(1, Relaxed);
    }

    pub fn discarded_malformed(&self) {
        self.counters.discarded_malformed.fetch_add(1, Relaxed);
    }

    pub fn discarded_unregistered(&self) {
        self.counters.discarded_unregistered.fetch_add(1, Relaxed);
    }

    pub fn radio_failure(&self) {
        self.counters.radio_failures.fetch_add(1, Relaxed);
    }

    pub fn get_stats(&self) -> ScanStats {
        let c = &self.counters;
        ScanStats {
            windows_opened: c.windows_opened.load(Relaxed),
            observations: c.observations.load(Relaxed),
            discarded_late: c.discarded_late.load(Relaxed),
            discarded_malformed: c.discarded_malformed.load(Relaxed),
            discarded_unregistered: c.discarded_unregistered.load(Relaxed),
            radio_failures: c.radio_failures.load(Relaxed),
        }
    }

    /// Get formatted status table for logging
    pub fn get_status_table(&self) -> String {
        let stats = self.get_stats();
        format_key_value_table(
            "Scan Session",
            &[
                ("Windows opened", stats.windows_opened.to_string()),
                ("Observations", stats.observations.to_string()),
                ("Discarded (late)", stats.discarded_late.to_string()),
                ("Discarded (malformed)", stats.discarded_malformed.to_string()),
                (
                    "Discarded (unregistered)",
                    stats.discarded_unregistered.to_string(),
                ),
                ("Radio failures", stats.radio_failures.to_string()),
            ],
        )
    }
}
