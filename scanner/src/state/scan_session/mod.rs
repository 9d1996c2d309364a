//! Scan Session
//!
//! Owns the scan duty cycle. A session runs one task that opens a scan
//! window on the radio, turns the detections reported for that window into
//! observations, closes the window when its budget elapses, and repeats
//! until stopped.
//!
//! ## Window gating
//!
//! The radio reports detections from arbitrary threads through a
//! [`DetectionSink`](crate::radio::DetectionSink) tagged with the window id.
//! The scan task reads those tags together with its own window state when it
//! processes each detection, so a callback that races a window close is
//! discarded instead of being attributed to the next window.

mod controller;
mod window;

pub use controller::{ScanSession, ScanSessionController, ScanSettings};
pub use window::{DutyCycle, ScanWindow, WindowState};

use tokio::sync::mpsc;

use crate::model::Observation;

/// Destination of the observations a scan session produces
pub trait ObservationSink: Send + Sync + 'static {
    fn accept(&self, observation: Observation);
}

impl ObservationSink for mpsc::UnboundedSender<Observation> {
    fn accept(&self, observation: Observation) {
        if self.send(observation).is_err() {
            tracing::warn!("Observation receiver dropped, discarding observation");
        }
    }
}
