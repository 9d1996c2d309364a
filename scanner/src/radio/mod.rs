//! Radio collaborator
//!
//! The platform radio is driven through [`RadioScanner`]. Each scan window
//! hands the radio a [`DetectionSink`] tagged with that window's id; the
//! radio may call it from any thread. Detections travel through a channel
//! into the scan controller's own task, which decides whether the window
//! they belong to is still open.

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::RadioError;

mod replay;

pub use replay::ReplayRadio;

pub type WindowId = u64;

/// One raw detection as reported by the radio
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawDetection {
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub rssi: i32,
}

/// A detection plus the window it was emitted for
#[derive(Debug, Clone)]
pub struct TaggedDetection {
    pub window: WindowId,
    pub detection: RawDetection,
}

/// Callback handle given to the radio for one scan window
#[derive(Debug, Clone)]
pub struct DetectionSink {
    window: WindowId,
    tx: mpsc::UnboundedSender<TaggedDetection>,
}

impl DetectionSink {
    pub(crate) fn new(window: WindowId, tx: mpsc::UnboundedSender<TaggedDetection>) -> Self {
        Self { window, tx }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Hand a detection to the controller. Returns false once the controller is gone.
    pub fn send(&self, detection: RawDetection) -> bool {
        self.tx
            .send(TaggedDetection {
                window: self.window,
                detection,
            })
            .is_ok()
    }
}

/// Platform radio capability
pub trait RadioScanner: Send + 'static {
    /// Begin scanning; detections are reported through `sink` until `stop_window`.
    fn start_window(&mut self, sink: DetectionSink) -> Result<(), RadioError>;

    /// Stop scanning. Callbacks already in flight may still arrive.
    fn stop_window(&mut self);
}
