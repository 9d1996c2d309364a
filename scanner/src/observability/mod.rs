//! Observability Module
//!
//! Provides tools for monitoring the scanner including:
//! - Human-readable status events for the host display
//! - Scan and uplink counters rendered as status tables

mod common;
mod scan_tracker;
mod status;
mod uplink_tracker;

pub use scan_tracker::{ScanStats, ScanTracker};
pub use status::{status_channel, StatusEvent, StatusReceiver, StatusSender};
pub use uplink_tracker::{UplinkReport, UplinkTracker};
