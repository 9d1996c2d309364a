//! Orchestrator
//!
//! Wires the scan session's observations into the telemetry uplink and owns
//! the running-or-stopped flag for one device. The host drives it through
//! `start()`/`stop()` and reads human-readable status lines from the
//! receiver returned by `new()`.

use std::sync::Arc;

use crate::{
    model::AnchorRegistry,
    observability::{
        status_channel, ScanStats, ScanTracker, StatusReceiver, StatusSender, UplinkReport,
        UplinkTracker,
    },
    radio::RadioScanner,
    transport::Transport,
};

use super::{
    scan_session::{DutyCycle, ScanSession, ScanSessionController, ScanSettings},
    uplink::{self, UplinkSettings, UplinkWorkerHandle},
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub duty_cycle: DutyCycle,
    pub scan: ScanSettings,
    pub uplink: UplinkSettings,
}

pub struct Orchestrator<R, T> {
    config: SessionConfig,
    transport: Arc<T>,
    scan: ScanSession<R>,
    uplink: Option<UplinkWorkerHandle>,
    status: StatusSender,
    scan_tracker: ScanTracker,
    uplink_tracker: UplinkTracker,
}

impl<R: RadioScanner, T: Transport> Orchestrator<R, T> {
    pub fn new(
        config: SessionConfig,
        registry: Arc<AnchorRegistry>,
        radio: R,
        transport: Arc<T>,
    ) -> (Self, StatusReceiver) {
        let (status, status_rx) = status_channel();
        let scan_tracker = ScanTracker::new();
        let controller = ScanSessionController::new(
            radio,
            config.scan.clone(),
            registry,
            status.clone(),
            scan_tracker.clone(),
        );

        let orchestrator = Self {
            config,
            transport,
            scan: ScanSession::new(controller),
            uplink: None,
            status,
            scan_tracker,
            uplink_tracker: UplinkTracker::new(),
        };
        (orchestrator, status_rx)
    }

    /// Start delivery, then scanning. While running, retries a radio that
    /// failed to start; otherwise returns false.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            if self.scan.resume() {
                return true;
            }
            tracing::debug!("Orchestrator for {} already running", self.device_id());
            return false;
        }

        // Each run reports its own delivery outcomes
        self.uplink_tracker = UplinkTracker::new();
        let (telemetry, worker) = uplink::spawn(
            self.transport.clone(),
            self.config.uplink.clone(),
            self.status.clone(),
            self.uplink_tracker.clone(),
        );

        if !self.scan.start(self.config.duty_cycle, telemetry) {
            tracing::error!("Scan session for {} failed to start", self.device_id());
            worker.cancel();
            return false;
        }
        self.uplink = Some(worker);

        tracing::info!(
            "Started scanning for {} ({} ms windows)",
            self.device_id(),
            self.config.duty_cycle.window.as_millis()
        );
        true
    }

    /// Stop scanning, then give pending deliveries the grace period.
    /// Returns `None` when nothing was running.
    pub async fn stop(&mut self) -> Option<UplinkReport> {
        let worker = self.uplink.take()?;
        tracing::info!("Stopping scanning for {}...", self.device_id());

        self.scan.stop().await;
        let report = worker.shutdown().await;

        tracing::info!(
            "Stopped {}: {} delivered, {} abandoned, {} unterminated",
            self.device_id(),
            report.delivered,
            report.abandoned,
            report.unterminated
        );
        Some(report)
    }

    pub fn is_running(&self) -> bool {
        self.uplink.is_some()
    }

    pub fn device_id(&self) -> &str {
        &self.config.scan.device_id
    }

    pub fn scan_stats(&self) -> ScanStats {
        self.scan_tracker.get_stats()
    }

    /// Get formatted status tables for logging
    pub fn get_status_table(&self) -> String {
        format!(
            "{}\n{}",
            self.scan_tracker.get_status_table(),
            self.uplink_tracker.get_status_table()
        )
    }
}
