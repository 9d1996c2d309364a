//! Telemetry Uplink
//!
//! Accepts observations from the scan session and delivers them to the
//! collector through a [`Transport`], retrying failed attempts with
//! exponential backoff. `submit` only hands the observation to the delivery
//! worker; it never waits on the network.
//!
//! ## Ordering
//!
//! Each device has its own FIFO in the delivery queue and only the head of a
//! FIFO is attempted, so one device's observations are delivered in
//! submission order even while an earlier one is backing off.
//!
//! ## Shutdown
//!
//! After [`UplinkWorkerHandle::shutdown`] no new attempts are started once
//! the grace period runs out. Tasks still pending at that point are reported
//! as unterminated rather than dropped silently.

mod backoff;
mod queue;
mod types;
mod worker;

pub use backoff::BackoffPolicy;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{timeout, Duration},
};
use tokio_util::sync::CancellationToken;

use crate::{
    model::Observation,
    observability::{StatusSender, UplinkReport, UplinkTracker},
    state::scan_session::ObservationSink,
    transport::Transport,
};

use types::DeliveryTask;
use worker::DeliveryWorker;

/// Extra wait past the grace period before the worker task is aborted
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_per_sec: usize,
    pub refill_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct UplinkSettings {
    /// Total attempts per task, the first one included
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub request_timeout: Duration,
    /// Treat 4xx rejections (other than 408/429) as final
    pub abandon_on_client_error: bool,
    /// Drop-oldest bound on pending tasks; `None` is unbounded
    pub max_queue_len: Option<usize>,
    pub shutdown_grace: Duration,
    pub rate_limit: Option<RateLimit>,
}

impl Default for UplinkSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            request_timeout: Duration::from_secs(5),
            abandon_on_client_error: false,
            max_queue_len: None,
            shutdown_grace: Duration::from_secs(5),
            rate_limit: None,
        }
    }
}

/// Submission handle. Clones share the task id sequence and the worker.
#[derive(Debug, Clone)]
pub struct TelemetryUplink {
    intake: mpsc::UnboundedSender<DeliveryTask>,
    next_id: Arc<AtomicU64>,
    tracker: UplinkTracker,
}

impl TelemetryUplink {
    /// Queue an observation for delivery. Returns the task id.
    pub fn submit(&self, observation: Observation) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tracker.submitted();

        if self.intake.send(DeliveryTask::new(id, observation)).is_err() {
            tracing::warn!("Delivery worker has stopped, task {} dropped", id);
            self.tracker.dropped();
        }
        id
    }
}

impl ObservationSink for TelemetryUplink {
    fn accept(&self, observation: Observation) {
        self.submit(observation);
    }
}

pub struct UplinkWorkerHandle {
    shutdown: CancellationToken,
    handle: JoinHandle<UplinkReport>,
    grace: Duration,
    tracker: UplinkTracker,
}

impl UplinkWorkerHandle {
    /// Stop the worker and wait for it to settle pending tasks
    pub async fn shutdown(self) -> UplinkReport {
        self.shutdown.cancel();

        let mut handle = self.handle;
        match timeout(self.grace + SHUTDOWN_MARGIN, &mut handle).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!("Delivery worker failed: {}", e);
                self.tracker.report()
            }
            Err(_) => {
                tracing::error!("Delivery worker did not stop in time, aborting");
                handle.abort();
                self.tracker.report()
            }
        }
    }

    /// Signal shutdown without waiting for the worker to settle
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Start the delivery worker on `transport`
pub fn spawn<T: Transport>(
    transport: Arc<T>,
    settings: UplinkSettings,
    status: StatusSender,
    tracker: UplinkTracker,
) -> (TelemetryUplink, UplinkWorkerHandle) {
    let (intake, intake_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let grace = settings.shutdown_grace;

    let worker = DeliveryWorker::new(
        transport,
        settings,
        intake_rx,
        status,
        tracker.clone(),
        shutdown.clone(),
    );
    let handle = tokio::spawn(worker.run());

    let uplink = TelemetryUplink {
        intake,
        next_id: Arc::new(AtomicU64::new(1)),
        tracker: tracker.clone(),
    };
    let worker_handle = UplinkWorkerHandle {
        shutdown,
        handle,
        grace,
        tracker,
    };
    (uplink, worker_handle)
}
