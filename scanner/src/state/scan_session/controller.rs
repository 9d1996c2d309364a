//! Scan Session Controller
//!
//! The duty-cycle loop and the detection-to-observation step.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use lib_utils::{mac, time::now_millis};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::RadioError,
    model::{resolve_anchor_name, AnchorRegistry, Observation},
    observability::{ScanTracker, StatusEvent, StatusSender},
    radio::{DetectionSink, RadioScanner, RawDetection, TaggedDetection, WindowId},
    state::far_future,
};

use super::{
    window::{DutyCycle, ScanWindow, WindowState},
    ObservationSink,
};

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub device_id: String,
    /// Retry delay after the radio refuses to start; `None` waits for the next `start()`
    pub radio_retry: Option<Duration>,
    /// Discard detections from addresses missing in the anchor table
    pub filter_unregistered: bool,
}

/// Lets `start()` wake a scan task parked after a radio failure
#[derive(Debug, Default)]
pub(crate) struct ResumeSignal {
    parked: AtomicBool,
    notify: Notify,
}

impl ResumeSignal {
    fn park(&self) {
        self.parked.store(true, Ordering::SeqCst);
    }

    fn unpark(&self) {
        self.parked.store(false, Ordering::SeqCst);
    }

    /// Wake the task if it is parked. Returns false when it was not.
    fn resume(&self) -> bool {
        if self.parked.swap(false, Ordering::SeqCst) {
            self.notify.notify_one();
            return true;
        }
        false
    }

    async fn resumed(resume: Option<&Self>) {
        match resume {
            Some(resume) => resume.notify.notified().await,
            None => std::future::pending().await,
        }
    }
}

enum Wake {
    Stopped,
    Elapsed,
    Detection(TaggedDetection),
}

/// Turns radio detections into observations for one device
pub struct ScanSessionController<R> {
    radio: R,
    settings: ScanSettings,
    registry: Arc<AnchorRegistry>,
    status: StatusSender,
    tracker: ScanTracker,
    detections_tx: mpsc::UnboundedSender<TaggedDetection>,
    detections_rx: mpsc::UnboundedReceiver<TaggedDetection>,
    window: ScanWindow,
    next_window: WindowId,
    last_timestamp: i64,
}

impl<R: RadioScanner> ScanSessionController<R> {
    pub fn new(
        radio: R,
        settings: ScanSettings,
        registry: Arc<AnchorRegistry>,
        status: StatusSender,
        tracker: ScanTracker,
    ) -> Self {
        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        Self {
            radio,
            settings,
            registry,
            status,
            tracker,
            detections_tx,
            detections_rx,
            window: ScanWindow::idle(),
            next_window: 1,
            last_timestamp: i64::MIN,
        }
    }

    pub fn window_state(&self) -> WindowState {
        self.window.state()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Duty-cycle loop. Runs until `shutdown` is cancelled and hands the
    /// controller back so the session can be restarted.
    pub(crate) async fn run<S: ObservationSink>(
        mut self,
        duty_cycle: DutyCycle,
        sink: S,
        shutdown: CancellationToken,
        resume: Arc<ResumeSignal>,
    ) -> Self {
        let mut windows = 0u64;
        self.status.emit(StatusEvent::ScanStarted {
            window_ms: duty_cycle.window.as_millis() as u64,
            interval_ms: duty_cycle.interval.as_millis() as u64,
        });

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.open_window(duty_cycle.window) {
                self.tracker.radio_failure();
                tracing::warn!("Failed to open scan window: {}", e);
                self.status.emit(StatusEvent::RadioUnavailable {
                    reason: e.to_string(),
                });

                // Stay Idle until the retry delay passes, or without one
                // until the next start()
                let stopped = match self.settings.radio_retry {
                    Some(delay) => self.idle(Some(delay), &shutdown, &sink, None).await,
                    None => {
                        resume.park();
                        let stopped = self
                            .idle(None, &shutdown, &sink, Some(resume.as_ref()))
                            .await;
                        resume.unpark();
                        stopped
                    }
                };
                if stopped {
                    break;
                }
                continue;
            }
            windows += 1;

            if self.run_window(&shutdown, &sink).await {
                break;
            }

            if !duty_cycle.interval.is_zero()
                && self
                    .idle(Some(duty_cycle.interval), &shutdown, &sink, None)
                    .await
            {
                break;
            }
        }

        self.close_window();
        // Anything still buffered arrived after the last close
        while let Ok(tagged) = self.detections_rx.try_recv() {
            self.on_detection(tagged, &sink);
        }

        self.status.emit(StatusEvent::ScanStopped { windows });
        self
    }

    /// Process detections until the window budget elapses or shutdown.
    /// Returns true when stopped.
    async fn run_window<S: ObservationSink>(
        &mut self,
        shutdown: &CancellationToken,
        sink: &S,
    ) -> bool {
        let deadline = self.window.deadline().unwrap_or_else(Instant::now);

        loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Wake::Stopped,
                _ = sleep_until(deadline) => Wake::Elapsed,
                Some(tagged) = self.detections_rx.recv() => Wake::Detection(tagged),
            };

            match wake {
                Wake::Stopped => {
                    self.close_window();
                    return true;
                }
                Wake::Elapsed => {
                    self.close_window();
                    return false;
                }
                Wake::Detection(tagged) => self.on_detection(tagged, sink),
            }
        }
    }

    /// Wait while Idle for `duration`, or until resumed when it is `None`.
    /// Returns true when stopped.
    async fn idle<S: ObservationSink>(
        &mut self,
        duration: Option<Duration>,
        shutdown: &CancellationToken,
        sink: &S,
        resume: Option<&ResumeSignal>,
    ) -> bool {
        let until = duration.map(|d| Instant::now() + d);

        loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Wake::Stopped,
                _ = sleep_until(until.unwrap_or_else(far_future)), if until.is_some() => Wake::Elapsed,
                _ = ResumeSignal::resumed(resume) => Wake::Elapsed,
                Some(tagged) = self.detections_rx.recv() => Wake::Detection(tagged),
            };

            match wake {
                Wake::Stopped => return true,
                Wake::Elapsed => return false,
                Wake::Detection(tagged) => self.on_detection(tagged, sink),
            }
        }
    }

    fn open_window(&mut self, budget: Duration) -> Result<(), RadioError> {
        let id = self.next_window;
        let sink = DetectionSink::new(id, self.detections_tx.clone());
        self.radio.start_window(sink)?;

        self.next_window += 1;
        self.window.open(id, budget, Instant::now());
        self.tracker.window_opened();
        tracing::debug!("Scan window {} opened ({} ms)", id, budget.as_millis());
        Ok(())
    }

    fn close_window(&mut self) {
        if !self.window.is_active() {
            return;
        }
        self.radio.stop_window();
        let observations = self.window.close();
        tracing::debug!(
            "Scan window {} closed with {} observation(s)",
            self.window.id(),
            observations
        );
    }

    fn on_detection<S: ObservationSink>(&mut self, tagged: TaggedDetection, sink: &S) {
        if let Some(observation) = self.observe(tagged) {
            sink.accept(observation);
        }
    }

    /// Convert one detection into an observation, gated on the window state
    /// at the moment of processing.
    pub fn observe(&mut self, tagged: TaggedDetection) -> Option<Observation> {
        if !self.window.accepts(tagged.window) {
            self.tracker.discarded_late();
            tracing::trace!(
                "Discarding detection for window {} (current window {} is {})",
                tagged.window,
                self.window.id(),
                self.window.state()
            );
            return None;
        }

        let RawDetection {
            address,
            name,
            rssi,
        } = tagged.detection;

        let Some(mac_address) = address.as_deref().and_then(mac::normalize) else {
            self.tracker.discarded_malformed();
            tracing::trace!("Discarding detection with malformed address {:?}", address);
            return None;
        };

        if self.settings.filter_unregistered && self.registry.lookup(&mac_address).is_none() {
            self.tracker.discarded_unregistered();
            tracing::trace!("Discarding detection from unregistered {}", mac_address);
            return None;
        }

        let anchor_name = resolve_anchor_name(&self.registry, name.as_deref(), &mac_address);
        let observation = Observation {
            device_id: self.settings.device_id.clone(),
            anchor_name,
            rssi,
            mac_address,
            timestamp: self.capture_timestamp(),
        };

        if observation.is_low_confidence() {
            tracing::debug!("Low-confidence RSSI: {}", observation);
        }

        self.window.record_observation();
        self.tracker.observation();
        Some(observation)
    }

    /// Wall clock, never behind the previous capture
    fn capture_timestamp(&mut self) -> i64 {
        self.last_timestamp = self.last_timestamp.max(now_millis());
        self.last_timestamp
    }
}

struct RunningScan<R> {
    shutdown: CancellationToken,
    resume: Arc<ResumeSignal>,
    handle: JoinHandle<ScanSessionController<R>>,
}

/// Start/stop handle around a controller
pub struct ScanSession<R> {
    controller: Option<ScanSessionController<R>>,
    running: Option<RunningScan<R>>,
}

impl<R: RadioScanner> ScanSession<R> {
    pub fn new(controller: ScanSessionController<R>) -> Self {
        Self {
            controller: Some(controller),
            running: None,
        }
    }

    /// Spawn the duty-cycle task. When it is already running, retries the
    /// radio if the task is parked after a radio failure; returns false otherwise.
    pub fn start<S: ObservationSink>(&mut self, duty_cycle: DutyCycle, sink: S) -> bool {
        if self.running.is_some() {
            return self.resume();
        }
        let Some(controller) = self.controller.take() else {
            tracing::error!("Scan session has no controller, cannot start");
            return false;
        };

        let shutdown = CancellationToken::new();
        let resume = Arc::new(ResumeSignal::default());
        let handle = tokio::spawn(controller.run(
            duty_cycle,
            sink,
            shutdown.clone(),
            resume.clone(),
        ));
        self.running = Some(RunningScan {
            shutdown,
            resume,
            handle,
        });
        true
    }

    /// Retry the radio on a running session parked after a radio failure
    pub fn resume(&self) -> bool {
        let Some(running) = &self.running else {
            return false;
        };
        if running.resume.resume() {
            tracing::info!("Retrying the radio after an earlier failure");
            return true;
        }
        tracing::debug!("Scan session already running");
        false
    }

    /// Close the current window and stop scheduling. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(RunningScan {
            shutdown, handle, ..
        }) = self.running.take()
        else {
            return;
        };

        shutdown.cancel();
        match handle.await {
            Ok(controller) => self.controller = Some(controller),
            Err(e) => tracing::error!("Scan session task failed: {}", e),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The controller, while the session is stopped
    pub fn controller(&self) -> Option<&ScanSessionController<R>> {
        self.controller.as_ref()
    }
}
