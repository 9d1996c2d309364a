//! Delivery Worker
//!
//! The uplink's background task. Moves submitted tasks into the delivery
//! queue, delivers the earliest eligible one, and reschedules or settles it.

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    sync::mpsc,
    time::{sleep_until, timeout, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::DeliveryError,
    observability::{StatusEvent, StatusSender, UplinkReport, UplinkTracker},
    rate_limiters::UplinkRateLimiter,
    state::far_future,
    transport::Transport,
};

use super::{
    queue::DeliveryQueue,
    types::{DeliveryState, DeliveryTask},
    UplinkSettings,
};

enum Wake {
    Shutdown,
    GraceExpired,
    Submitted(Option<DeliveryTask>),
    Eligible,
}

pub(super) struct DeliveryWorker<T> {
    transport: Arc<T>,
    settings: UplinkSettings,
    queue: DeliveryQueue,
    intake: mpsc::UnboundedReceiver<DeliveryTask>,
    status: StatusSender,
    tracker: UplinkTracker,
    limiter: UplinkRateLimiter,
    rng: StdRng,
    shutdown: CancellationToken,
    /// Set once shutdown is observed; pending work is abandoned past it
    grace_deadline: Option<Instant>,
}

impl<T: Transport> DeliveryWorker<T> {
    pub(super) fn new(
        transport: Arc<T>,
        settings: UplinkSettings,
        intake: mpsc::UnboundedReceiver<DeliveryTask>,
        status: StatusSender,
        tracker: UplinkTracker,
        shutdown: CancellationToken,
    ) -> Self {
        let limiter = match settings.rate_limit {
            Some(limit) => UplinkRateLimiter::new(limit.max_per_sec, limit.refill_interval_ms),
            None => UplinkRateLimiter::unlimited(),
        };
        Self {
            transport,
            queue: DeliveryQueue::new(settings.max_queue_len),
            settings,
            intake,
            status,
            tracker,
            limiter,
            rng: StdRng::from_entropy(),
            shutdown,
            grace_deadline: None,
        }
    }

    /// Main delivery loop - runs until shutdown and the grace period settle
    pub(super) async fn run(mut self) -> UplinkReport {
        tracing::info!(
            "Delivery worker started (max attempts: {}, {})",
            self.settings.max_attempts,
            self.limiter.get_status()
        );

        loop {
            self.drain_intake();
            if self.grace_deadline.is_none() && self.shutdown.is_cancelled() {
                self.begin_grace();
            }

            if let Some(deadline) = self.grace_deadline {
                if self.queue.is_empty() || Instant::now() >= deadline {
                    break;
                }
            }

            if let Some(task) = self.queue.pop_ready(Instant::now()) {
                self.attempt(task).await;
                continue;
            }

            let eligible_at = self.queue.next_eligible_at();
            let grace_deadline = self.grace_deadline;
            let shutdown = self.shutdown.clone();

            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled(), if grace_deadline.is_none() => Wake::Shutdown,
                _ = sleep_until(grace_deadline.unwrap_or_else(far_future)), if grace_deadline.is_some() => Wake::GraceExpired,
                task = self.intake.recv(), if grace_deadline.is_none() => Wake::Submitted(task),
                _ = sleep_until(eligible_at.unwrap_or_else(far_future)), if eligible_at.is_some() => Wake::Eligible,
            };

            match wake {
                Wake::Shutdown | Wake::GraceExpired | Wake::Eligible => {}
                Wake::Submitted(Some(task)) => self.enqueue(task),
                // Every handle is gone, nothing more can arrive
                Wake::Submitted(None) => self.begin_grace(),
            }
        }

        self.settle_unterminated();
        let report = self.tracker.report();
        tracing::info!(
            "Delivery worker stopped: {} delivered, {} abandoned, {} unterminated",
            report.delivered,
            report.abandoned,
            report.unterminated
        );
        report
    }

    fn begin_grace(&mut self) {
        let grace = self.settings.shutdown_grace;
        tracing::info!(
            "Uplink shutting down, {} task(s) pending, grace period {} ms",
            self.queue.len(),
            grace.as_millis()
        );
        self.grace_deadline = Some(Instant::now() + grace);
    }

    fn drain_intake(&mut self) {
        while let Ok(task) = self.intake.try_recv() {
            self.enqueue(task);
        }
    }

    fn enqueue(&mut self, task: DeliveryTask) {
        if let Some(dropped) = self.queue.push(task) {
            tracing::warn!(
                "Delivery queue full ({:?}), dropped task {}",
                self.settings.max_queue_len,
                dropped.id
            );
            self.tracker.dropped();
            self.status.emit(StatusEvent::Dropped {
                task_id: dropped.id,
                anchor_name: dropped.observation.anchor_name,
                rssi: dropped.observation.rssi,
            });
        }
        self.tracker.set_queued(self.queue.len());
    }

    /// One delivery attempt, cut short if the grace period runs out
    async fn attempt(&mut self, mut task: DeliveryTask) {
        task.state = DeliveryState::InFlight;
        task.attempt += 1;

        let shutdown_seen = self.grace_deadline.is_some();
        let (outcome, grace_deadline) = {
            let transport = self.transport.clone();
            let limiter = self.limiter.clone();
            let request_timeout = self.settings.request_timeout;
            let observation = &task.observation;

            let delivery = async {
                limiter.acquire_one().await;
                match timeout(request_timeout, transport.deliver(observation)).await {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Timeout),
                }
            };
            tokio::pin!(delivery);

            let shutdown = self.shutdown.clone();
            let grace = self.settings.shutdown_grace;
            let mut grace_deadline = self.grace_deadline;

            let outcome = loop {
                let cutoff = grace_deadline.unwrap_or_else(far_future);
                tokio::select! {
                    biased;
                    result = &mut delivery => break Some(result),
                    _ = shutdown.cancelled(), if grace_deadline.is_none() => {
                        grace_deadline = Some(Instant::now() + grace);
                    }
                    _ = sleep_until(cutoff), if grace_deadline.is_some() => break None,
                }
            };
            (outcome, grace_deadline)
        };

        if !shutdown_seen && grace_deadline.is_some() {
            tracing::info!(
                "Uplink shutting down during an attempt, grace period {} ms",
                self.settings.shutdown_grace.as_millis()
            );
            self.grace_deadline = grace_deadline;
        }

        match outcome {
            Some(Ok(())) => self.settle_delivered(task),
            Some(Err(e)) => self.settle_failed(task, e),
            // Cut off by the grace deadline, reported as unterminated
            None => self.queue.requeue(task),
        }
        self.tracker.set_queued(self.queue.len());
    }

    fn settle_delivered(&mut self, mut task: DeliveryTask) {
        task.state = DeliveryState::Delivered;
        self.tracker.delivered();
        tracing::debug!(
            "Delivered task {} ({}) on attempt {}",
            task.id,
            task.observation,
            task.attempt
        );
        self.status.emit(StatusEvent::Delivered {
            task_id: task.id,
            anchor_name: task.observation.anchor_name,
            rssi: task.observation.rssi,
            attempts: task.attempt,
        });
    }

    fn settle_failed(&mut self, mut task: DeliveryTask, error: DeliveryError) {
        let retryable = error.is_retryable(self.settings.abandon_on_client_error);
        task.last_error = Some(error.to_string());

        if retryable && task.attempt < self.settings.max_attempts {
            let delay =
                self.settings
                    .backoff
                    .delay_for(task.attempt, task.last_backoff, &mut self.rng);
            task.last_backoff = Some(delay);
            task.next_eligible_at = Instant::now() + delay;
            self.tracker.retried();
            tracing::debug!(
                "Task {} attempt {}/{} failed: {}; retrying in {} ms",
                task.id,
                task.attempt,
                self.settings.max_attempts,
                error,
                delay.as_millis()
            );
            self.queue.requeue(task);
            return;
        }

        task.state = DeliveryState::Abandoned;
        self.tracker.abandoned();
        tracing::warn!(
            "Abandoning task {} ({}) after {} attempt(s): {}",
            task.id,
            task.observation,
            task.attempt,
            error
        );
        self.status.emit(StatusEvent::Abandoned {
            task_id: task.id,
            anchor_name: task.observation.anchor_name,
            rssi: task.observation.rssi,
            attempts: task.attempt,
            reason: error.to_string(),
        });
    }

    /// Report whatever is still queued when the worker exits
    fn settle_unterminated(&mut self) {
        self.drain_intake();
        for task in self.queue.drain() {
            self.tracker.unterminated();
            tracing::warn!(
                "Task {} ({}) not delivered before shutdown, {} attempt(s) made",
                task.id,
                task.observation,
                task.attempt
            );
            self.status.emit(StatusEvent::Unterminated {
                task_id: task.id,
                anchor_name: task.observation.anchor_name,
                rssi: task.observation.rssi,
                attempts: task.attempt,
            });
        }
        self.tracker.set_queued(0);
    }
}
