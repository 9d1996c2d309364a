//! In-memory transport for offline runs and tests.
//!
//! Records every delivered observation instead of contacting a collector.
//! Outcomes can be scripted per attempt and a fixed latency can be added.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tokio::time::{sleep, Duration};

use crate::{error::DeliveryError, model::Observation};

use super::Transport;

#[derive(Debug, Default)]
struct InMemoryState {
    delivered: Vec<Observation>,
    attempts: usize,
    outcomes: VecDeque<Result<(), DeliveryError>>,
    fail_always: Option<DeliveryError>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<InMemoryState>>,
    latency: Duration,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results handed out one per attempt; once used up every attempt succeeds
    pub fn with_outcomes(self, outcomes: Vec<Result<(), DeliveryError>>) -> Self {
        self.state.lock().unwrap().outcomes = outcomes.into();
        self
    }

    pub fn failing_with(self, error: DeliveryError) -> Self {
        self.state.lock().unwrap().fail_always = Some(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn delivered(&self) -> Vec<Observation> {
        self.state.lock().unwrap().delivered.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }
}

impl Transport for InMemoryTransport {
    async fn deliver(&self, observation: &Observation) -> Result<(), DeliveryError> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let mut state = self.state.lock().unwrap();
        state.attempts += 1;

        let outcome = match &state.fail_always {
            Some(error) => Err(error.clone()),
            None => state.outcomes.pop_front().unwrap_or(Ok(())),
        };

        if outcome.is_ok() {
            tracing::debug!("Offline delivery: {}", observation);
            state.delivered.push(observation.clone());
        }
        outcome
    }
}
