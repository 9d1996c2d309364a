//! Uplink Types

use strum::{Display, IntoStaticStr};
use tokio::time::{Duration, Instant};

use crate::model::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum DeliveryState {
    Pending,
    InFlight,
    Delivered,
    Abandoned,
}

/// One observation plus its delivery bookkeeping. Owned by the delivery worker.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub id: u64,
    pub observation: Observation,
    /// Attempts made so far
    pub attempt: u32,
    pub next_eligible_at: Instant,
    pub state: DeliveryState,
    pub last_backoff: Option<Duration>,
    pub last_error: Option<String>,
}

impl DeliveryTask {
    pub fn new(id: u64, observation: Observation) -> Self {
        Self {
            id,
            observation,
            attempt: 0,
            next_eligible_at: Instant::now(),
            state: DeliveryState::Pending,
            last_backoff: None,
            last_error: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.observation.device_id
    }
}
