use derive_more::derive::Display;
use tokio::time::{Duration, Instant};

use crate::radio::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WindowState {
    Idle,
    Active,
}

/// Scan window timing: how long each window stays open and the idle gap
/// before the next one. A zero interval means back-to-back windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub window: Duration,
    pub interval: Duration,
}

impl Default for DutyCycle {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(6),
            interval: Duration::ZERO,
        }
    }
}

/// The current scan window. Only the scan task reads or writes it.
#[derive(Debug, Clone)]
pub struct ScanWindow {
    id: WindowId,
    state: WindowState,
    opened_at: Option<Instant>,
    duration_budget: Duration,
    observations: u64,
}

impl ScanWindow {
    pub fn idle() -> Self {
        Self {
            id: 0,
            state: WindowState::Idle,
            opened_at: None,
            duration_budget: Duration::ZERO,
            observations: 0,
        }
    }

    pub fn open(&mut self, id: WindowId, duration_budget: Duration, now: Instant) {
        debug_assert_eq!(self.state, WindowState::Idle, "window reopened while active");
        self.id = id;
        self.state = WindowState::Active;
        self.opened_at = Some(now);
        self.duration_budget = duration_budget;
        self.observations = 0;
    }

    /// Returns the number of observations the window produced
    pub fn close(&mut self) -> u64 {
        self.state = WindowState::Idle;
        self.observations
    }

    /// True only for detections emitted for this window while it is open
    pub fn accepts(&self, window: WindowId) -> bool {
        self.state == WindowState::Active && self.id == window
    }

    pub fn record_observation(&mut self) {
        self.observations += 1;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WindowState::Active => self.opened_at.map(|at| at + self.duration_budget),
            WindowState::Idle => None,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == WindowState::Active
    }
}
