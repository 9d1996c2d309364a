use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tokio::time::{sleep_until, Duration, Instant};

use crate::{
    error::RadioError,
    model::Observation,
    observability::{StatusEvent, StatusReceiver},
    radio::{DetectionSink, RadioScanner, RawDetection},
};

pub const TEST_DEVICE: &str = "RC_CAR_001";

pub fn detection(address: &str, name: Option<&str>, rssi: i32) -> RawDetection {
    RawDetection {
        address: Some(address.to_string()),
        name: name.map(str::to_string),
        rssi,
    }
}

pub fn observation(device_id: &str, anchor_name: &str, timestamp: i64) -> Observation {
    Observation {
        device_id: device_id.to_string(),
        anchor_name: anchor_name.to_string(),
        rssi: -60,
        mac_address: "AA:BB:CC:DD:EE:01".to_string(),
        timestamp,
    }
}

/// Collect every status event currently buffered
pub fn drain_status(rx: &mut StatusReceiver) -> Vec<StatusEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[derive(Debug, Default)]
pub struct RadioCalls {
    pub started: Vec<u64>,
    pub stopped: usize,
}

/// Radio that plays one script per window and keeps emitting after
/// `stop_window`, like a platform callback that is already in flight.
#[derive(Debug, Clone)]
pub struct ScriptedRadio {
    windows: Arc<Mutex<VecDeque<Vec<(u64, RawDetection)>>>>,
    start_failures: Arc<Mutex<usize>>,
    pub calls: Arc<Mutex<RadioCalls>>,
}

impl ScriptedRadio {
    pub fn new(windows: Vec<Vec<(u64, RawDetection)>>) -> Self {
        Self {
            windows: Arc::new(Mutex::new(windows.into())),
            start_failures: Arc::new(Mutex::new(0)),
            calls: Arc::new(Mutex::new(RadioCalls::default())),
        }
    }

    pub fn silent() -> Self {
        Self::new(vec![])
    }

    /// Fail the next `count` window starts
    pub fn failing_starts(self, count: usize) -> Self {
        *self.start_failures.lock().unwrap() = count;
        self
    }

    pub fn started_windows(&self) -> Vec<u64> {
        self.calls.lock().unwrap().started.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.calls.lock().unwrap().stopped
    }
}

impl RadioScanner for ScriptedRadio {
    fn start_window(&mut self, sink: DetectionSink) -> Result<(), RadioError> {
        {
            let mut failures = self.start_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(RadioError::Unavailable("adapter disabled".to_string()));
            }
        }

        self.calls.lock().unwrap().started.push(sink.window());
        let script = self.windows.lock().unwrap().pop_front().unwrap_or_default();
        let opened_at = Instant::now();
        tokio::spawn(async move {
            for (offset_ms, detection) in script {
                sleep_until(opened_at + Duration::from_millis(offset_ms)).await;
                sink.send(detection);
            }
        });

        Ok(())
    }

    fn stop_window(&mut self) {
        self.calls.lock().unwrap().stopped += 1;
    }
}
