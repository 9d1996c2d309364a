//! Replay Radio
//!
//! Stands in for the platform BLE scanner by replaying a fixed detection
//! script inside every scan window.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tokio::{
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};

use crate::error::RadioError;

use super::{DetectionSink, RadioScanner, RawDetection};

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayEntry {
    /// Offset from the window opening
    pub offset_ms: u64,
    #[serde(flatten)]
    pub detection: RawDetection,
}

#[derive(Debug)]
pub struct ReplayRadio {
    script: Vec<ReplayEntry>,
    playback: Option<JoinHandle<()>>,
}

impl ReplayRadio {
    pub fn new(mut script: Vec<ReplayEntry>) -> Self {
        script.sort_by_key(|entry| entry.offset_ms);
        Self {
            script,
            playback: None,
        }
    }

    /// Load a JSON array of replay entries
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let script: Vec<ReplayEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Replay file {} is invalid", path.display()))?;
        tracing::info!(
            "Loaded {} replay detections from {}",
            script.len(),
            path.display()
        );
        Ok(Self::new(script))
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl RadioScanner for ReplayRadio {
    fn start_window(&mut self, sink: DetectionSink) -> Result<(), RadioError> {
        if self.playback.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(RadioError::AlreadyScanning);
        }

        let script = self.script.clone();
        let opened_at = Instant::now();
        self.playback = Some(tokio::spawn(async move {
            for entry in script {
                sleep_until(opened_at + Duration::from_millis(entry.offset_ms)).await;
                if !sink.send(entry.detection) {
                    break;
                }
            }
        }));

        Ok(())
    }

    fn stop_window(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn entry(offset_ms: u64, address: &str, rssi: i32) -> ReplayEntry {
        ReplayEntry {
            offset_ms,
            detection: RawDetection {
                address: Some(address.to_string()),
                name: None,
                rssi,
            },
        }
    }

    #[test]
    fn test_parse_replay_script() {
        let script: Vec<ReplayEntry> = serde_json::from_str(
            r#"[
                {"offset_ms": 100, "address": "AA:BB:CC:DD:EE:01", "name": "Anchor1", "rssi": -55},
                {"offset_ms": 250, "address": null, "rssi": -80}
            ]"#,
        )
        .unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script[0].detection.name.as_deref(), Some("Anchor1"));
        assert!(script[1].detection.address.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_in_offset_order() {
        let mut radio = ReplayRadio::new(vec![
            entry(300, "AA:BB:CC:DD:EE:02", -70),
            entry(100, "AA:BB:CC:DD:EE:01", -55),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        radio.start_window(DetectionSink::new(7, tx)).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.window, 7);
        assert_eq!(first.detection.rssi, -55);
        assert_eq!(second.detection.rssi, -70);
        radio.stop_window();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_window_halts_playback() {
        let mut radio = ReplayRadio::new(vec![entry(1_000, "AA:BB:CC:DD:EE:01", -55)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        radio.start_window(DetectionSink::new(1, tx)).unwrap();
        radio.stop_window();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_overlapping_windows() {
        let mut radio = ReplayRadio::new(vec![entry(1_000, "AA:BB:CC:DD:EE:01", -55)]);
        let (tx, _rx) = mpsc::unbounded_channel();
        radio.start_window(DetectionSink::new(1, tx.clone())).unwrap();
        assert_eq!(
            radio.start_window(DetectionSink::new(2, tx)),
            Err(RadioError::AlreadyScanning)
        );
    }
}
