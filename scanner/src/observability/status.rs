use derive_more::derive::Display;
use tokio::sync::mpsc;

/// Human-readable status lines for the host display
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StatusEvent {
    #[display("Scan started (window {window_ms} ms, interval {interval_ms} ms)")]
    ScanStarted { window_ms: u64, interval_ms: u64 },

    #[display("Scan stopped after {windows} window(s)")]
    ScanStopped { windows: u64 },

    #[display("Radio unavailable: {reason}")]
    RadioUnavailable { reason: String },

    #[display("Delivered {anchor_name}, RSSI {rssi} (attempt {attempts})")]
    Delivered {
        task_id: u64,
        anchor_name: String,
        rssi: i32,
        attempts: u32,
    },

    #[display("Delivery abandoned for {anchor_name}, RSSI {rssi} after {attempts} attempt(s): {reason}")]
    Abandoned {
        task_id: u64,
        anchor_name: String,
        rssi: i32,
        attempts: u32,
        reason: String,
    },

    #[display("Queue full, dropped oldest observation of {anchor_name}, RSSI {rssi}")]
    Dropped {
        task_id: u64,
        anchor_name: String,
        rssi: i32,
    },

    #[display("Undelivered at shutdown: {anchor_name}, RSSI {rssi} ({attempts} attempt(s) made)")]
    Unterminated {
        task_id: u64,
        anchor_name: String,
        rssi: i32,
        attempts: u32,
    },
}

pub type StatusReceiver = mpsc::UnboundedReceiver<StatusEvent>;

/// Sending half of the status stream; cheap to clone into each activity
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusSender {
    /// Never fails; events are dropped once the host stops listening
    pub fn emit(&self, event: StatusEvent) {
        tracing::debug!("Status: {}", event);
        let _ = self.tx.send(event);
    }
}

pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines() {
        let delivered = StatusEvent::Delivered {
            task_id: 1,
            anchor_name: "Anchor1".to_string(),
            rssi: -55,
            attempts: 3,
        };
        assert_eq!(delivered.to_string(), "Delivered Anchor1, RSSI -55 (attempt 3)");

        let unavailable = StatusEvent::RadioUnavailable {
            reason: "adapter disabled".to_string(),
        };
        assert_eq!(unavailable.to_string(), "Radio unavailable: adapter disabled");
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (sender, rx) = status_channel();
        drop(rx);
        sender.emit(StatusEvent::ScanStopped { windows: 0 });
    }
}
