use serde::{Deserialize, Serialize};

/// Lower bound of the RSSI range considered trustworthy (dBm)
pub const RSSI_CONFIDENT_MIN: i32 = -100;
/// Upper bound of the RSSI range considered trustworthy (dBm)
pub const RSSI_CONFIDENT_MAX: i32 = -30;

/// One RSSI sample of an anchor, as sent to the collector.
///
/// Created once per accepted radio detection and handed from stage to stage
/// by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub device_id: String,
    pub anchor_name: String,
    pub rssi: i32,
    pub mac_address: String,
    /// Epoch milliseconds at capture
    pub timestamp: i64,
}

impl Observation {
    /// Values outside the usual indoor range are kept but should be weighted down
    pub fn is_low_confidence(&self) -> bool {
        !(RSSI_CONFIDENT_MIN..=RSSI_CONFIDENT_MAX).contains(&self.rssi)
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.anchor_name, self.rssi, self.mac_address
        )
    }
}
