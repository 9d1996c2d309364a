use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use strum::Display;
use tokio::time::Duration;
use url::Url;

use crate::{
    model::{AnchorInfo, AnchorRegistry},
    state::{
        orchestrator::SessionConfig,
        scan_session::{DutyCycle, ScanSettings},
        uplink::{BackoffPolicy, RateLimit, UplinkSettings},
    },
};

const ENV_PREFIX: &str = "SCANNER";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "RC_CAR_001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub window_ms: u64,
    /// Idle gap between windows; 0 runs them back-to-back
    pub interval_ms: u64,
    pub radio_retry_ms: Option<u64>,
    pub filter_unregistered: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_ms: 6_000,
            interval_ms: 0,
            radio_retry_ms: None,
            filter_unregistered: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportMode {
    /// POST to the collector at `base_url`
    Http,
    /// Record deliveries in memory
    #[default]
    Offline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
            jitter: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_sec: usize,
    pub refill_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub mode: TransportMode,
    pub base_url: Option<Url>,
    pub endpoint_path: String,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub abandon_on_client_error: bool,
    pub max_queue_len: Option<usize>,
    pub shutdown_grace_ms: u64,
    pub backoff: BackoffConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            base_url: None,
            endpoint_path: "location/rssi".to_string(),
            request_timeout_ms: 5_000,
            max_attempts: 5,
            abandon_on_client_error: false,
            max_queue_len: None,
            shutdown_grace_ms: 5_000,
            backoff: BackoffConfig::default(),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Detection script for the replay radio, relative to the config dir
    pub replay_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub scan: ScanConfig,
    pub uplink: UplinkConfig,
    pub radio: RadioConfig,
    pub anchors: Vec<AnchorInfo>,
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scanner Config:\nDevice: {}\n\nScan: {:?}\n\nUplink ({}): {:?}\n\nRadio: {:?}\n\nAnchors:\n{}",
            self.device.id,
            self.scan,
            self.uplink.mode,
            self.uplink,
            self.radio,
            self.anchors
                .iter()
                .map(|a| format!("{} -> {}", a.name, a.address))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// `$APP_DIR`, or the workspace `config/` directory under cargo
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var("APP_DIR") {
        return PathBuf::from(dir);
    }
    match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => Path::new(&dir)
            .parent()
            .map(|parent| parent.join("config"))
            .unwrap_or_else(|| PathBuf::from("config")),
        Err(_) => PathBuf::from("config"),
    }
}

impl AppConfig {
    /// Load `config.toml` from `dir`, with `SCANNER_*` environment overrides
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join("config.toml");
        let config: AppConfig = Config::builder()
            .add_source(File::from(path.as_path()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("{} is invalid", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.device.id.trim().is_empty() {
            bail!("device.id must not be empty");
        }
        if self.scan.window_ms == 0 {
            bail!("scan.window_ms must be greater than 0");
        }
        if self.uplink.max_attempts == 0 {
            bail!("uplink.max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.uplink.backoff.jitter) {
            bail!(
                "uplink.backoff.jitter must be within 0.0..=1.0, got {}",
                self.uplink.backoff.jitter
            );
        }
        if self.uplink.backoff.base_ms > self.uplink.backoff.max_ms {
            bail!("uplink.backoff.base_ms must not exceed uplink.backoff.max_ms");
        }
        if self.uplink.mode == TransportMode::Http && self.uplink.base_url.is_none() {
            bail!("uplink.base_url is required in http mode");
        }
        if self.uplink.max_queue_len == Some(0) {
            bail!("uplink.max_queue_len must be greater than 0 when set");
        }
        Ok(())
    }

    pub fn anchor_registry(&self) -> anyhow::Result<AnchorRegistry> {
        AnchorRegistry::new(self.anchors.clone()).context("Invalid anchor table")
    }

    pub fn replay_path(&self, dir: &Path) -> Option<PathBuf> {
        self.radio.replay_file.as_ref().map(|file| dir.join(file))
    }

    pub fn duty_cycle(&self) -> DutyCycle {
        DutyCycle {
            window: Duration::from_millis(self.scan.window_ms),
            interval: Duration::from_millis(self.scan.interval_ms),
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            device_id: self.device.id.clone(),
            radio_retry: self.scan.radio_retry_ms.map(Duration::from_millis),
            filter_unregistered: self.scan.filter_unregistered,
        }
    }

    pub fn uplink_settings(&self) -> UplinkSettings {
        let uplink = &self.uplink;
        UplinkSettings {
            max_attempts: uplink.max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(uplink.backoff.base_ms),
                max: Duration::from_millis(uplink.backoff.max_ms),
                jitter: uplink.backoff.jitter,
            },
            request_timeout: Duration::from_millis(uplink.request_timeout_ms),
            abandon_on_client_error: uplink.abandon_on_client_error,
            max_queue_len: uplink.max_queue_len,
            shutdown_grace: Duration::from_millis(uplink.shutdown_grace_ms),
            rate_limit: uplink.rate_limit.as_ref().map(|limit| RateLimit {
                max_per_sec: limit.max_per_sec,
                refill_interval_ms: limit.refill_interval_ms,
            }),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            duty_cycle: self.duty_cycle(),
            scan: self.scan_settings(),
            uplink: self.uplink_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const FULL: &str = indoc! {r#"
        [device]
        id = "RC_CAR_007"

        [scan]
        window_ms = 4000
        interval_ms = 1000
        radio_retry_ms = 2000
        filter_unregistered = true

        [uplink]
        mode = "http"
        base_url = "http://collector.local:8080/api/"
        request_timeout_ms = 3000
        max_attempts = 3
        abandon_on_client_error = true
        max_queue_len = 500
        shutdown_grace_ms = 2000

        [uplink.backoff]
        base_ms = 250
        max_ms = 8000
        jitter = 0.5

        [uplink.rate_limit]
        max_per_sec = 10
        refill_interval_ms = 100

        [radio]
        replay_file = "replay.json"

        [[anchors]]
        name = "Anchor1"
        address = "aa:bb:cc:dd:ee:01"
        position = { x = 0.0, y = 0.0 }

        [[anchors]]
        name = "Anchor2"
        address = "AA-BB-CC-DD-EE-02"
    "#};

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.device.id, "RC_CAR_007");
        assert_eq!(config.uplink.mode, TransportMode::Http);
        assert_eq!(
            config.uplink.base_url.as_ref().map(Url::as_str),
            Some("http://collector.local:8080/api/")
        );

        let session = config.session_config();
        assert_eq!(session.duty_cycle.window, Duration::from_secs(4));
        assert_eq!(session.duty_cycle.interval, Duration::from_secs(1));
        assert_eq!(session.scan.device_id, "RC_CAR_007");
        assert_eq!(session.scan.radio_retry, Some(Duration::from_secs(2)));
        assert!(session.scan.filter_unregistered);

        let uplink = session.uplink;
        assert_eq!(uplink.max_attempts, 3);
        assert_eq!(uplink.backoff.base, Duration::from_millis(250));
        assert_eq!(uplink.backoff.max, Duration::from_secs(8));
        assert_eq!(uplink.request_timeout, Duration::from_secs(3));
        assert_eq!(uplink.shutdown_grace, Duration::from_secs(2));
        assert_eq!(uplink.max_queue_len, Some(500));
        assert!(uplink.abandon_on_client_error);
        assert_eq!(
            uplink.rate_limit,
            Some(RateLimit {
                max_per_sec: 10,
                refill_interval_ms: 100
            })
        );

        let registry = config.anchor_registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup("AA:BB:CC:DD:EE:02").map(|a| a.name.as_str()),
            Some("Anchor2")
        );
        assert_eq!(
            config.replay_path(Path::new("/etc/scanner")),
            Some(PathBuf::from("/etc/scanner/replay.json"))
        );
        assert!(config.to_string().contains("Anchor1 -> aa:bb:cc:dd:ee:01"));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.device.id, "RC_CAR_001");
        assert_eq!(config.uplink.mode, TransportMode::Offline);
        assert!(config.anchors.is_empty());
        assert!(config.replay_path(Path::new("config")).is_none());

        let session = config.session_config();
        assert_eq!(session.duty_cycle.window, Duration::from_millis(6_000));
        assert!(session.duty_cycle.interval.is_zero());
        assert_eq!(session.scan.radio_retry, None);
        assert_eq!(session.uplink.max_attempts, 5);
        assert_eq!(session.uplink.backoff, BackoffPolicy::default());
        assert_eq!(session.uplink.rate_limit, None);
    }

    #[test]
    fn test_http_mode_requires_base_url() {
        let toml = indoc! {r#"
            [uplink]
            mode = "http"
        "#};
        let err = AppConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases = [
            "[scan]\nwindow_ms = 0",
            "[uplink]\nmax_attempts = 0",
            "[uplink.backoff]\njitter = 1.5",
            "[device]\nid = \"  \"",
        ];
        for toml in cases {
            assert!(AppConfig::from_toml_str(toml).is_err(), "accepted: {toml}");
        }
    }

    #[test]
    fn test_invalid_anchor_address() {
        let toml = indoc! {r#"
            [[anchors]]
            name = "Anchor1"
            address = "not-an-address"
        "#};
        let config = AppConfig::from_toml_str(toml).unwrap();
        assert!(config.anchor_registry().is_err());
    }

    #[test]
    fn test_transport_mode_display() {
        assert_eq!(TransportMode::Http.to_string(), "http");
        assert_eq!(TransportMode::Offline.to_string(), "offline");
    }
}
