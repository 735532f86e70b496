//! TOML config file loading and validation.
//!
//! Everything here is consumed read-only at startup. A missing file falls
//! back to the built-in defaults (the device must come up and run offline
//! rather than refuse to boot); a present-but-invalid file is a hard error
//! listing every violation, not just the first.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::mem::MemoryThresholds;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub broker_host: String,
    pub broker_port: u16,
    /// Unique device identity; doubles as the MQTT client id and the
    /// `device_id` field of every payload.
    pub device_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: "YOUR_WIFI_SSID".into(),
            wifi_password: "YOUR_WIFI_PASSWORD".into(),
            broker_host: "192.168.1.100".into(),
            broker_port: 1883,
            device_id: "co2-monitor".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Sensor read cadence. Long to extend sensor life.
    pub sensor_read_secs: u64,
    /// Data publication cadence.
    pub publish_secs: u64,
    /// Display alternation cadence.
    pub display_switch_secs: u64,
    /// Health report cadence.
    pub report_secs: u64,
    /// Memory maintenance cadence.
    pub maintenance_secs: u64,
    /// Ceiling for one Wi-Fi or broker connect attempt.
    pub connect_timeout_secs: u64,
    /// Ceiling for one publish round trip.
    pub publish_timeout_secs: u64,
    /// Watchdog expiry. Must exceed the worst-case blocking per iteration.
    pub watchdog_timeout_secs: u64,
    /// Scheduled reboot regardless of health.
    pub preventive_reset_secs: u64,
    /// First reconnect delay after a link failure.
    pub backoff_initial_secs: u64,
    /// Reconnect delay ceiling.
    pub backoff_max_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_read_secs: 30,
            publish_secs: 30,
            display_switch_secs: 3,
            report_secs: 3600,
            maintenance_secs: 60,
            connect_timeout_secs: 10,
            publish_timeout_secs: 5,
            watchdog_timeout_secs: 30,
            preventive_reset_secs: 86_400,
            backoff_initial_secs: 5,
            backoff_max_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Simulation scenario: "stable", "drifting" or "flaky".
    pub scenario: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            scenario: "stable".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: String,
    pub max_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: "system.log".into(),
            max_bytes: 50_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub warning_bytes: u64,
    pub critical_bytes: u64,
    pub emergency_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        // Host-class rescaling of the reference device's heap thresholds.
        Self {
            warning_bytes: 32 * 1024 * 1024,
            critical_bytes: 16 * 1024 * 1024,
            emergency_bytes: 8 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Duration accessors
// ---------------------------------------------------------------------------

impl TimingConfig {
    pub fn sensor_read(&self) -> Duration {
        Duration::from_secs(self.sensor_read_secs)
    }
    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish_secs)
    }
    pub fn display_switch(&self) -> Duration {
        Duration::from_secs(self.display_switch_secs)
    }
    pub fn report(&self) -> Duration {
        Duration::from_secs(self.report_secs)
    }
    pub fn maintenance(&self) -> Duration {
        Duration::from_secs(self.maintenance_secs)
    }
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }
    pub fn preventive_reset(&self) -> Duration {
        Duration::from_secs(self.preventive_reset_secs)
    }
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    /// Worst case a single iteration can block: a Wi-Fi probe, a broker
    /// connect, and one publish round trip.
    pub fn worst_case_blocking_secs(&self) -> u64 {
        2 * self.connect_timeout_secs + self.publish_timeout_secs
    }
}

impl MemoryConfig {
    pub fn thresholds(&self) -> MemoryThresholds {
        MemoryThresholds {
            warning_bytes: self.warning_bytes,
            critical_bytes: self.critical_bytes,
            emergency_bytes: self.emergency_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all entries. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_network(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_log(&mut errors);
        self.validate_memory(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_network(&self, errors: &mut Vec<String>) {
        let n = &self.network;
        if n.device_id.trim().is_empty() {
            errors.push("network: device_id is empty".into());
        }
        if n.broker_host.trim().is_empty() {
            errors.push("network: broker_host is empty".into());
        }
        if n.broker_port == 0 {
            errors.push("network: broker_port must be nonzero".into());
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let t = &self.timing;
        let intervals = [
            ("sensor_read_secs", t.sensor_read_secs),
            ("publish_secs", t.publish_secs),
            ("display_switch_secs", t.display_switch_secs),
            ("report_secs", t.report_secs),
            ("maintenance_secs", t.maintenance_secs),
            ("connect_timeout_secs", t.connect_timeout_secs),
            ("publish_timeout_secs", t.publish_timeout_secs),
            ("watchdog_timeout_secs", t.watchdog_timeout_secs),
            ("preventive_reset_secs", t.preventive_reset_secs),
            ("backoff_initial_secs", t.backoff_initial_secs),
            ("backoff_max_secs", t.backoff_max_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                errors.push(format!("timing: {name} must be positive"));
            }
        }

        if t.backoff_initial_secs > t.backoff_max_secs {
            errors.push(format!(
                "timing: backoff_initial_secs ({}) exceeds backoff_max_secs ({})",
                t.backoff_initial_secs, t.backoff_max_secs
            ));
        }

        // Liveness invariant: the watchdog must outlast the worst-case sum
        // of the bounded blocking operations one iteration can perform,
        // otherwise a routine outage would look like a hang.
        if t.watchdog_timeout_secs <= t.worst_case_blocking_secs() {
            errors.push(format!(
                "timing: watchdog_timeout_secs ({}) must exceed worst-case \
                 iteration blocking (2*connect_timeout + publish_timeout = {})",
                t.watchdog_timeout_secs,
                t.worst_case_blocking_secs()
            ));
        }
    }

    fn validate_log(&self, errors: &mut Vec<String>) {
        if self.log.max_bytes == 0 {
            errors.push("log: max_bytes must be positive".into());
        }
        if self.log.path.trim().is_empty() {
            errors.push("log: path is empty".into());
        }
    }

    fn validate_memory(&self, errors: &mut Vec<String>) {
        let m = &self.memory;
        if !(m.emergency_bytes < m.critical_bytes && m.critical_bytes < m.warning_bytes) {
            errors.push(format!(
                "memory: thresholds must be ordered emergency ({}) < critical ({}) < warning ({})",
                m.emergency_bytes, m.critical_bytes, m.warning_bytes
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Like `load`, but a missing file yields the built-in defaults so the
/// device still boots (and can at least log and retry) unattended.
pub fn load_or_default(path: &str) -> Result<Config> {
    if !std::path::Path::new(path).exists() {
        tracing::warn!(path, "config file not found — using built-in defaults");
        return Ok(Config::default());
    }
    load(path)
}

// ===========================================================================
// Tests
// ===========================================================================
