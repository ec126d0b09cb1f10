//! Composite configuration surface for the whole core.
//!
//! One serde-backed [`Config`] with a section per configurable component,
//! loadable from TOML and overridable through `AEGIS_*` environment
//! variables. Durations are expressed in integer milliseconds in the file
//! format; accessors convert to [`Duration`] for the components.
//!
//! Applied via [`Orchestrator::set_config`][crate::Orchestrator::set_config]
//! before or between start/stop cycles.

use crate::forwarder::ForwarderConfig;
use crate::validator::ValidatorConfig;
use aegis_safety::{HeartbeatConfig, LivenessConfig, MonitorConfig};
use aegis_types::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Validation limits section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSection {
    #[serde(default = "default_freshness_timeout_ms")]
    pub freshness_timeout_ms: u64,
    #[serde(default = "default_max_steering_deg")]
    pub max_steering_deg: f32,
    #[serde(default = "default_max_speed_mps")]
    pub max_speed_mps: f32,
    #[serde(default = "default_max_acceleration_mps2")]
    pub max_acceleration_mps2: f32,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            freshness_timeout_ms: default_freshness_timeout_ms(),
            max_steering_deg: default_max_steering_deg(),
            max_speed_mps: default_max_speed_mps(),
            max_acceleration_mps2: default_max_acceleration_mps2(),
        }
    }
}

impl ValidatorSection {
    pub fn freshness_timeout(&self) -> Duration {
        Duration::from_millis(self.freshness_timeout_ms)
    }

    pub fn to_component_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            freshness_timeout: self.freshness_timeout(),
            max_steering_deg: self.max_steering_deg,
            max_speed_mps: self.max_speed_mps,
            max_acceleration_mps2: self.max_acceleration_mps2,
        }
    }
}

/// Forwarding loop section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwarderSection {
    #[serde(default = "default_forward_period_ms")]
    pub forward_period_ms: u64,
    #[serde(default)]
    pub send_heartbeat_on_no_command: bool,
}

impl Default for ForwarderSection {
    fn default() -> Self {
        Self {
            forward_period_ms: default_forward_period_ms(),
            send_heartbeat_on_no_command: false,
        }
    }
}

impl ForwarderSection {
    pub fn forward_period(&self) -> Duration {
        Duration::from_millis(self.forward_period_ms)
    }

    pub fn to_component_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            forward_period: self.forward_period(),
            send_heartbeat_on_no_command: self.send_heartbeat_on_no_command,
        }
    }
}

/// External heartbeat section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSection {
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: default_heartbeat_period_ms(),
        }
    }
}

impl HeartbeatSection {
    pub fn to_component_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            heartbeat_period: Duration::from_millis(self.heartbeat_period_ms),
        }
    }
}

/// Safety monitor and task-liveness section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_monitor_period_ms")]
    pub monitor_period_ms: u64,
    #[serde(default = "default_max_speed_hw_mps")]
    pub max_speed_mps: f32,
    #[serde(default = "default_min_battery_voltage_v")]
    pub min_battery_voltage_v: f32,
    #[serde(default = "default_sensor_heartbeat_timeout_ms")]
    pub sensor_heartbeat_timeout_ms: u64,
    #[serde(default = "default_command_heartbeat_timeout_ms")]
    pub command_heartbeat_timeout_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            monitor_period_ms: default_monitor_period_ms(),
            max_speed_mps: default_max_speed_hw_mps(),
            min_battery_voltage_v: default_min_battery_voltage_v(),
            sensor_heartbeat_timeout_ms: default_sensor_heartbeat_timeout_ms(),
            command_heartbeat_timeout_ms: default_command_heartbeat_timeout_ms(),
        }
    }
}

impl MonitorSection {
    pub fn to_component_config(&self) -> MonitorConfig {
        MonitorConfig {
            monitor_period: Duration::from_millis(self.monitor_period_ms),
            max_speed_mps: self.max_speed_mps,
            min_battery_voltage_v: self.min_battery_voltage_v,
        }
    }

    pub fn to_liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            sensor_timeout: Duration::from_millis(self.sensor_heartbeat_timeout_ms),
            command_timeout: Duration::from_millis(self.command_heartbeat_timeout_ms),
        }
    }
}

/// Full configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub validator: ValidatorSection,
    #[serde(default)]
    pub forwarder: ForwarderSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
    #[serde(default)]
    pub monitor: MonitorSection,
}

impl Config {
    /// Load a config from a TOML file. Returns `Ok(None)` when the file
    /// does not exist; env-var overrides are applied to a loaded config.
    pub fn load_from(path: &Path) -> Result<Option<Config>, CoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: Config = toml::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;
        config.apply_env_overrides();
        Ok(Some(config))
    }

    /// Serialize to pretty TOML at `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::Config(format!("failed to create config directory: {e}"))
            })?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, raw)
            .map_err(|e| CoreError::Config(format!("failed to write {}: {e}", path.display())))
    }

    /// Apply `AEGIS_*` environment variable overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `AEGIS_FORWARD_PERIOD_MS` | `forwarder.forward_period_ms` |
    /// | `AEGIS_FRESHNESS_TIMEOUT_MS` | `validator.freshness_timeout_ms` |
    /// | `AEGIS_HEARTBEAT_PERIOD_MS` | `heartbeat.heartbeat_period_ms` |
    /// | `AEGIS_MONITOR_PERIOD_MS` | `monitor.monitor_period_ms` |
    ///
    /// Unparsable values are ignored and leave the field unchanged.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("AEGIS_FORWARD_PERIOD_MS") {
            self.forwarder.forward_period_ms = v;
        }
        if let Some(v) = env_u64("AEGIS_FRESHNESS_TIMEOUT_MS") {
            self.validator.freshness_timeout_ms = v;
        }
        if let Some(v) = env_u64("AEGIS_HEARTBEAT_PERIOD_MS") {
            self.heartbeat.heartbeat_period_ms = v;
        }
        if let Some(v) = env_u64("AEGIS_MONITOR_PERIOD_MS") {
            self.monitor.monitor_period_ms = v;
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

fn default_freshness_timeout_ms() -> u64 {
    200
}
fn default_max_steering_deg() -> f32 {
    45.0
}
fn default_max_speed_mps() -> f32 {
    30.0
}
fn default_max_acceleration_mps2() -> f32 {
    5.0
}
fn default_forward_period_ms() -> u64 {
    10
}
fn default_heartbeat_period_ms() -> u64 {
    50
}
fn default_monitor_period_ms() -> u64 {
    50
}
fn default_max_speed_hw_mps() -> f32 {
    10.0
}
fn default_min_battery_voltage_v() -> f32 {
    10.0
}
fn default_sensor_heartbeat_timeout_ms() -> u64 {
    100
}
fn default_command_heartbeat_timeout_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_constants() {
        let config = Config::default();
        assert_eq!(config.forwarder.forward_period(), aegis_types::FORWARD_PERIOD);
        assert_eq!(
            config.validator.freshness_timeout(),
            aegis_types::FRESHNESS_TIMEOUT
        );
        assert_eq!(
            config.heartbeat.to_component_config().heartbeat_period,
            aegis_types::HEARTBEAT_PERIOD
        );
        assert_eq!(config.monitor.max_speed_mps, aegis_types::MAX_SPEED_HW);
        assert_eq!(
            config.monitor.min_battery_voltage_v,
            aegis_types::MIN_BATTERY_VOLTAGE
        );
    }

    #[test]
    fn roundtrip_through_toml_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("aegis.toml");

        let mut config = Config::default();
        config.forwarder.forward_period_ms = 20;
        config.validator.max_steering_deg = 30.0;
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.forwarder.forward_period_ms, 20);
        assert_eq!(loaded.validator.max_steering_deg, 30.0);
        assert_eq!(loaded.monitor, MonitorSection::default());
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let result = Config::load_from(&dir.path().join("absent.toml")).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[forwarder]\nforward_period_ms = 25\n").unwrap();

        let loaded = Config::load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.forwarder.forward_period_ms, 25);
        assert_eq!(loaded.validator, ValidatorSection::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "forwarder = \"not a table\"").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn env_override_changes_forward_period() {
        std::env::set_var("AEGIS_FORWARD_PERIOD_MS", "15");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("AEGIS_FORWARD_PERIOD_MS");

        assert_eq!(config.forwarder.forward_period_ms, 15);
    }

    #[test]
    fn invalid_env_override_is_ignored() {
        std::env::set_var("AEGIS_HEARTBEAT_PERIOD_MS", "soon");
        let mut config = Config::default();
        config.apply_env_overrides();
        std::env::remove_var("AEGIS_HEARTBEAT_PERIOD_MS");

        assert_eq!(config.heartbeat.heartbeat_period_ms, 50);
    }

    #[test]
    fn sections_convert_to_component_configs() {
        let config = Config::default();
        let validator = config.validator.to_component_config();
        assert_eq!(validator.max_speed_mps, 30.0);

        let liveness = config.monitor.to_liveness_config();
        assert_eq!(liveness.sensor_timeout, Duration::from_millis(100));
        assert_eq!(liveness.command_timeout, Duration::from_millis(100));
    }
}
