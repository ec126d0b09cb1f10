//! `aegis-types` – shared data model of the AegisDrive command arbitration
//! and safety core.
//!
//! Everything that crosses a crate boundary lives here: the normalized
//! [`Command`] and its [`CommandPayload`], the [`CommandSource`] priority
//! enum, validation and system-state enums, the shared [`SensorSnapshot`],
//! the [`TaskId`] identities tracked by the liveness table, the crate-wide
//! [`CoreError`], and the runtime timing/plausibility constants.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock]: injectable monotonic time source
//!   so freshness logic can be tested without sleeping.
//! - [`sink`] – [`LogSink`][sink::LogSink]: the audit-trail interface every
//!   pipeline stage reports into, with a console implementation backed by
//!   `tracing`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod clock;
pub mod sink;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use sink::{ConsoleSink, LogSink, NullSink, RecordingSink, SinkEvent};

// ────────────────────────────────────────────────────────────────────────────
// Runtime constants (defaults)
// ────────────────────────────────────────────────────────────────────────────

/// Period of the deterministic command forwarding loop.
pub const FORWARD_PERIOD: Duration = Duration::from_millis(10);

/// Period of the external-watchdog heartbeat pulse.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(50);

/// Period of the sensor-plausibility safety check.
pub const MONITOR_PERIOD: Duration = Duration::from_millis(50);

/// Maximum age at which a stored command is still considered usable.
pub const FRESHNESS_TIMEOUT: Duration = Duration::from_millis(200);

/// Maximum silence tolerated from the sensor processing task.
pub const SENSOR_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum silence tolerated from the command processing task.
pub const COMMAND_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(100);

/// Hardware plausibility cap on measured vehicle speed (m/s).
pub const MAX_SPEED_HW: f32 = 10.0;

/// Minimum plausible battery voltage (V).
pub const MIN_BATTERY_VOLTAGE: f32 = 10.0;

/// End-to-end intake-to-BCM latency target.
pub const MAX_LATENCY_TARGET: Duration = Duration::from_millis(100);

// ────────────────────────────────────────────────────────────────────────────
// Command sources
// ────────────────────────────────────────────────────────────────────────────

/// Who issued a command. The variant determines arbitration priority:
/// a lower rank always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// On-vehicle safety system (rank 0, highest priority).
    Safety,
    /// Human operator in the vehicle (rank 1).
    Manual,
    /// Teleoperated remote control (rank 2).
    Remote,
    /// Autonomous planner (rank 3, lowest priority).
    Autonomous,
}

impl CommandSource {
    /// All sources, highest priority first. The selector probes slots in
    /// exactly this order.
    pub const IN_PRIORITY_ORDER: [CommandSource; 4] = [
        CommandSource::Safety,
        CommandSource::Manual,
        CommandSource::Remote,
        CommandSource::Autonomous,
    ];

    /// Number of distinct sources (one latest-command slot each).
    pub const COUNT: usize = 4;

    /// Priority rank; lower wins arbitration.
    pub fn rank(self) -> u8 {
        match self {
            CommandSource::Safety => 0,
            CommandSource::Manual => 1,
            CommandSource::Remote => 2,
            CommandSource::Autonomous => 3,
        }
    }

    /// Dense index used for per-source slot storage.
    pub fn index(self) -> usize {
        self.rank() as usize
    }

    /// Stable identifier used in logs and topic names.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandSource::Safety => "safety",
            CommandSource::Manual => "manual",
            CommandSource::Remote => "remote",
            CommandSource::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// Actuation set-point carried by every command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Requested steering angle in degrees; positive is left.
    pub steering_angle_deg: f32,
    /// Requested forward speed in m/s; never negative.
    pub speed_mps: f32,
    /// Requested acceleration in m/s².
    pub acceleration_mps2: f32,
    /// Whether the service brake is commanded engaged.
    pub brake_engaged: bool,
}

impl CommandPayload {
    /// `true` when every float field carries a finite value.
    ///
    /// NaN and infinity cannot be expressed by any real command source and
    /// indicate a corrupted frame.
    pub fn is_finite(&self) -> bool {
        self.steering_angle_deg.is_finite()
            && self.speed_mps.is_finite()
            && self.acceleration_mps2.is_finite()
    }

    /// The canonical safe payload: wheels straight, zero speed, brake on.
    pub fn full_stop() -> Self {
        Self {
            steering_angle_deg: 0.0,
            speed_mps: 0.0,
            acceleration_mps2: 0.0,
            brake_engaged: true,
        }
    }
}

/// A normalized control command as it flows through the pipeline.
///
/// Created by the intake (which stamps `timestamp` from the injected
/// [`Clock`]), owned by whichever slot holds the latest command for its
/// source, and dropped when overwritten. The timestamp is monotonic and
/// therefore never serialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub source: CommandSource,
    /// Strictly increasing per source; replays are rejected by validation.
    pub sequence_number: u64,
    /// Monotonic instant at which the command entered the system.
    pub timestamp: Instant,
    pub payload: CommandPayload,
}

impl Command {
    /// Age of this command relative to `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

/// Result category of a single validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    /// Payload is structurally unusable (non-finite float field).
    InvalidStructure,
    /// Command aged past the freshness timeout before validation.
    StaleTimestamp,
    /// Sequence number is not strictly greater than the last accepted one.
    InvalidSequence,
    /// A payload field exceeds its configured physical limit.
    OutOfRange,
}

impl ValidationOutcome {
    pub fn is_valid(self) -> bool {
        self == ValidationOutcome::Valid
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationOutcome::Valid => "valid",
            ValidationOutcome::InvalidStructure => "invalid_structure",
            ValidationOutcome::StaleTimestamp => "stale_timestamp",
            ValidationOutcome::InvalidSequence => "invalid_sequence",
            ValidationOutcome::OutOfRange => "out_of_range",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one command, with the human-readable reason that
/// goes to the audit trail.
#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub outcome: ValidationOutcome,
    pub reason: String,
    pub validated_at: Instant,
}

impl ValidationRecord {
    pub fn is_valid(&self) -> bool {
        self.outcome.is_valid()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// System state
// ────────────────────────────────────────────────────────────────────────────

/// Coarse lifecycle state of the whole core.
///
/// Transitions happen only through the orchestrator: `Initializing →
/// NormalOperation → {SafeMode, EmergencyStop, Fault}`. `EmergencyStop`
/// is left only via an explicit operator reset; `Fault` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Initializing,
    NormalOperation,
    SafeMode,
    EmergencyStop,
    Fault,
}

impl SystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemState::Initializing => "initializing",
            SystemState::NormalOperation => "normal_operation",
            SystemState::SafeMode => "safe_mode",
            SystemState::EmergencyStop => "emergency_stop",
            SystemState::Fault => "fault",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor snapshot and task identities
// ────────────────────────────────────────────────────────────────────────────

/// Latest plausibility-relevant sensor readings, written by the subscriber
/// callbacks and read by the safety monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    pub current_speed_mps: f32,
    pub battery_voltage_v: f32,
    pub last_speed_update: Option<Instant>,
    pub last_battery_update: Option<Instant>,
}

/// Identity of a long-lived task whose liveness the safety monitor checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    SensorProcessor,
    CommandProcessor,
}

impl TaskId {
    /// Both monitored tasks.
    pub const ALL: [TaskId; 2] = [TaskId::SensorProcessor, TaskId::CommandProcessor];

    /// Name used in halt reasons and log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskId::SensorProcessor => "Sensor Processor",
            TaskId::CommandProcessor => "Command Processor",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Crate-wide error type spanning lifecycle misuse, callback failures, and
/// configuration problems.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("already initialized")]
    AlreadyInitialized,

    #[error("not initialized")]
    NotInitialized,

    #[error("task already running")]
    AlreadyRunning,

    #[error("task not running")]
    NotRunning,

    #[error("callback failed: {0}")]
    Callback(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("reset refused in state {0}")]
    ResetRefused(SystemState),
}
