//! `aegis-safety` – Liveness & Plausibility
//!
//! The watchdog side of the core. It does not arbitrate commands; it decides
//! whether the rest of the system is still trustworthy.
//!
//! # Modules
//!
//! - [`sensors`] – [`SensorHub`][sensors::SensorHub]: mutex-guarded latest
//!   sensor snapshot, written by subscriber callbacks and read by the
//!   monitor.
//! - [`liveness`] – [`TaskLiveness`][liveness::TaskLiveness]: per-task
//!   heartbeat table with deadline checking.
//! - [`heartbeat`] – [`HeartbeatEmitter`][heartbeat::HeartbeatEmitter]:
//!   50 ms pulse generator toward the external safety processor.
//! - [`monitor`] – [`SafetyMonitor`][monitor::SafetyMonitor]: 50 ms check
//!   loop that executes an idempotent emergency halt on a liveness or
//!   plausibility violation.

pub mod heartbeat;
pub mod liveness;
pub mod monitor;
pub mod sensors;

pub use heartbeat::{HeartbeatConfig, HeartbeatEmitter, HeartbeatStats, PulseCallback};
pub use liveness::{LivenessConfig, LivenessFault, TaskLiveness};
pub use monitor::{HaltHook, MonitorConfig, MonitorStats, SafetyMonitor};
pub use sensors::SensorHub;
