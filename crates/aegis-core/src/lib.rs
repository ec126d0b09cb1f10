//! `aegis-core` – Command Arbitration Pipeline
//!
//! The command half of the AegisDrive core: raw source data is normalized,
//! validated, stored per source, arbitrated by fixed priority, and
//! dispatched to the Body Control Module at a deterministic cadence.
//!
//! Data flow: raw command → [`CommandIntake`] → [`CommandValidator`] →
//! [`LatestCommandSlot`] (one slot per source) → [`PrioritySelector`] →
//! [`CommandForwarder`] → BCM callback. The [`Orchestrator`] owns the
//! wiring, the lifecycle, and the system state machine, and plugs the
//! `aegis-safety` watchdog stack into the same pipeline.
//!
//! # Modules
//!
//! - [`slot`] – per-source freshness-gated latest-value store.
//! - [`validator`] – structure, freshness, replay, and range checks.
//! - [`intake`] – raw-data normalization and counters.
//! - [`selector`] – fixed-priority arbitration over the slots.
//! - [`forwarder`] – 10 ms absolute-deadline dispatch loop.
//! - [`orchestrator`] – lifecycle, state machine, external callbacks.
//! - [`config`] – TOML-backed composite configuration surface.
//! - [`telemetry`] – `tracing` subscriber bootstrap.

pub mod config;
pub mod forwarder;
pub mod intake;
pub mod orchestrator;
pub mod selector;
pub mod slot;
pub mod telemetry;
pub mod validator;

pub use config::Config;
pub use forwarder::{CommandForwarder, ForwardCallback, ForwarderConfig, ForwarderStats};
pub use intake::{CommandCallback, CommandIntake, IntakeStats};
pub use orchestrator::{BcmCallback, Orchestrator, Statistics, WatchdogCallback};
pub use selector::{PrioritySelector, SelectorStats};
pub use slot::LatestCommandSlot;
pub use validator::{CommandValidator, ValidatorConfig};
