//! `aegis-middleware` – The Nervous System
//!
//! Routes typed sensor and command traffic between external feeders and
//! the AegisDrive core without caring what the data means.
//!
//! # Modules
//!
//! - [`bus`] – [`TopicBus`]: typed, topic-based publish/subscribe built on
//!   Tokio broadcast channels, carrying [`Frame`]s for speed, battery
//!   voltage, and per-source commands.
//! - [`port`] – [`MessagePort`]: the typed send/receive boundary a
//!   process-to-process transport must implement; [`LoopbackPort`] is the
//!   in-process implementation.
//! - [`bridge`] – [`SensorBridge`] / [`CommandBridge`]: dispatcher threads
//!   in the subscriber role, draining the bus into the sensor hub, the
//!   liveness table, and the orchestrator's command intake.

pub mod bridge;
pub mod bus;
pub mod port;

pub use bridge::{CommandBridge, CommandHandler, SensorBridge};
pub use bus::{command_topic, Frame, FramePayload, TopicBus, TopicSubscriber, TOPIC_BATTERY_VOLTAGE, TOPIC_COMMANDS, TOPIC_SPEED};
pub use port::{LoopbackPort, MessagePort};
