//! Typed, topic-based publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so every subscriber receives
//! every frame without any single subscriber blocking the others. This is
//! the in-process stand-in for the ROS-style topic layer: sensor feeders
//! publish speed and battery frames, teleoperation and the planner publish
//! command frames, and the bridges in [`crate::bridge`] dispatch them into
//! the core on plain threads.

use aegis_types::{CommandPayload, CommandSource, CoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default channel capacity (buffered frames before slow subscribers lag).
const DEFAULT_CAPACITY: usize = 256;

/// Measured vehicle speed topic (f32 m/s payloads).
pub const TOPIC_SPEED: &str = "/ros_data/speed";

/// Battery voltage topic (f32 V payloads).
pub const TOPIC_BATTERY_VOLTAGE: &str = "/ros_data/battery/voltage";

/// Prefix under which per-source command topics live.
pub const TOPIC_COMMANDS: &str = "/ros_data/commands";

/// Topic carrying commands for `source`.
pub fn command_topic(source: CommandSource) -> String {
    format!("{TOPIC_COMMANDS}/{source}")
}

/// Payload variants routed over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FramePayload {
    /// Measured vehicle speed in m/s.
    Speed(f32),
    /// Measured battery voltage in volts.
    BatteryVoltage(f32),
    /// A raw control command from one of the sources.
    SourceCommand {
        source: CommandSource,
        payload: CommandPayload,
        sequence_number: u64,
    },
}

/// One message on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    /// Wall-clock publish time; the core re-stamps commands with its own
    /// monotonic clock at intake.
    pub published_at: DateTime<Utc>,
    pub topic: String,
    pub payload: FramePayload,
}

impl Frame {
    pub fn new(topic: impl Into<String>, payload: FramePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            published_at: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }

    /// Convenience constructor for a speed reading.
    pub fn speed(speed_mps: f32) -> Self {
        Self::new(TOPIC_SPEED, FramePayload::Speed(speed_mps))
    }

    /// Convenience constructor for a battery voltage reading.
    pub fn battery_voltage(voltage_v: f32) -> Self {
        Self::new(TOPIC_BATTERY_VOLTAGE, FramePayload::BatteryVoltage(voltage_v))
    }

    /// Convenience constructor for a source command.
    pub fn command(source: CommandSource, payload: CommandPayload, sequence_number: u64) -> Self {
        Self::new(
            command_topic(source),
            FramePayload::SourceCommand {
                source,
                payload,
                sequence_number,
            },
        )
    }
}

/// Shared bus. Clone it cheaply – all clones publish into the same
/// underlying broadcast channel.
#[derive(Clone, Debug)]
pub struct TopicBus {
    sender: broadcast::Sender<Frame>,
}

impl TopicBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a frame to all active subscribers.
    ///
    /// Returns the number of receivers, or [`CoreError::Channel`] when no
    /// subscriber is listening.
    pub fn publish(&self, frame: Frame) -> Result<usize, CoreError> {
        self.sender
            .send(frame)
            .map_err(|e| CoreError::Channel(format!("bus send error: {e}")))
    }

    /// Subscribe to every frame on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.sender.subscribe()
    }

    /// Subscribe filtered to frames whose topic starts with `topic`.
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> TopicSubscriber {
        TopicSubscriber {
            topic: topic.into(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for TopicBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A subscriber that only delivers frames under one topic prefix.
pub struct TopicSubscriber {
    topic: String,
    receiver: broadcast::Receiver<Frame>,
}

impl TopicSubscriber {
    /// Wait for the next matching frame.
    ///
    /// Returns `None` when the bus is closed. A lagged subscriber skips the
    /// dropped frames and keeps receiving.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.receiver.recv().await {
                Ok(frame) if frame.topic.starts_with(&self.topic) => return Some(frame),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, topic = %self.topic, "topic subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
