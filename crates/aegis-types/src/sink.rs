//! [`LogSink`] – audit-trail interface for the command pipeline.
//!
//! Every stage reports its observable events (command received, validation
//! result, selection, forward, heartbeat, state transition, halt, errors)
//! through this trait. The core never writes to a backend directly; a sink
//! implementation decides where events go. [`ConsoleSink`] emits structured
//! `tracing` events and is the default. A database-backed audit sink lives
//! outside this workspace and simply implements the same trait.

use crate::{Command, SystemState, ValidationRecord};
use std::sync::Mutex;

/// Structured event record for the command pipeline audit trail.
///
/// All methods take `&self`; implementations must be internally synchronized
/// because events arrive from the forwarder, heartbeat, monitor, and
/// subscriber threads concurrently. Implementations must also be fast: the
/// forwarder calls into the sink on its 10 ms cadence.
pub trait LogSink: Send + Sync {
    /// A raw command entered the intake.
    fn command_received(&self, cmd: &Command);

    /// A command finished validation (valid or not).
    fn validation(&self, cmd: &Command, record: &ValidationRecord);

    /// A stored command became the arbitration winner.
    fn selection(&self, cmd: &Command);

    /// A command was dispatched to the BCM callback.
    fn forwarded(&self, cmd: &Command);

    /// A heartbeat pulse was sent to the external watchdog.
    ///
    /// No-op by default: one event every 50 ms is noise for most backends.
    fn heartbeat(&self) {}

    /// The system state changed.
    fn state_transition(&self, from: SystemState, to: SystemState, reason: &str);

    /// An emergency halt was executed.
    fn halt(&self, reason: &str);

    /// A component-level error that did not stop the pipeline.
    fn error(&self, component: &str, message: &str);

    /// General informational message.
    fn info(&self, component: &str, message: &str);
}

// ────────────────────────────────────────────────────────────────────────────
// Console implementation
// ────────────────────────────────────────────────────────────────────────────

/// Default sink that forwards every event to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for ConsoleSink {
    fn command_received(&self, cmd: &Command) {
        tracing::debug!(
            source = cmd.source.as_str(),
            seq = cmd.sequence_number,
            "command received"
        );
    }

    fn validation(&self, cmd: &Command, record: &ValidationRecord) {
        if record.is_valid() {
            tracing::debug!(
                source = cmd.source.as_str(),
                seq = cmd.sequence_number,
                "command valid"
            );
        } else {
            tracing::warn!(
                source = cmd.source.as_str(),
                seq = cmd.sequence_number,
                outcome = record.outcome.as_str(),
                reason = %record.reason,
                "command rejected"
            );
        }
    }

    fn selection(&self, cmd: &Command) {
        tracing::trace!(
            source = cmd.source.as_str(),
            seq = cmd.sequence_number,
            "command selected"
        );
    }

    fn forwarded(&self, cmd: &Command) {
        tracing::trace!(
            source = cmd.source.as_str(),
            seq = cmd.sequence_number,
            steering_deg = cmd.payload.steering_angle_deg,
            speed_mps = cmd.payload.speed_mps,
            brake = cmd.payload.brake_engaged,
            "command forwarded to BCM"
        );
    }

    fn state_transition(&self, from: SystemState, to: SystemState, reason: &str) {
        tracing::info!(from = from.as_str(), to = to.as_str(), reason, "state transition");
    }

    fn halt(&self, reason: &str) {
        tracing::error!(reason, "EMERGENCY STOP");
    }

    fn error(&self, component: &str, message: &str) {
        tracing::error!(component, message, "pipeline error");
    }

    fn info(&self, component: &str, message: &str) {
        tracing::info!(component, message, "pipeline info");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Null and recording implementations
// ────────────────────────────────────────────────────────────────────────────

/// Sink that discards every event. Useful when a caller wants no audit trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn command_received(&self, _cmd: &Command) {}
    fn validation(&self, _cmd: &Command, _record: &ValidationRecord) {}
    fn selection(&self, _cmd: &Command) {}
    fn forwarded(&self, _cmd: &Command) {}
    fn state_transition(&self, _from: SystemState, _to: SystemState, _reason: &str) {}
    fn halt(&self, _reason: &str) {}
    fn error(&self, _component: &str, _message: &str) {}
    fn info(&self, _component: &str, _message: &str) {}
}

/// One captured sink event, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    CommandReceived {
        source: crate::CommandSource,
        seq: u64,
    },
    Validation {
        source: crate::CommandSource,
        seq: u64,
        outcome: crate::ValidationOutcome,
        reason: String,
    },
    Selection {
        source: crate::CommandSource,
        seq: u64,
    },
    Forwarded {
        source: crate::CommandSource,
        seq: u64,
    },
    Heartbeat,
    StateTransition {
        from: SystemState,
        to: SystemState,
        reason: String,
    },
    Halt {
        reason: String,
    },
    Error {
        component: String,
        message: String,
    },
    Info {
        component: String,
        message: String,
    },
}

/// In-memory sink that records every event for later assertion.
///
/// Test support: lets integration tests assert on the exact audit trail the
/// pipeline produced without scraping log output.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().expect("recording sink poisoned").clone()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().expect("recording sink poisoned").clear();
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().expect("recording sink poisoned").push(event);
    }
}

impl LogSink for RecordingSink {
    fn command_received(&self, cmd: &Command) {
        self.push(SinkEvent::CommandReceived {
            source: cmd.source,
            seq: cmd.sequence_number,
        });
    }

    fn validation(&self, cmd: &Command, record: &ValidationRecord) {
        self.push(SinkEvent::Validation {
            source: cmd.source,
            seq: cmd.sequence_number,
            outcome: record.outcome,
            reason: record.reason.clone(),
        });
    }

    fn selection(&self, cmd: &Command) {
        self.push(SinkEvent::Selection {
            source: cmd.source,
            seq: cmd.sequence_number,
        });
    }

    fn forwarded(&self, cmd: &Command) {
        self.push(SinkEvent::Forwarded {
            source: cmd.source,
            seq: cmd.sequence_number,
        });
    }

    fn heartbeat(&self) {
        self.push(SinkEvent::Heartbeat);
    }

    fn state_transition(&self, from: SystemState, to: SystemState, reason: &str) {
        self.push(SinkEvent::StateTransition {
            from,
            to,
            reason: reason.to_string(),
        });
    }

    fn halt(&self, reason: &str) {
        self.push(SinkEvent::Halt {
            reason: reason.to_string(),
        });
    }

    fn error(&self, component: &str, message: &str) {
        self.push(SinkEvent::Error {
            component: component.to_string(),
            message: message.to_string(),
        });
    }

    fn info(&self, component: &str, message: &str) {
        self.push(SinkEvent::Info {
            component: component.to_string(),
            message: message.to_string(),
        });
    }
}
