//! [`CommandIntake`] – normalizes raw source data into a [`Command`].
//!
//! Stateless apart from counters: stamps the arrival timestamp from the
//! injected clock, wraps the payload, and hands the command to the
//! configured callback (the orchestrator's validation pipeline). Runs on
//! the caller's thread.

use aegis_types::{Clock, Command, CommandPayload, CommandSource};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Receives each normalized command, on the thread that delivered it.
pub type CommandCallback = Arc<dyn Fn(Command) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct IntakeStats {
    pub commands_received: u64,
    pub commands_normalized: u64,
    pub last_received: Option<Instant>,
}

/// Entry point for raw commands from any source.
pub struct CommandIntake {
    callback: Mutex<Option<CommandCallback>>,
    stats: Mutex<IntakeStats>,
    clock: Arc<dyn Clock>,
}

impl CommandIntake {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            callback: Mutex::new(None),
            stats: Mutex::new(IntakeStats::default()),
            clock,
        }
    }

    /// Install the downstream callback. Commands received before a callback
    /// is set are counted but dropped.
    pub fn set_callback(&self, callback: CommandCallback) {
        *self.callback.lock().expect("intake callback poisoned") = Some(callback);
    }

    /// Normalize `(source, payload, sequence)` into a [`Command`] stamped
    /// with the current clock instant and deliver it downstream.
    pub fn receive(&self, source: CommandSource, payload: CommandPayload, sequence_number: u64) {
        let now = self.clock.now();
        {
            let mut stats = self.stats.lock().expect("intake stats poisoned");
            stats.commands_received += 1;
            stats.last_received = Some(now);
        }

        let cmd = Command {
            source,
            sequence_number,
            timestamp: now,
            payload,
        };

        self.stats.lock().expect("intake stats poisoned").commands_normalized += 1;

        let callback = self.callback.lock().expect("intake callback poisoned").clone();
        if let Some(callback) = callback {
            callback(cmd);
        }
    }

    pub fn statistics(&self) -> IntakeStats {
        *self.stats.lock().expect("intake stats poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::ManualClock;

    fn fixture() -> (Arc<ManualClock>, CommandIntake) {
        let clock = Arc::new(ManualClock::new());
        let intake = CommandIntake::new(clock.clone() as Arc<dyn Clock>);
        (clock, intake)
    }

    #[test]
    fn stamps_timestamp_from_clock() {
        let (clock, intake) = fixture();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        intake.set_callback(Arc::new(move |cmd| {
            received_clone.lock().unwrap().push(cmd);
        }));

        let expected = clock.now();
        intake.receive(CommandSource::Remote, CommandPayload::default(), 1);

        let commands = received.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].timestamp, expected);
        assert_eq!(commands[0].source, CommandSource::Remote);
        assert_eq!(commands[0].sequence_number, 1);
    }

    #[test]
    fn counts_received_and_normalized() {
        let (_clock, intake) = fixture();
        intake.set_callback(Arc::new(|_| {}));
        intake.receive(CommandSource::Manual, CommandPayload::default(), 1);
        intake.receive(CommandSource::Manual, CommandPayload::default(), 2);

        let stats = intake.statistics();
        assert_eq!(stats.commands_received, 2);
        assert_eq!(stats.commands_normalized, 2);
        assert!(stats.last_received.is_some());
    }

    #[test]
    fn receive_without_callback_only_counts() {
        let (_clock, intake) = fixture();
        intake.receive(CommandSource::Safety, CommandPayload::full_stop(), 1);
        assert_eq!(intake.statistics().commands_received, 1);
    }

    #[test]
    fn payload_passes_through_unmodified() {
        let (_clock, intake) = fixture();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        intake.set_callback(Arc::new(move |cmd| {
            *seen_clone.lock().unwrap() = Some(cmd.payload);
        }));

        let payload = CommandPayload {
            steering_angle_deg: -12.5,
            speed_mps: 3.25,
            acceleration_mps2: 0.5,
            brake_engaged: true,
        };
        intake.receive(CommandSource::Autonomous, payload, 99);

        assert_eq!(seen.lock().unwrap().unwrap(), payload);
    }
}
