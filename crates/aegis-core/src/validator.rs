//! [`CommandValidator`] – structure, freshness, replay, and range checking.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. **Structure** – every payload float must be finite.
//! 2. **Freshness** – the command must be younger than the freshness
//!    timeout.
//! 3. **Sequence** – per source, strictly greater than the last recorded
//!    sequence number (replay/duplicate protection). The first command from
//!    a source is always accepted. The number is recorded at check time,
//!    so a later range failure does not give the sequence back.
//! 4. **Range** – steering, speed, and acceleration within configured
//!    physical limits.
//!
//! The sequence map is the only mutable state; it sits behind a mutex so
//! source callbacks may validate concurrently.

use aegis_types::{
    Clock, Command, CommandSource, ValidationOutcome, ValidationRecord, FRESHNESS_TIMEOUT,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Validation limits. Range limits are physical actuator bounds, not the
/// plausibility caps used by the safety monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorConfig {
    pub freshness_timeout: Duration,
    pub max_steering_deg: f32,
    pub max_speed_mps: f32,
    pub max_acceleration_mps2: f32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            freshness_timeout: FRESHNESS_TIMEOUT,
            max_steering_deg: 45.0,
            max_speed_mps: 30.0,
            max_acceleration_mps2: 5.0,
        }
    }
}

/// Stateful command validator; see the module docs for the check order.
pub struct CommandValidator {
    config: Mutex<ValidatorConfig>,
    last_sequences: Mutex<HashMap<CommandSource, u64>>,
    clock: Arc<dyn Clock>,
}

impl CommandValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Mutex::new(ValidatorConfig::default()),
            last_sequences: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Validate `cmd`, returning the outcome and its audit reason.
    pub fn validate(&self, cmd: &Command) -> ValidationRecord {
        let config = self.config();
        let now = self.clock.now();

        if !cmd.payload.is_finite() {
            return self.reject(
                ValidationOutcome::InvalidStructure,
                "payload contains a non-finite value".to_string(),
            );
        }

        let age = cmd.age(now);
        if age > config.freshness_timeout {
            return self.reject(
                ValidationOutcome::StaleTimestamp,
                format!(
                    "command is {} ms old (limit {} ms)",
                    age.as_millis(),
                    config.freshness_timeout.as_millis()
                ),
            );
        }

        if !self.sequence_is_valid(cmd.source, cmd.sequence_number) {
            return self.reject(
                ValidationOutcome::InvalidSequence,
                format!(
                    "sequence {} is not greater than the last accepted for {}",
                    cmd.sequence_number, cmd.source
                ),
            );
        }

        if let Some(reason) = range_violation(&cmd.payload, &config) {
            return self.reject(ValidationOutcome::OutOfRange, reason);
        }

        ValidationRecord {
            outcome: ValidationOutcome::Valid,
            reason: "valid".to_string(),
            validated_at: now,
        }
    }

    /// Forget all recorded sequence numbers (fault recovery).
    pub fn reset(&self) {
        self.last_sequences.lock().expect("sequence map poisoned").clear();
    }

    pub fn set_config(&self, config: ValidatorConfig) {
        *self.config.lock().expect("validator config poisoned") = config;
    }

    pub fn config(&self) -> ValidatorConfig {
        *self.config.lock().expect("validator config poisoned")
    }

    /// Check-and-record under one lock so concurrent callers cannot both
    /// claim the same sequence number.
    fn sequence_is_valid(&self, source: CommandSource, sequence: u64) -> bool {
        let mut sequences = self.last_sequences.lock().expect("sequence map poisoned");
        match sequences.get_mut(&source) {
            None => {
                sequences.insert(source, sequence);
                true
            }
            Some(last) if sequence > *last => {
                *last = sequence;
                true
            }
            Some(_) => false,
        }
    }

    fn reject(&self, outcome: ValidationOutcome, reason: String) -> ValidationRecord {
        ValidationRecord {
            outcome,
            reason,
            validated_at: self.clock.now(),
        }
    }
}

fn range_violation(payload: &aegis_types::CommandPayload, config: &ValidatorConfig) -> Option<String> {
    if payload.steering_angle_deg.abs() > config.max_steering_deg {
        return Some(format!(
            "steering {}° exceeds ±{}°",
            payload.steering_angle_deg, config.max_steering_deg
        ));
    }
    if payload.speed_mps < 0.0 || payload.speed_mps > config.max_speed_mps {
        return Some(format!(
            "speed {} m/s outside [0, {}]",
            payload.speed_mps, config.max_speed_mps
        ));
    }
    if payload.acceleration_mps2.abs() > config.max_acceleration_mps2 {
        return Some(format!(
            "acceleration {} m/s² exceeds ±{}",
            payload.acceleration_mps2, config.max_acceleration_mps2
        ));
    }
    None
}
