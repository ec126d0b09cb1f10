//! [`TaskLiveness`] – per-task heartbeat table with deadline checking.
//!
//! The sensor and command processing tasks call [`TaskLiveness::touch`]
//! whenever they make progress. [`TaskLiveness::check`] computes each task's
//! silence against its configured timeout and returns the first violation
//! as a [`LivenessFault`] whose message names the hung task.

use aegis_types::{Clock, TaskId, COMMAND_HEARTBEAT_TIMEOUT, SENSOR_HEARTBEAT_TIMEOUT};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Per-task silence tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub sensor_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sensor_timeout: SENSOR_HEARTBEAT_TIMEOUT,
            command_timeout: COMMAND_HEARTBEAT_TIMEOUT,
        }
    }
}

impl LivenessConfig {
    fn timeout_for(&self, task: TaskId) -> Duration {
        match task {
            TaskId::SensorProcessor => self.sensor_timeout,
            TaskId::CommandProcessor => self.command_timeout,
        }
    }
}

/// A task exceeded its heartbeat deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{task} hung ({} ms since last heartbeat)", .silent_for.as_millis())]
pub struct LivenessFault {
    pub task: TaskId,
    pub silent_for: Duration,
}

/// Heartbeat table for the monitored tasks.
///
/// Both tasks are registered at construction with a fresh heartbeat so the
/// system starts healthy and only degrades through real silence.
pub struct TaskLiveness {
    heartbeats: Mutex<HashMap<TaskId, Instant>>,
    config: Mutex<LivenessConfig>,
    clock: Arc<dyn Clock>,
}

impl TaskLiveness {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, LivenessConfig::default())
    }

    pub fn with_config(clock: Arc<dyn Clock>, config: LivenessConfig) -> Self {
        let now = clock.now();
        let heartbeats = TaskId::ALL.iter().map(|&task| (task, now)).collect();
        Self {
            heartbeats: Mutex::new(heartbeats),
            config: Mutex::new(config),
            clock,
        }
    }

    /// Record a heartbeat for `task` at the current clock instant.
    pub fn touch(&self, task: TaskId) {
        self.touch_at(task, self.clock.now());
    }

    /// Record a heartbeat for `task` at an explicit instant.
    pub fn touch_at(&self, task: TaskId, at: Instant) {
        let mut heartbeats = self.heartbeats.lock().expect("liveness table poisoned");
        heartbeats.insert(task, at);
    }

    /// Refresh every task's heartbeat. Used at initialization and after an
    /// operator reset so the monitor does not immediately re-trip on
    /// silence accumulated while halted.
    pub fn touch_all(&self) {
        let now = self.clock.now();
        let mut heartbeats = self.heartbeats.lock().expect("liveness table poisoned");
        for task in TaskId::ALL {
            heartbeats.insert(task, now);
        }
    }

    /// Last recorded heartbeat for `task`.
    pub fn last_heartbeat(&self, task: TaskId) -> Option<Instant> {
        self.heartbeats
            .lock()
            .expect("liveness table poisoned")
            .get(&task)
            .copied()
    }

    pub fn set_config(&self, config: LivenessConfig) {
        *self.config.lock().expect("liveness config poisoned") = config;
    }

    pub fn config(&self) -> LivenessConfig {
        *self.config.lock().expect("liveness config poisoned")
    }

    /// Check every task against its deadline.
    ///
    /// Acquires the liveness mutex once, computes `now − last_heartbeat`
    /// for each task, and reports the first task over its timeout. Tasks
    /// are checked in [`TaskId::ALL`] order, so a hung sensor processor is
    /// reported ahead of a hung command processor.
    pub fn check(&self) -> Result<(), LivenessFault> {
        let config = self.config();
        let now = self.clock.now();
        let heartbeats = self.heartbeats.lock().expect("liveness table poisoned");

        for task in TaskId::ALL {
            // Registered at construction; missing only if a caller removed
            // entries, which no API allows.
            let last = heartbeats.get(&task).copied().unwrap_or(now);
            let silent_for = now.saturating_duration_since(last);
            if silent_for > config.timeout_for(task) {
                return Err(LivenessFault { task, silent_for });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::ManualClock;

    fn table() -> (Arc<ManualClock>, TaskLiveness) {
        let clock = Arc::new(ManualClock::new());
        let liveness = TaskLiveness::new(clock.clone() as Arc<dyn Clock>);
        (clock, liveness)
    }

    #[test]
    fn fresh_table_is_healthy() {
        let (_clock, liveness) = table();
        assert!(liveness.check().is_ok());
    }

    #[test]
    fn silence_past_timeout_reports_sensor_task() {
        let (clock, liveness) = table();
        clock.advance(Duration::from_millis(150));
        let fault = liveness.check().unwrap_err();
        assert_eq!(fault.task, TaskId::SensorProcessor);
        assert!(fault.to_string().contains("Sensor Processor hung"));
    }

    #[test]
    fn touch_resets_deadline() {
        let (clock, liveness) = table();
        clock.advance(Duration::from_millis(80));
        liveness.touch(TaskId::SensorProcessor);
        liveness.touch(TaskId::CommandProcessor);
        clock.advance(Duration::from_millis(80));
        // 80 ms since last touch, within the 100 ms deadline.
        assert!(liveness.check().is_ok());
    }

    #[test]
    fn command_task_hang_reported_when_sensor_alive() {
        let (clock, liveness) = table();
        clock.advance(Duration::from_millis(150));
        liveness.touch(TaskId::SensorProcessor);
        let fault = liveness.check().unwrap_err();
        assert_eq!(fault.task, TaskId::CommandProcessor);
        assert!(fault.to_string().contains("Command Processor hung"));
    }

    #[test]
    fn fault_reports_silence_duration() {
        let (clock, liveness) = table();
        clock.advance(Duration::from_millis(250));
        let fault = liveness.check().unwrap_err();
        assert_eq!(fault.silent_for, Duration::from_millis(250));
        assert!(fault.to_string().contains("250 ms"));
    }

    #[test]
    fn exact_deadline_is_still_healthy() {
        let (clock, liveness) = table();
        clock.advance(Duration::from_millis(100));
        // Silence equal to the timeout does not trip; only strictly greater.
        assert!(liveness.check().is_ok());
    }

    #[test]
    fn touch_all_revives_both_tasks() {
        let (clock, liveness) = table();
        clock.advance(Duration::from_millis(500));
        assert!(liveness.check().is_err());
        liveness.touch_all();
        assert!(liveness.check().is_ok());
    }

    #[test]
    fn config_change_applies_to_next_check() {
        let (clock, liveness) = table();
        liveness.set_config(LivenessConfig {
            sensor_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
        });
        clock.advance(Duration::from_millis(500));
        assert!(liveness.check().is_ok());
    }

    #[test]
    fn touch_at_backdates_heartbeat() {
        let (clock, liveness) = table();
        let past = clock.now();
        clock.advance(Duration::from_millis(50));
        liveness.touch_at(TaskId::SensorProcessor, past);
        assert_eq!(liveness.last_heartbeat(TaskId::SensorProcessor), Some(past));
    }
}
