//! [`SafetyMonitor`] – periodic liveness and plausibility checking with an
//! idempotent emergency halt.
//!
//! A dedicated thread evaluates, every
//! [`MONITOR_PERIOD`](aegis_types::MONITOR_PERIOD), in this order:
//!
//! 1. **Task liveness** via [`TaskLiveness::check`] (liveness mutex only,
//!    released before step 2).
//! 2. **Sensor plausibility** from the [`SensorHub`] snapshot: measured
//!    speed above the hardware cap or battery voltage below the minimum.
//!
//! The first violation triggers [`SafetyMonitor::execute_immediate_halt`],
//! which fires exactly once per arming: it logs the reason and invokes the
//! halt hook installed by the orchestrator (state transition to
//! `EmergencyStop` plus slot purge). Halt is terminal until the operator
//! resets and the monitor is re-armed.

use crate::liveness::TaskLiveness;
use crate::sensors::SensorHub;
use aegis_types::{CoreError, LogSink, MAX_SPEED_HW, MIN_BATTERY_VOLTAGE, MONITOR_PERIOD};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Invoked exactly once per halt, on whichever thread detected the
/// violation. Installed by the orchestrator.
pub type HaltHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    pub monitor_period: Duration,
    /// Measured speed above this value is implausible for safe operation.
    pub max_speed_mps: f32,
    /// Measured voltage below this value means imminent brownout.
    pub min_battery_voltage_v: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitor_period: MONITOR_PERIOD,
            max_speed_mps: MAX_SPEED_HW,
            min_battery_voltage_v: MIN_BATTERY_VOLTAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorStats {
    pub checks_performed: u64,
    pub nominal_checks: u64,
    pub halts_triggered: u64,
}

/// State shared between the monitor handle and its check thread.
struct MonitorCore {
    liveness: Arc<TaskLiveness>,
    sensors: Arc<SensorHub>,
    sink: Arc<dyn LogSink>,
    config: Mutex<MonitorConfig>,
    stats: Mutex<MonitorStats>,
    halted: AtomicBool,
    halt_hook: Mutex<Option<HaltHook>>,
}

impl MonitorCore {
    /// One full safety check. Lock order is fixed: the liveness mutex is
    /// taken (inside `check`) and released before the sensor mutex.
    fn run_check(&self) {
        let config = *self.config.lock().expect("monitor config poisoned");
        self.stats.lock().expect("monitor stats poisoned").checks_performed += 1;

        if let Err(fault) = self.liveness.check() {
            self.execute_immediate_halt(&fault.to_string());
            return;
        }

        let snapshot = self.sensors.snapshot();

        // Plausibility applies only to readings that exist; an unpopulated
        // field is a liveness concern, not a plausibility violation.
        if snapshot.last_speed_update.is_some() && snapshot.current_speed_mps > config.max_speed_mps
        {
            self.execute_immediate_halt(&format!(
                "speed limit exceeded: {:.1} m/s > {:.1} m/s",
                snapshot.current_speed_mps, config.max_speed_mps
            ));
            return;
        }

        if snapshot.last_battery_update.is_some()
            && snapshot.battery_voltage_v < config.min_battery_voltage_v
        {
            self.execute_immediate_halt(&format!(
                "battery voltage below minimum: {:.1} V < {:.1} V",
                snapshot.battery_voltage_v, config.min_battery_voltage_v
            ));
            return;
        }

        self.stats.lock().expect("monitor stats poisoned").nominal_checks += 1;
    }

    fn execute_immediate_halt(&self, reason: &str) {
        // First caller wins; every later call is a no-op until re-armed.
        if self
            .halted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.sink.halt(reason);
        self.stats.lock().expect("monitor stats poisoned").halts_triggered += 1;

        let hook = self.halt_hook.lock().expect("halt hook poisoned").clone();
        if let Some(hook) = hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(reason))).is_err() {
                self.sink.error("safety_monitor", "halt hook panicked");
            }
        }
    }
}

/// Periodic safety checker. See the module docs for the check order.
pub struct SafetyMonitor {
    core: Arc<MonitorCore>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SafetyMonitor {
    pub fn new(liveness: Arc<TaskLiveness>, sensors: Arc<SensorHub>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            core: Arc::new(MonitorCore {
                liveness,
                sensors,
                sink,
                config: Mutex::new(MonitorConfig::default()),
                stats: Mutex::new(MonitorStats::default()),
                halted: AtomicBool::new(false),
                halt_hook: Mutex::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Install the action performed on halt. Must be set before the first
    /// violation can occur; a halt with no hook still logs and latches.
    pub fn set_halt_hook(&self, hook: HaltHook) {
        *self.core.halt_hook.lock().expect("halt hook poisoned") = Some(hook);
    }

    /// Start the periodic check thread.
    pub fn start(&self) -> Result<(), CoreError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(CoreError::AlreadyRunning);
        }

        let period = self.core.config.lock().expect("monitor config poisoned").monitor_period;
        let running = Arc::clone(&self.running);
        let core = Arc::clone(&self.core);

        let handle = thread::Builder::new()
            .name("aegis-safety-monitor".to_string())
            .spawn(move || {
                let mut next_wake = Instant::now() + period;
                while running.load(Ordering::Acquire) {
                    core.run_check();

                    let now = Instant::now();
                    if next_wake > now {
                        thread::sleep(next_wake - now);
                    }
                    next_wake += period;
                }
            })
            .map_err(|e| CoreError::Channel(format!("failed to spawn monitor thread: {e}")))?;

        *self.handle.lock().expect("monitor handle poisoned") = Some(handle);
        Ok(())
    }

    /// Clear the running flag and join the check thread.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.handle.lock().expect("monitor handle poisoned").take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run a single check synchronously on the caller's thread.
    pub fn run_check_now(&self) {
        self.core.run_check();
    }

    /// Trigger the halt path directly (also used by the check thread).
    pub fn execute_immediate_halt(&self, reason: &str) {
        self.core.execute_immediate_halt(reason);
    }

    /// Whether a halt has latched since the last arming.
    pub fn is_halted(&self) -> bool {
        self.core.halted.load(Ordering::Acquire)
    }

    /// Clear the halt latch after an operator reset.
    pub fn rearm(&self) {
        self.core.halted.store(false, Ordering::Release);
    }

    pub fn set_config(&self, config: MonitorConfig) {
        *self.core.config.lock().expect("monitor config poisoned") = config;
    }

    pub fn statistics(&self) -> MonitorStats {
        *self.core.stats.lock().expect("monitor stats poisoned")
    }
}

impl Drop for SafetyMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
