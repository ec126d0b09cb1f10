//! [`CommandForwarder`] – deterministic periodic dispatch to the BCM.
//!
//! A dedicated thread ticks every `forward_period` (10 ms default) against
//! **absolute** deadlines (`next_wake += period`), so processing time inside
//! a tick never drifts the cadence. Each tick selects the arbitration
//! winner and hands it to the forward callback; while the system is in
//! `EmergencyStop` nothing is dispatched regardless of slot contents.
//!
//! Callback failures and panics are logged through the sink and never stop
//! the loop. Shutdown is cooperative: `stop()` clears the running flag and
//! joins, bounded by one period.

use crate::selector::PrioritySelector;
use aegis_types::{Clock, Command, CoreError, LogSink, SystemState, FORWARD_PERIOD};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Invoked once per tick with the winning command, on the forwarder thread.
/// Must complete well within the forward period (≤ 1 ms).
pub type ForwardCallback = Arc<dyn Fn(&Command) -> Result<(), CoreError> + Send + Sync>;

/// Exponential-moving-average smoothing factor for the loop-time estimate.
const LOOP_TIME_ALPHA: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwarderConfig {
    pub forward_period: Duration,
    /// When `true`, an empty tick would emit a neutral heartbeat command.
    /// Defaults to `false`: empty ticks emit nothing.
    pub send_heartbeat_on_no_command: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            forward_period: FORWARD_PERIOD,
            send_heartbeat_on_no_command: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ForwarderStats {
    pub commands_forwarded: u64,
    pub no_command_cycles: u64,
    /// Ticks skipped because the system was in `EmergencyStop`.
    pub suppressed_cycles: u64,
    pub avg_loop_time_us: u32,
    pub max_loop_time_us: u32,
    pub last_forward: Option<Instant>,
    loop_samples: u64,
}

impl ForwarderStats {
    fn record_loop_time(&mut self, loop_time_us: u32) {
        if loop_time_us > self.max_loop_time_us {
            self.max_loop_time_us = loop_time_us;
        }
        if self.loop_samples == 0 {
            self.avg_loop_time_us = loop_time_us;
        } else {
            self.avg_loop_time_us = (LOOP_TIME_ALPHA * loop_time_us as f32
                + (1.0 - LOOP_TIME_ALPHA) * self.avg_loop_time_us as f32)
                as u32;
        }
        self.loop_samples += 1;
    }
}

/// Periodic dispatch loop; see the module docs.
pub struct CommandForwarder {
    selector: Arc<PrioritySelector>,
    state: Arc<Mutex<SystemState>>,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    config: Mutex<ForwarderConfig>,
    stats: Arc<Mutex<ForwarderStats>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CommandForwarder {
    pub fn new(
        selector: Arc<PrioritySelector>,
        state: Arc<Mutex<SystemState>>,
        sink: Arc<dyn LogSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            selector,
            state,
            sink,
            clock,
            config: Mutex::new(ForwarderConfig::default()),
            stats: Arc::new(Mutex::new(ForwarderStats::default())),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Start the forwarding thread.
    pub fn start(&self, callback: ForwardCallback) -> Result<(), CoreError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(CoreError::AlreadyRunning);
        }

        let period = self.config.lock().expect("forwarder config poisoned").forward_period;
        let selector = Arc::clone(&self.selector);
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("aegis-forwarder".to_string())
            .spawn(move || {
                let mut next_wake = Instant::now() + period;
                while running.load(Ordering::Acquire) {
                    let loop_start = Instant::now();

                    let halted =
                        *state.lock().expect("system state poisoned") == SystemState::EmergencyStop;

                    if halted {
                        stats.lock().expect("forwarder stats poisoned").suppressed_cycles += 1;
                    } else if let Some(cmd) = selector.select() {
                        match panic::catch_unwind(AssertUnwindSafe(|| callback(&cmd))) {
                            Ok(Ok(())) => {
                                sink.forwarded(&cmd);
                                let mut stats =
                                    stats.lock().expect("forwarder stats poisoned");
                                stats.commands_forwarded += 1;
                                stats.last_forward = Some(clock.now());
                            }
                            Ok(Err(e)) => {
                                sink.error("forwarder", &format!("BCM callback failed: {e}"));
                            }
                            Err(_) => {
                                sink.error("forwarder", "BCM callback panicked");
                            }
                        }
                    } else {
                        stats.lock().expect("forwarder stats poisoned").no_command_cycles += 1;
                    }

                    let loop_time_us = loop_start.elapsed().as_micros().min(u32::MAX as u128) as u32;
                    stats
                        .lock()
                        .expect("forwarder stats poisoned")
                        .record_loop_time(loop_time_us);

                    let now = Instant::now();
                    if next_wake > now {
                        thread::sleep(next_wake - now);
                    }
                    next_wake += period;
                }
            })
            .map_err(|e| CoreError::Channel(format!("failed to spawn forwarder thread: {e}")))?;

        *self.handle.lock().expect("forwarder handle poisoned") = Some(handle);
        Ok(())
    }

    /// Clear the running flag and join; returns once the thread exits.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.handle.lock().expect("forwarder handle poisoned").take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_config(&self, config: ForwarderConfig) {
        *self.config.lock().expect("forwarder config poisoned") = config;
    }

    pub fn statistics(&self) -> ForwarderStats {
        *self.stats.lock().expect("forwarder stats poisoned")
    }
}

impl Drop for CommandForwarder {
    fn drop(&mut self) {
        self.stop();
    }
}
