//! [`HeartbeatEmitter`] – periodic pulse toward the external safety
//! processor.
//!
//! A dedicated thread invokes the pulse callback every
//! [`HEARTBEAT_PERIOD`](aegis_types::HEARTBEAT_PERIOD) against absolute
//! deadlines. The command pipeline calls [`HeartbeatEmitter::feed`] whenever
//! it forwards a command; feeds never gate emission, they are only surfaced
//! in [`HeartbeatStats::time_since_last_feed`] so the external watchdog can
//! judge pipeline progress itself.

use aegis_types::{Clock, CoreError, LogSink, HEARTBEAT_PERIOD};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback invoked once per heartbeat period on the emitter thread.
/// Must be fast and non-blocking; errors are logged and never stop the
/// emitter.
pub type PulseCallback = Arc<dyn Fn() -> Result<(), CoreError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often the external pulse is sent.
    pub heartbeat_period: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: HEARTBEAT_PERIOD,
        }
    }
}

/// Counters exposed for diagnosis; `time_since_last_feed` is computed at
/// query time.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatStats {
    pub heartbeats_sent: u64,
    pub feeds_received: u64,
    pub time_since_last_feed: Duration,
}

#[derive(Default)]
struct Counters {
    heartbeats_sent: u64,
    feeds_received: u64,
}

/// Heartbeat pulse generator.
pub struct HeartbeatEmitter {
    config: Mutex<HeartbeatConfig>,
    counters: Arc<Mutex<Counters>>,
    last_feed: Arc<Mutex<Instant>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatEmitter {
    pub fn new(sink: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            config: Mutex::new(HeartbeatConfig::default()),
            counters: Arc::new(Mutex::new(Counters::default())),
            last_feed: Arc::new(Mutex::new(now)),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            sink,
            clock,
        }
    }

    /// Start the emitter thread. Fails with [`CoreError::AlreadyRunning`]
    /// when called twice without an intervening [`stop`](Self::stop).
    pub fn start(&self, pulse: PulseCallback) -> Result<(), CoreError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(CoreError::AlreadyRunning);
        }

        *self.last_feed.lock().expect("feed time poisoned") = self.clock.now();

        let period = self.config.lock().expect("heartbeat config poisoned").heartbeat_period;
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);
        let sink = Arc::clone(&self.sink);

        let handle = thread::Builder::new()
            .name("aegis-heartbeat".to_string())
            .spawn(move || {
                let mut next_wake = Instant::now() + period;
                while running.load(Ordering::Acquire) {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| pulse()));
                    match outcome {
                        Ok(Ok(())) => {
                            counters.lock().expect("heartbeat counters poisoned").heartbeats_sent += 1;
                            sink.heartbeat();
                        }
                        Ok(Err(e)) => {
                            sink.error("heartbeat", &format!("pulse callback failed: {e}"));
                        }
                        Err(_) => {
                            sink.error("heartbeat", "pulse callback panicked");
                        }
                    }

                    let now = Instant::now();
                    if next_wake > now {
                        thread::sleep(next_wake - now);
                    }
                    next_wake += period;
                }
            })
            .map_err(|e| CoreError::Channel(format!("failed to spawn heartbeat thread: {e}")))?;

        *self.handle.lock().expect("heartbeat handle poisoned") = Some(handle);
        Ok(())
    }

    /// Clear the running flag and join the emitter thread.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.handle.lock().expect("heartbeat handle poisoned").take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Mark the pipeline as having made progress (a command was forwarded).
    pub fn feed(&self) {
        *self.last_feed.lock().expect("feed time poisoned") = self.clock.now();
        self.counters.lock().expect("heartbeat counters poisoned").feeds_received += 1;
    }

    pub fn set_config(&self, config: HeartbeatConfig) {
        *self.config.lock().expect("heartbeat config poisoned") = config;
    }

    pub fn statistics(&self) -> HeartbeatStats {
        let counters = self.counters.lock().expect("heartbeat counters poisoned");
        let last_feed = *self.last_feed.lock().expect("feed time poisoned");
        HeartbeatStats {
            heartbeats_sent: counters.heartbeats_sent,
            feeds_received: counters.feeds_received,
            time_since_last_feed: self.clock.now().saturating_duration_since(last_feed),
        }
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}
