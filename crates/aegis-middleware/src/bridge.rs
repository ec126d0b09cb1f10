//! Dispatcher threads that drain the [`TopicBus`] into the core.
//!
//! The core's contract is callback-based and thread-synchronous: sensor
//! updates land in the [`SensorHub`] under its mutex, raw commands go to
//! `Orchestrator::process_command` on the caller's thread. These bridges
//! are those callers. Each owns a plain dispatcher thread that polls its
//! subscription cooperatively, so shutdown joins within one poll interval.

use crate::bus::{Frame, FramePayload, TopicBus};
use aegis_safety::{SensorHub, TaskLiveness};
use aegis_types::{CommandPayload, CommandSource, TaskId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Poll interval of the dispatcher threads when the bus is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Receives each command frame's content, on the dispatcher thread.
pub type CommandHandler = Arc<dyn Fn(CommandSource, CommandPayload, u64) + Send + Sync>;

fn spawn_dispatcher(
    name: &str,
    mut receiver: broadcast::Receiver<Frame>,
    running: Arc<AtomicBool>,
    mut handle_frame: impl FnMut(Frame) + Send + 'static,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while running.load(Ordering::Acquire) {
                match receiver.try_recv() {
                    Ok(frame) => handle_frame(frame),
                    Err(TryRecvError::Empty) => thread::sleep(POLL_INTERVAL),
                    Err(TryRecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "bus dispatcher lagged");
                    }
                    Err(TryRecvError::Closed) => break,
                }
            }
        })
        .expect("failed to spawn dispatcher thread")
}

/// Drains speed and battery frames into the [`SensorHub`] and marks the
/// sensor task alive on every delivery.
pub struct SensorBridge {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SensorBridge {
    pub fn spawn(bus: &TopicBus, sensors: Arc<SensorHub>, liveness: Arc<TaskLiveness>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let receiver = bus.subscribe();

        let handle = spawn_dispatcher(
            "aegis-sensor-bridge",
            receiver,
            Arc::clone(&running),
            move |frame| match frame.payload {
                FramePayload::Speed(speed_mps) => {
                    sensors.record_speed(speed_mps);
                    liveness.touch(TaskId::SensorProcessor);
                }
                FramePayload::BatteryVoltage(voltage_v) => {
                    sensors.record_battery_voltage(voltage_v);
                    liveness.touch(TaskId::SensorProcessor);
                }
                FramePayload::SourceCommand { .. } => {}
            },
        );

        Self {
            running,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the dispatcher thread and join it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().expect("bridge handle poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SensorBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drains command frames into a handler (typically
/// `Orchestrator::process_command`).
pub struct CommandBridge {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CommandBridge {
    pub fn spawn(bus: &TopicBus, handler: CommandHandler) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let receiver = bus.subscribe();

        let handle = spawn_dispatcher(
            "aegis-command-bridge",
            receiver,
            Arc::clone(&running),
            move |frame| {
                if let FramePayload::SourceCommand {
                    source,
                    payload,
                    sequence_number,
                } = frame.payload
                {
                    handler(source, payload, sequence_number);
                }
            },
        );

        Self {
            running,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the dispatcher thread and join it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().expect("bridge handle poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CommandBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::{Clock, MonotonicClock};
    use std::time::Instant;

    fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(1_000) {
            if check() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for {what}");
    }

    fn hub_and_liveness() -> (Arc<SensorHub>, Arc<TaskLiveness>) {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock);
        (
            Arc::new(SensorHub::new(Arc::clone(&clock))),
            Arc::new(TaskLiveness::new(clock)),
        )
    }

    #[test]
    fn sensor_bridge_updates_hub_and_liveness() {
        let bus = TopicBus::default();
        let (sensors, liveness) = hub_and_liveness();
        let bridge = SensorBridge::spawn(&bus, Arc::clone(&sensors), Arc::clone(&liveness));

        let before = liveness.last_heartbeat(TaskId::SensorProcessor).unwrap();
        thread::sleep(Duration::from_millis(10));
        bus.publish(Frame::speed(6.5)).unwrap();
        bus.publish(Frame::battery_voltage(12.1)).unwrap();

        let sensors_view = Arc::clone(&sensors);
        wait_for("sensor snapshot update", move || {
            let snapshot = sensors_view.snapshot();
            snapshot.current_speed_mps == 6.5 && snapshot.battery_voltage_v == 12.1
        });
        assert!(liveness.last_heartbeat(TaskId::SensorProcessor).unwrap() > before);

        bridge.stop();
    }

    #[test]
    fn sensor_bridge_ignores_command_frames() {
        let bus = TopicBus::default();
        let (sensors, liveness) = hub_and_liveness();
        let bridge = SensorBridge::spawn(&bus, Arc::clone(&sensors), liveness);

        bus.publish(Frame::command(CommandSource::Remote, CommandPayload::default(), 1))
            .unwrap();
        thread::sleep(Duration::from_millis(30));

        assert!(sensors.snapshot().last_speed_update.is_none());
        bridge.stop();
    }

    #[test]
    fn command_bridge_delivers_commands() {
        let bus = TopicBus::default();
        let seen: Arc<Mutex<Vec<(CommandSource, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let bridge = CommandBridge::spawn(
            &bus,
            Arc::new(move |source, _payload, seq| {
                seen_clone.lock().unwrap().push((source, seq));
            }),
        );

        bus.publish(Frame::command(CommandSource::Manual, CommandPayload::default(), 3))
            .unwrap();
        bus.publish(Frame::speed(1.0)).unwrap();
        bus.publish(Frame::command(CommandSource::Safety, CommandPayload::full_stop(), 4))
            .unwrap();

        let seen_view = Arc::clone(&seen);
        wait_for("both commands dispatched", move || {
            seen_view.lock().unwrap().len() == 2
        });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(CommandSource::Manual, 3), (CommandSource::Safety, 4)]
        );

        bridge.stop();
    }

    #[test]
    fn bridges_stop_promptly() {
        let bus = TopicBus::default();
        let (sensors, liveness) = hub_and_liveness();
        let bridge = SensorBridge::spawn(&bus, sensors, liveness);

        let started = Instant::now();
        bridge.stop();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn stop_is_idempotent() {
        let bus = TopicBus::default();
        let seen = Arc::new(Mutex::new(Vec::<(CommandSource, u64)>::new()));
        let seen_clone = Arc::clone(&seen);
        let bridge = CommandBridge::spawn(
            &bus,
            Arc::new(move |source, _payload, seq| {
                seen_clone.lock().unwrap().push((source, seq));
            }),
        );
        bridge.stop();
        bridge.stop();
    }
}
