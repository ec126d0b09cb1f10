//! Bus-to-BCM wiring: frames published on the topic bus flow through the
//! bridges into the orchestrated pipeline, and sensor frames drive the
//! safety monitor.

use aegis_core::Orchestrator;
use aegis_middleware::{CommandBridge, Frame, SensorBridge, TopicBus};
use aegis_types::{
    Command, CommandPayload, CommandSource, RecordingSink, SinkEvent, SystemState,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Rig {
    bus: TopicBus,
    sink: Arc<RecordingSink>,
    orchestrator: Arc<Orchestrator>,
    forwarded: Arc<Mutex<Vec<Command>>>,
    sensor_bridge: SensorBridge,
    command_bridge: CommandBridge,
}

impl Rig {
    fn start() -> Self {
        let bus = TopicBus::default();
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = Arc::new(Orchestrator::new(sink.clone()));

        let forwarded: Arc<Mutex<Vec<Command>>> = Arc::new(Mutex::new(Vec::new()));
        let forwarded_clone = Arc::clone(&forwarded);
        orchestrator
            .initialize(
                Arc::new(move |cmd: &Command| {
                    forwarded_clone.lock().unwrap().push(*cmd);
                    Ok(())
                }),
                Arc::new(|| Ok(())),
            )
            .expect("initialize");
        orchestrator.start().expect("start");

        let sensor_bridge = SensorBridge::spawn(
            &bus,
            orchestrator.sensors().unwrap(),
            orchestrator.liveness().unwrap(),
        );
        let command_bridge = {
            let orchestrator = Arc::clone(&orchestrator);
            CommandBridge::spawn(
                &bus,
                Arc::new(move |source, payload, seq| {
                    let _ = orchestrator.process_command(source, payload, seq);
                }),
            )
        };

        Self {
            bus,
            sink,
            orchestrator,
            forwarded,
            sensor_bridge,
            command_bridge,
        }
    }

    fn shutdown(&self) {
        self.command_bridge.stop();
        self.sensor_bridge.stop();
        self.orchestrator.stop();
    }

    fn wait_for<F: Fn() -> bool>(&self, what: &str, check: F) {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(1_000) {
            if check() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for {what}");
    }

    /// Same as [`wait_for`](Self::wait_for), but keeps nominal sensor
    /// traffic flowing so the liveness deadline cannot trip while waiting.
    fn wait_for_while_feeding<F: Fn() -> bool>(&self, what: &str, check: F) {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(1_000) {
            if check() {
                return;
            }
            self.feed_nominal_sensors();
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for {what}");
    }

    /// Keep the sensor task alive and plausible in the background, the way
    /// real feeders would.
    fn feed_nominal_sensors(&self) {
        self.bus.publish(Frame::speed(3.0)).unwrap();
        self.bus.publish(Frame::battery_voltage(12.5)).unwrap();
    }
}

fn drive_payload() -> CommandPayload {
    CommandPayload {
        steering_angle_deg: 5.0,
        speed_mps: 2.0,
        acceleration_mps2: 0.2,
        brake_engaged: false,
    }
}

#[test]
fn command_frame_reaches_the_bcm() {
    let rig = Rig::start();
    rig.feed_nominal_sensors();

    rig.bus
        .publish(Frame::command(CommandSource::Remote, drive_payload(), 1))
        .unwrap();

    let forwarded = Arc::clone(&rig.forwarded);
    rig.wait_for_while_feeding("forwarded command", move || {
        !forwarded.lock().unwrap().is_empty()
    });

    let first = rig.forwarded.lock().unwrap()[0];
    assert_eq!(first.source, CommandSource::Remote);
    assert_eq!(first.sequence_number, 1);

    rig.shutdown();
}

#[test]
fn sensor_frames_keep_the_monitor_nominal() {
    let rig = Rig::start();

    // Feed sensors well past the 100 ms liveness deadline.
    for _ in 0..6 {
        rig.feed_nominal_sensors();
        std::thread::sleep(Duration::from_millis(40));
    }

    assert_eq!(rig.orchestrator.state(), SystemState::NormalOperation);
    rig.shutdown();
}

#[test]
fn overspeed_frame_triggers_emergency_stop() {
    let rig = Rig::start();
    rig.feed_nominal_sensors();

    rig.bus.publish(Frame::speed(14.0)).unwrap();

    let orchestrator = Arc::clone(&rig.orchestrator);
    rig.wait_for("emergency stop", move || {
        orchestrator.state() == SystemState::EmergencyStop
    });

    assert!(rig.sink.events().iter().any(
        |e| matches!(e, SinkEvent::Halt { reason } if reason.contains("speed limit"))
    ));
    rig.shutdown();
}

#[test]
fn silent_sensors_trigger_hung_task_halt() {
    let rig = Rig::start();
    // One initial reading, then silence: the sensor task misses its
    // 100 ms deadline while the command side stays alive.
    rig.feed_nominal_sensors();

    let orchestrator = Arc::clone(&rig.orchestrator);
    rig.wait_for("emergency stop", move || {
        orchestrator.state() == SystemState::EmergencyStop
    });

    assert!(rig.sink.events().iter().any(
        |e| matches!(e, SinkEvent::Halt { reason } if reason.contains("Sensor Processor hung"))
    ));
    rig.shutdown();
}

#[test]
fn low_battery_frame_triggers_emergency_stop() {
    let rig = Rig::start();
    rig.feed_nominal_sensors();

    rig.bus.publish(Frame::battery_voltage(8.9)).unwrap();

    let orchestrator = Arc::clone(&rig.orchestrator);
    rig.wait_for("emergency stop", move || {
        orchestrator.state() == SystemState::EmergencyStop
    });

    assert!(rig.sink.events().iter().any(
        |e| matches!(e, SinkEvent::Halt { reason } if reason.contains("battery voltage"))
    ));
    rig.shutdown();
}

#[test]
fn multiple_sources_arbitrate_over_the_bus() {
    let rig = Rig::start();
    rig.feed_nominal_sensors();

    rig.bus
        .publish(Frame::command(CommandSource::Autonomous, drive_payload(), 1))
        .unwrap();
    let forwarded = Arc::clone(&rig.forwarded);
    rig.wait_for_while_feeding("autonomous forward", move || {
        !forwarded.lock().unwrap().is_empty()
    });

    rig.bus
        .publish(Frame::command(CommandSource::Safety, CommandPayload::full_stop(), 1))
        .unwrap();
    let forwarded = Arc::clone(&rig.forwarded);
    rig.wait_for_while_feeding("safety preemption", move || {
        forwarded
            .lock()
            .unwrap()
            .last()
            .is_some_and(|cmd| cmd.source == CommandSource::Safety)
    });

    rig.shutdown();
}
