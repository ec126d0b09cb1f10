//! [`SensorHub`] – shared latest-value store for plausibility sensors.
//!
//! Subscriber callbacks (speed, battery voltage) write into the hub from
//! their dispatcher threads; the [`SafetyMonitor`][crate::SafetyMonitor]
//! reads a consistent snapshot under the same mutex on its 50 ms cadence.

use aegis_types::{Clock, SensorSnapshot};
use std::sync::{Arc, Mutex};

/// Mutex-guarded [`SensorSnapshot`] with update timestamps taken from the
/// injected clock.
pub struct SensorHub {
    snapshot: Mutex<SensorSnapshot>,
    clock: Arc<dyn Clock>,
}

impl SensorHub {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshot: Mutex::new(SensorSnapshot::default()),
            clock,
        }
    }

    /// Record a measured vehicle speed in m/s.
    pub fn record_speed(&self, speed_mps: f32) {
        let now = self.clock.now();
        let mut snapshot = self.snapshot.lock().expect("sensor snapshot poisoned");
        snapshot.current_speed_mps = speed_mps;
        snapshot.last_speed_update = Some(now);
    }

    /// Record a measured battery voltage in volts.
    pub fn record_battery_voltage(&self, voltage_v: f32) {
        let now = self.clock.now();
        let mut snapshot = self.snapshot.lock().expect("sensor snapshot poisoned");
        snapshot.battery_voltage_v = voltage_v;
        snapshot.last_battery_update = Some(now);
    }

    /// Consistent copy of the current snapshot.
    pub fn snapshot(&self) -> SensorSnapshot {
        *self.snapshot.lock().expect("sensor snapshot poisoned")
    }
}
