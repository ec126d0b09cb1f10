//! [`Orchestrator`] – lifecycle, state machine, and component wiring.
//!
//! Owns every pipeline and safety component behind `Arc`s and the two
//! external callbacks (BCM dispatch, external-watchdog pulse). Components
//! stay acyclic: the selector borrows the slot, the forwarder borrows the
//! selector, and nothing holds a reference back to the orchestrator. All
//! wiring is done with plain closures over the component handles.
//!
//! State machine: `Initializing → NormalOperation → {SafeMode,
//! EmergencyStop, Fault}`. `EmergencyStop → NormalOperation` only through
//! [`Orchestrator::reset`]; `Fault` has no automatic exit.

use crate::config::Config;
use crate::forwarder::{CommandForwarder, ForwarderStats};
use crate::intake::{CommandIntake, IntakeStats};
use crate::selector::{PrioritySelector, SelectorStats};
use crate::slot::LatestCommandSlot;
use crate::validator::CommandValidator;
use aegis_safety::{
    HeartbeatEmitter, HeartbeatStats, MonitorStats, SafetyMonitor, SensorHub, TaskLiveness,
};
use aegis_types::{
    Clock, Command, CommandPayload, CommandSource, CoreError, LogSink, MonotonicClock,
    SystemState, TaskId,
};
use std::sync::{Arc, Mutex};

/// Receives the winning command once per forwarder period. Runs on the
/// forwarder thread and must be non-blocking (≤ 1 ms).
pub type BcmCallback = Arc<dyn Fn(&Command) -> Result<(), CoreError> + Send + Sync>;

/// Pulses the external safety processor; runs on the heartbeat thread.
pub type WatchdogCallback = Arc<dyn Fn() -> Result<(), CoreError> + Send + Sync>;

/// Aggregated view over all component statistics.
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    pub intake: IntakeStats,
    pub selector: SelectorStats,
    pub forwarder: ForwarderStats,
    pub heartbeat: HeartbeatStats,
    pub monitor: MonitorStats,
    pub state: SystemState,
}

/// Everything constructed by `initialize`, kept together so start/stop and
/// the accessors can hand out component handles.
struct Pipeline {
    intake: Arc<CommandIntake>,
    validator: Arc<CommandValidator>,
    slot: Arc<LatestCommandSlot>,
    selector: Arc<PrioritySelector>,
    forwarder: Arc<CommandForwarder>,
    emitter: Arc<HeartbeatEmitter>,
    liveness: Arc<TaskLiveness>,
    sensors: Arc<SensorHub>,
    monitor: Arc<SafetyMonitor>,
    bcm: BcmCallback,
    watchdog: WatchdogCallback,
}

/// Top-level handle over the command arbitration and safety core.
pub struct Orchestrator {
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SystemState>>,
    config: Mutex<Config>,
    pipeline: Mutex<Option<Arc<Pipeline>>>,
}

impl Orchestrator {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_clock(sink, Arc::new(MonotonicClock))
    }

    /// Construct with an explicit clock (tests inject a
    /// [`ManualClock`](aegis_types::ManualClock) here).
    pub fn with_clock(sink: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        sink.info("orchestrator", "command arbitration core created");
        Self {
            sink,
            clock,
            state: Arc::new(Mutex::new(SystemState::Initializing)),
            config: Mutex::new(Config::default()),
            pipeline: Mutex::new(None),
        }
    }

    /// Construct and wire all components and transition to
    /// `NormalOperation`.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyInitialized`] on a second call; the state is
    /// left untouched. On any failure the state remains `Initializing` and
    /// [`start`](Self::start) is refused.
    pub fn initialize(
        &self,
        bcm: BcmCallback,
        watchdog: WatchdogCallback,
    ) -> Result<(), CoreError> {
        let mut guard = self.pipeline.lock().expect("pipeline poisoned");
        if guard.is_some() {
            self.sink.error("orchestrator", "already initialized");
            return Err(CoreError::AlreadyInitialized);
        }

        self.sink.info("orchestrator", "initializing");
        let config = *self.config.lock().expect("config poisoned");

        let slot = Arc::new(LatestCommandSlot::with_freshness_timeout(
            Arc::clone(&self.clock),
            config.validator.freshness_timeout(),
        ));
        let validator = Arc::new(CommandValidator::new(Arc::clone(&self.clock)));
        validator.set_config(config.validator.to_component_config());

        let intake = Arc::new(CommandIntake::new(Arc::clone(&self.clock)));
        let selector = Arc::new(PrioritySelector::new(Arc::clone(&slot)));

        let forwarder = Arc::new(CommandForwarder::new(
            Arc::clone(&selector),
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
            Arc::clone(&self.clock),
        ));
        forwarder.set_config(config.forwarder.to_component_config());

        let liveness = Arc::new(TaskLiveness::with_config(
            Arc::clone(&self.clock),
            config.monitor.to_liveness_config(),
        ));
        let sensors = Arc::new(SensorHub::new(Arc::clone(&self.clock)));

        let emitter = Arc::new(HeartbeatEmitter::new(
            Arc::clone(&self.sink),
            Arc::clone(&self.clock),
        ));
        emitter.set_config(config.heartbeat.to_component_config());

        let monitor = Arc::new(SafetyMonitor::new(
            Arc::clone(&liveness),
            Arc::clone(&sensors),
            Arc::clone(&self.sink),
        ));
        monitor.set_config(config.monitor.to_component_config());

        // Intake feeds the validation pipeline directly; no back-reference
        // to the orchestrator is needed.
        {
            let validator = Arc::clone(&validator);
            let slot = Arc::clone(&slot);
            let sink = Arc::clone(&self.sink);
            intake.set_callback(Arc::new(move |cmd| {
                Self::dispatch(&validator, &slot, &sink, cmd);
            }));
        }

        // Halt latches EmergencyStop and purges every slot.
        {
            let state = Arc::clone(&self.state);
            let slot = Arc::clone(&slot);
            let sink = Arc::clone(&self.sink);
            monitor.set_halt_hook(Arc::new(move |reason| {
                slot.clear_all();
                Self::transition_on(&state, sink.as_ref(), SystemState::EmergencyStop, reason);
            }));
        }

        liveness.touch_all();

        *guard = Some(Arc::new(Pipeline {
            intake,
            validator,
            slot,
            selector,
            forwarder,
            emitter,
            liveness,
            sensors,
            monitor,
            bcm,
            watchdog,
        }));
        drop(guard);

        self.transition(SystemState::NormalOperation, "initialization complete");
        self.sink.info("orchestrator", "initialization successful");
        Ok(())
    }

    /// Start the safety monitor, heartbeat emitter, and forwarder.
    pub fn start(&self) -> Result<(), CoreError> {
        let pipeline = self.pipeline()?;
        self.sink.info("orchestrator", "starting command processing");

        pipeline.monitor.start()?;

        // The external pulse doubles as the command task's own liveness
        // heartbeat: as long as the pipeline process is scheduled, the
        // command processor is alive.
        let pulse: aegis_safety::PulseCallback = {
            let liveness = Arc::clone(&pipeline.liveness);
            let watchdog = Arc::clone(&pipeline.watchdog);
            Arc::new(move || {
                liveness.touch(TaskId::CommandProcessor);
                watchdog()
            })
        };
        if let Err(e) = pipeline.emitter.start(pulse) {
            pipeline.monitor.stop();
            return Err(e);
        }

        // Forwarded commands feed the emitter so the external watchdog can
        // see pipeline progress, not just process liveness.
        let forward: crate::forwarder::ForwardCallback = {
            let bcm = Arc::clone(&pipeline.bcm);
            let emitter = Arc::clone(&pipeline.emitter);
            Arc::new(move |cmd: &Command| {
                bcm(cmd)?;
                emitter.feed();
                Ok(())
            })
        };
        if let Err(e) = pipeline.forwarder.start(forward) {
            pipeline.emitter.stop();
            pipeline.monitor.stop();
            return Err(e);
        }

        self.sink.info("orchestrator", "command processing started");
        Ok(())
    }

    /// Stop all periodic tasks, in reverse start order. Safe to call when
    /// not initialized or not started.
    pub fn stop(&self) {
        let pipeline = match self.pipeline() {
            Ok(p) => p,
            Err(_) => return,
        };
        self.sink.info("orchestrator", "stopping command processing");
        pipeline.forwarder.stop();
        pipeline.emitter.stop();
        pipeline.monitor.stop();
        self.sink.info("orchestrator", "command processing stopped");
    }

    /// Main entry point for raw commands from any source.
    pub fn process_command(
        &self,
        source: CommandSource,
        payload: CommandPayload,
        sequence_number: u64,
    ) -> Result<(), CoreError> {
        let pipeline = self.pipeline().map_err(|e| {
            self.sink
                .error("orchestrator", "cannot process command before initialize");
            e
        })?;
        pipeline.intake.receive(source, payload, sequence_number);
        Ok(())
    }

    /// Run one command through validation and storage, bypassing intake.
    pub fn handle_command(&self, cmd: Command) -> Result<(), CoreError> {
        let pipeline = self.pipeline()?;
        Self::dispatch(&pipeline.validator, &pipeline.slot, &self.sink, cmd);
        Ok(())
    }

    /// Operator-level emergency stop: purge all slots and latch
    /// `EmergencyStop`. Idempotent.
    pub fn trigger_emergency_stop(&self) {
        self.sink.error("orchestrator", "manual emergency stop triggered");
        if let Ok(pipeline) = self.pipeline() {
            pipeline.slot.clear_all();
            pipeline.monitor.execute_immediate_halt("manual trigger");
        }
        self.transition(SystemState::EmergencyStop, "manual trigger");
    }

    /// Return to normal operation after an emergency stop.
    ///
    /// Clears all slots, resets the validator's replay protection and the
    /// selector statistics, re-arms the safety monitor, and refreshes the
    /// liveness table.
    ///
    /// # Errors
    ///
    /// [`CoreError::ResetRefused`] when the system is in `Fault`; manual
    /// intervention is required there.
    pub fn reset(&self) -> Result<(), CoreError> {
        let current = self.state();
        if current == SystemState::Fault {
            self.sink.error("orchestrator", "reset refused: system is in fault state");
            return Err(CoreError::ResetRefused(current));
        }

        self.sink.info("orchestrator", "resetting to normal operation");
        if let Ok(pipeline) = self.pipeline() {
            pipeline.slot.clear_all();
            pipeline.validator.reset();
            pipeline.selector.reset_statistics();
            pipeline.liveness.touch_all();
            pipeline.monitor.rearm();
        }
        self.transition(SystemState::NormalOperation, "manual reset");
        self.sink.info("orchestrator", "reset complete");
        Ok(())
    }

    /// Latch the terminal `Fault` state (unrecoverable condition found by
    /// an operator or an external supervisor).
    pub fn declare_fault(&self, reason: &str) {
        self.transition(SystemState::Fault, reason);
    }

    pub fn state(&self) -> SystemState {
        *self.state.lock().expect("system state poisoned")
    }

    /// Replace the configuration. Takes effect on already-constructed
    /// components immediately, except thread periods which apply on the
    /// next start.
    pub fn set_config(&self, config: Config) {
        *self.config.lock().expect("config poisoned") = config;
        if let Ok(pipeline) = self.pipeline() {
            pipeline.validator.set_config(config.validator.to_component_config());
            pipeline.slot.set_freshness_timeout(config.validator.freshness_timeout());
            pipeline.forwarder.set_config(config.forwarder.to_component_config());
            pipeline.emitter.set_config(config.heartbeat.to_component_config());
            pipeline.monitor.set_config(config.monitor.to_component_config());
            pipeline.liveness.set_config(config.monitor.to_liveness_config());
        }
    }

    pub fn statistics(&self) -> Result<Statistics, CoreError> {
        let pipeline = self.pipeline()?;
        Ok(Statistics {
            intake: pipeline.intake.statistics(),
            selector: pipeline.selector.statistics(),
            forwarder: pipeline.forwarder.statistics(),
            heartbeat: pipeline.emitter.statistics(),
            monitor: pipeline.monitor.statistics(),
            state: self.state(),
        })
    }

    /// Sensor hub handle for subscriber wiring (speed / battery feeds).
    pub fn sensors(&self) -> Result<Arc<SensorHub>, CoreError> {
        Ok(Arc::clone(&self.pipeline()?.sensors))
    }

    /// Liveness table handle for subscriber wiring.
    pub fn liveness(&self) -> Result<Arc<TaskLiveness>, CoreError> {
        Ok(Arc::clone(&self.pipeline()?.liveness))
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn pipeline(&self) -> Result<Arc<Pipeline>, CoreError> {
        self.pipeline
            .lock()
            .expect("pipeline poisoned")
            .clone()
            .ok_or(CoreError::NotInitialized)
    }

    /// Validate → store-or-drop. Shared by the intake callback and
    /// [`handle_command`](Self::handle_command).
    fn dispatch(
        validator: &CommandValidator,
        slot: &LatestCommandSlot,
        sink: &Arc<dyn LogSink>,
        cmd: Command,
    ) {
        sink.command_received(&cmd);
        let record = validator.validate(&cmd);
        sink.validation(&cmd, &record);

        if record.is_valid() {
            slot.store(cmd);
            sink.selection(&cmd);
        } else {
            sink.error(
                "validator",
                &format!("command from {} rejected: {}", cmd.source, record.reason),
            );
        }
    }

    fn transition(&self, to: SystemState, reason: &str) {
        Self::transition_on(&self.state, self.sink.as_ref(), to, reason);
    }

    fn transition_on(state: &Mutex<SystemState>, sink: &dyn LogSink, to: SystemState, reason: &str) {
        let mut state = state.lock().expect("system state poisoned");
        if *state != to {
            let from = *state;
            *state = to;
            sink.state_transition(from, to, reason);
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}
