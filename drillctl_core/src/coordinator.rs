//! Coordinator — selects the operating mode, arbitrates manual vs automatic
//! control of the shared axes, brokers external intents through a bounded
//! command channel, and republishes a status snapshot every cycle.
//!
//! Mirrors the concurrency model of the rest of this workspace: a single
//! control-loop thread owns all motion state and the GPIO device; other
//! threads interact with it only by enqueuing commands and reading the
//! published snapshot, never by reaching into the control state directly.
//! `emergency_stop` is the one exception: it bypasses the command queue
//! entirely and sets a shared `AtomicBool` directly, so the call returns
//! only once the disable request has unambiguously landed — no queue
//! capacity to fail against, no batch to sort. `Coordinator::tick` checks
//! and clears that flag unconditionally as its very first action, ahead of
//! draining the regular command queue or sampling inputs, so the axes are
//! disabled on the control task's next yield regardless of what else is
//! pending that cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

use drillctl_common::config::DrillConfig;
use drillctl_common::consts::DEBOUNCE_MS;
use drillctl_hal::Gpio;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cycle::{CyclePhaseKind, CycleStateMachine};
use crate::display::{DisplaySink, NullDisplaySink, MSG_LOAD_WORKPIECE, MSG_PAUSED, MSG_UNLOAD};
use crate::error::CoreError;
use crate::input::{InputSampler, InputSnapshot, JoystickBand};
use crate::manual::ManualController;
use crate::permit::{AlwaysPermit, PermitSource};
use crate::pulse::PulseEngine;
use crate::safety::{SafetySupervisor, Verdict};

const NEUTRAL_SNAPSHOT: InputSnapshot = InputSnapshot {
    btn_reset: false,
    btn_start: false,
    btn_stop: false,
    btn_drill: false,
    safety_ok: false,
    limit_home: false,
    limit_final: false,
    joystick: JoystickBand::Neutral,
    joystick_raw: 512,
};

/// Which controller currently owns the shared axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Manual,
    Automatic,
}

/// Snapshot of the coordinator's state, read by any thread via [`SnapshotReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub mode: OperatingMode,
    pub cycle_phase: CyclePhaseKind,
    pub verdict: Verdict,
    pub selected_recipe: usize,
    pub permit_denied: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Manual,
            cycle_phase: CyclePhaseKind::HomeSeek,
            verdict: Verdict::Continue,
            selected_recipe: 0,
            permit_denied: false,
        }
    }
}

/// Lock-free-to-read handle onto the coordinator's latest published status.
#[derive(Clone)]
pub struct SnapshotReader(Arc<RwLock<StatusSnapshot>>);

impl SnapshotReader {
    pub fn snapshot(&self) -> StatusSnapshot {
        *self.0.read()
    }
}

/// Mutating operations accepted from outside the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    SelectMode(usize),
    SelectManual(bool),
    PressStart,
    PressStop,
    Reset,
}

/// Cloneable handle for enqueuing coordinator commands from any thread.
///
/// Every operation enqueues onto the bounded channel and returns once the
/// command is accepted, not once it has taken physical effect — except
/// [`CommandHandle::emergency_stop`], which bypasses the queue and sets a
/// shared atomic flag directly (see the module docs).
#[derive(Clone)]
pub struct CommandHandle {
    tx: SyncSender<Command>,
    emergency_stop: Arc<AtomicBool>,
}

/// Command could not be enqueued: the bounded channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("command queue full")]
pub struct QueueFullError;

impl CommandHandle {
    fn send(&self, command: Command) -> Result<(), QueueFullError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => QueueFullError,
            TrySendError::Disconnected(_) => QueueFullError,
        })
    }

    /// Select drilling recipe `m` (0-based). Rejected by the control loop
    /// (logged, not applied) if a cycle is currently running.
    pub fn select_mode(&self, m: usize) -> Result<(), QueueFullError> {
        self.send(Command::SelectMode(m))
    }

    /// Enter (`true`) or exit (`false`) manual mode. Rejected if a cycle is
    /// currently running.
    pub fn select_manual(&self, enable: bool) -> Result<(), QueueFullError> {
        self.send(Command::SelectManual(enable))
    }

    /// Equivalent to a Start button rising edge.
    pub fn press_start_virtual(&self) -> Result<(), QueueFullError> {
        self.send(Command::PressStart)
    }

    /// Equivalent to a Stop button rising edge.
    pub fn press_stop_virtual(&self) -> Result<(), QueueFullError> {
        self.send(Command::PressStop)
    }

    /// Equivalent to a Reset button rising edge — aborts any running cycle.
    pub fn reset_virtual(&self) -> Result<(), QueueFullError> {
        self.send(Command::Reset)
    }

    /// Disable both axes immediately. Bypasses the command queue: sets a
    /// shared flag the control task checks and clears unconditionally at
    /// the top of its next tick, ahead of every queued command.
    pub fn emergency_stop(&self) {
        self.emergency_stop.store(true, Ordering::SeqCst);
    }
}

/// Top-level per-cycle driver: samples inputs, evaluates safety, drains
/// pending commands, and hands control to either the automatic cycle or
/// the manual controller.
pub struct Coordinator {
    input: InputSampler,
    safety: SafetySupervisor,
    cycle: CycleStateMachine,
    manual: ManualController,
    mode: OperatingMode,
    previous: InputSnapshot,
    selected_recipe: usize,
    permit_denied: bool,
    command_rx: Receiver<Command>,
    command_tx: SyncSender<Command>,
    emergency_stop: Arc<AtomicBool>,
    snapshot: Arc<RwLock<StatusSnapshot>>,
    permit: Box<dyn PermitSource>,
    display: Box<dyn DisplaySink>,
    virtual_start: bool,
    virtual_stop: bool,
    virtual_reset: bool,
    home_find_started: bool,
}

impl Coordinator {
    pub fn new(config: &DrillConfig, recipe_index: usize) -> Result<Self, CoreError> {
        config.validate()?;
        let mode_params = *config
            .mode(recipe_index)
            .ok_or_else(|| CoreError::RtSetup(format!("no such drilling recipe index {recipe_index}")))?;

        let debounce_us = DEBOUNCE_MS.saturating_mul(1000);
        let input = InputSampler::new(
            config.pins,
            debounce_us,
            config.constants.joystick_low_threshold,
            config.constants.joystick_high_threshold,
        );

        let cycle_linear = PulseEngine::new(
            config.pins.linear_step,
            config.pins.linear_dir,
            config.constants.linear_direction_invert,
        );
        let cycle_drill = PulseEngine::new(
            config.pins.drill_step,
            config.pins.drill_dir,
            config.constants.drill_direction_invert,
        );
        let cycle = CycleStateMachine::new(mode_params, &config.constants, cycle_linear, cycle_drill);

        let manual_linear = PulseEngine::new(
            config.pins.linear_step,
            config.pins.linear_dir,
            config.constants.linear_direction_invert,
        );
        let manual_drill = PulseEngine::new(
            config.pins.drill_step,
            config.pins.drill_dir,
            config.constants.drill_direction_invert,
        );
        let manual = ManualController::new(
            manual_linear,
            manual_drill,
            config.constants.manual_velocity_slow_us,
            config.constants.manual_velocity_fast_us,
            config.constants.joystick_low_threshold,
            config.constants.joystick_high_threshold,
            config.constants.limit_rebound_steps,
            config.constants.limit_rebound_half_period_us,
            drillctl_common::consts::DRILL_TOGGLE_DEBOUNCE_MS.saturating_mul(1000),
        );

        let (command_tx, command_rx) = mpsc::sync_channel(drillctl_common::consts::COMMAND_QUEUE_CAPACITY);

        Ok(Self {
            input,
            safety: SafetySupervisor::new(config.constants.pause_resume_delay_ms.saturating_mul(1000)),
            cycle,
            manual,
            mode: OperatingMode::Manual,
            previous: NEUTRAL_SNAPSHOT,
            selected_recipe: recipe_index,
            permit_denied: false,
            command_rx,
            command_tx,
            emergency_stop: Arc::new(AtomicBool::new(false)),
            snapshot: Arc::new(RwLock::new(StatusSnapshot {
                selected_recipe: recipe_index,
                ..StatusSnapshot::default()
            })),
            permit: Box::new(AlwaysPermit),
            display: Box::new(NullDisplaySink),
            virtual_start: false,
            virtual_stop: false,
            virtual_reset: false,
            home_find_started: false,
        })
    }

    /// Swap in a non-default permit source (an external lockout collaborator).
    pub fn set_permit_source(&mut self, permit: Box<dyn PermitSource>) {
        self.permit = permit;
    }

    /// Swap in a non-default display sink (a physical status display).
    pub fn set_display_sink(&mut self, display: Box<dyn DisplaySink>) {
        self.display = display;
    }

    /// A cloneable handle other threads use to enqueue commands.
    pub fn command_handle(&self) -> CommandHandle {
        CommandHandle {
            tx: self.command_tx.clone(),
            emergency_stop: self.emergency_stop.clone(),
        }
    }

    /// A cloneable handle other threads use to read the published status.
    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader(self.snapshot.clone())
    }

    /// Called by the runtime when the GPIO backend itself reports a failure
    /// the safety supervisor has no direct visibility into.
    pub fn force_abort(&mut self) {
        self.safety.force_abort();
    }

    /// Whether a mode/recipe change is safe to apply right now — rejected
    /// only while a cut is actually in progress, not during homing or a
    /// load/unload wait.
    fn cycle_is_idle(&self) -> bool {
        !matches!(
            self.cycle.phase_kind(),
            CyclePhaseKind::Warmup | CyclePhaseKind::Cycle1 | CyclePhaseKind::Intermediate | CyclePhaseKind::Cycle2
        )
    }

    /// Drain queued commands. Commands that can't be honored right now
    /// (e.g. a mode change mid-cut) are logged and dropped rather than
    /// queued for later — the operator is expected to retry. Emergency
    /// stop does not flow through here at all; see `tick`.
    fn drain_commands(&mut self) {
        let pending: Vec<Command> = self.command_rx.try_iter().collect();

        for command in pending {
            match command {
                Command::SelectMode(m) => {
                    if self.cycle_is_idle() {
                        self.selected_recipe = m;
                        info!(recipe = m, "drilling recipe selected");
                    } else {
                        warn!(recipe = m, "select_mode rejected: cycle busy");
                    }
                }
                Command::SelectManual(enable) => {
                    if self.cycle_is_idle() {
                        self.mode = if enable { OperatingMode::Manual } else { OperatingMode::Automatic };
                    } else {
                        warn!("select_manual rejected: cycle busy");
                    }
                }
                Command::PressStart => self.virtual_start = true,
                Command::PressStop => self.virtual_stop = true,
                Command::Reset => self.virtual_reset = true,
            }
        }
    }

    /// Advance by one control-loop cycle.
    pub fn tick(&mut self, gpio: &mut dyn Gpio, now_us: u64) -> Result<StatusSnapshot, CoreError> {
        if self.emergency_stop.swap(false, Ordering::SeqCst) {
            self.cycle.force_idle();
            self.manual.force_idle();
            info!("emergency stop flag observed, axes disabled");
        }

        if !self.home_find_started {
            self.home_find_started = true;
            self.cycle.restart_home_find(gpio, now_us)?;
        }

        self.drain_commands();

        let mut snapshot = self.input.sample(gpio, now_us)?;
        if self.virtual_start {
            snapshot.btn_start = true;
            self.virtual_start = false;
        }
        if self.virtual_stop {
            snapshot.btn_stop = true;
            self.virtual_stop = false;
        }
        if self.virtual_reset {
            snapshot.btn_reset = true;
            self.virtual_reset = false;
        }

        let verdict = self.safety.tick(&snapshot, &self.previous, now_us);

        if verdict == Verdict::Abort {
            self.cycle.restart_home_find(gpio, now_us)?;
        }

        let start_edge = snapshot.start_rising_edge(&self.previous);

        match self.mode {
            OperatingMode::Manual => {
                if verdict == Verdict::Continue {
                    self.manual.tick(
                        gpio,
                        &snapshot,
                        &self.previous,
                        snapshot.limit_home,
                        snapshot.limit_final,
                        now_us,
                    )?;
                }
                self.display.write_line(MSG_LOAD_WORKPIECE);
            }
            OperatingMode::Automatic => {
                if verdict == Verdict::Continue {
                    if start_edge && self.cycle.phase_kind() == CyclePhaseKind::ReadyForCycle {
                        if self.permit.is_permitted() {
                            self.permit_denied = false;
                            self.cycle.start_cycle(gpio, now_us)?;
                        } else {
                            self.permit_denied = true;
                            warn!("cycle start refused: operation permit denied");
                        }
                    }
                    if self.cycle.tick(gpio, snapshot.limit_home, now_us)? == crate::cycle::CycleStatus::HomingFailed {
                        warn!("home-find did not find the home limit switch within budget");
                    }
                } else {
                    self.display.write_line(MSG_PAUSED);
                }

                match self.cycle.phase_kind() {
                    CyclePhaseKind::ReadyForCycle => self.display.write_line(MSG_LOAD_WORKPIECE),
                    CyclePhaseKind::UnloadWait => self.display.write_line(MSG_UNLOAD),
                    _ => {}
                }
            }
        }

        self.previous = snapshot;

        let status = StatusSnapshot {
            mode: self.mode,
            cycle_phase: self.cycle.phase_kind(),
            verdict,
            selected_recipe: self.selected_recipe,
            permit_denied: self.permit_denied,
        };
        *self.snapshot.write() = status;
        Ok(status)
    }
}
