//! Safety supervisor — evaluates the safety interlock, Stop button and
//! Reset button every cycle and issues a verdict the cycle state machine
//! must obey.
//!
//! Structured like the stop executor this workspace uses elsewhere: a small
//! phase machine driven by `tick()`. Once a pause latches it stays latched —
//! releasing the Stop button or the interlock level by itself never clears
//! it — the operator must press Start, and the axes stay disabled for a
//! further `pause_resume_delay_us` mechanical settling window after that
//! before the verdict returns to `Continue`. There is no deceleration ramp
//! here — this machine has no velocity feedback to ramp against, so a stop
//! is always an immediate halt of pulse generation.

use crate::input::InputSnapshot;

/// What the cycle state machine must do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No safety condition active — proceed normally.
    Continue,
    /// Safety interlock (guard/gate) open — pulse generation must halt.
    PauseInterlock,
    /// Operator pressed Stop — pulse generation must halt.
    PauseStop,
    /// Reset rising edge (or a forced internal abort) — abandon the cycle
    /// and return to Home-find.
    Abort,
}

/// Internal latch state. `Paused` persists until a Start rising edge is
/// observed; `Resuming` persists until the settling delay elapses, and
/// reports the same verdict it resumed from so the axes stay disabled for
/// the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Paused(Verdict),
    Resuming { deadline_us: u64, verdict: Verdict },
}

/// Per-cycle safety evaluation.
pub struct SafetySupervisor {
    phase: Phase,
    aborted: bool,
    pause_resume_delay_us: u64,
}

impl SafetySupervisor {
    pub fn new(pause_resume_delay_us: u64) -> Self {
        Self {
            phase: Phase::Running,
            aborted: false,
            pause_resume_delay_us,
        }
    }

    /// Force an abort verdict on the next and all subsequent ticks until `reset()`.
    ///
    /// Not one of the documented trigger conditions below — this is an
    /// extension used by the coordinator when a GPIO backend reports a
    /// communication failure the supervisor itself has no visibility into.
    pub fn force_abort(&mut self) {
        self.aborted = true;
    }

    /// Evaluate one cycle's inputs and return the verdict.
    ///
    /// Priority: Abort (forced, or a Reset rising edge) > PauseStop (Stop
    /// rising edge) > PauseInterlock (`!safety_ok`) > Continue. Abort always
    /// wins and drops the latch back to `Running` immediately — recovery is
    /// the cycle state machine re-homing, not an operator Start press. A
    /// pause latches on first detection and only clears through a Start
    /// rising edge followed by `pause_resume_delay_us` of settling time; a
    /// stop or interlock condition reasserted during that settle restarts
    /// the latch.
    pub fn tick(&mut self, snapshot: &InputSnapshot, previous: &InputSnapshot, now_us: u64) -> Verdict {
        if self.aborted || snapshot.reset_rising_edge(previous) {
            self.phase = Phase::Running;
            return Verdict::Abort;
        }

        if snapshot.stop_rising_edge(previous) {
            self.phase = Phase::Paused(Verdict::PauseStop);
        } else if !snapshot.safety_ok {
            self.phase = Phase::Paused(Verdict::PauseInterlock);
        }

        match self.phase {
            Phase::Running => Verdict::Continue,
            Phase::Paused(verdict) => {
                if snapshot.start_rising_edge(previous) {
                    self.phase = Phase::Resuming {
                        deadline_us: now_us + self.pause_resume_delay_us,
                        verdict,
                    };
                }
                verdict
            }
            Phase::Resuming { deadline_us, verdict } => {
                if now_us >= deadline_us {
                    self.phase = Phase::Running;
                    Verdict::Continue
                } else {
                    verdict
                }
            }
        }
    }

    /// Whether the supervisor is currently reporting a pause, a resume
    /// settle, or an abort.
    pub fn is_paused(&self) -> bool {
        !matches!(self.phase, Phase::Running)
    }

    /// Clear a pause/abort condition unconditionally, bypassing the Start
    /// rising edge and settle delay. Used for test setup and forced-abort
    /// recovery, not by the normal resume path.
    pub fn reset(&mut self) {
        self.phase = Phase::Running;
        self.aborted = false;
    }
}
