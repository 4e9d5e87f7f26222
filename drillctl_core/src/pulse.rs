//! Pulse engine — step/direction edge generation for one stepper axis.
//!
//! Each axis keeps its own half-period timer and is advanced once per
//! control-loop cycle via [`PulseEngine::tick`]. This lets the linear and
//! drill axes run independent, concurrently-active pulse trains out of a
//! single cooperative loop instead of a dedicated thread per axis — the
//! same discipline the rest of this workspace uses for its RT cycle body.
//!
//! Direction is latched before the first step of a run and never changed
//! mid-burst. Only rising edges on the step line count as steps, so a line
//! left high by a cancelled run is never double-counted on the next one.

use drillctl_hal::{Gpio, GpioError};

/// Logical direction of travel. Meaning is axis-specific — see
/// [`crate::cycle::CycleStateMachine`] for how each axis maps it to motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Result of advancing a pulse run by one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    /// No edge happened this cycle.
    Idle,
    /// A rising edge was emitted; the run is not yet complete.
    RisingEdge,
    /// A rising edge was emitted and it was the last one requested.
    RunComplete,
}

/// Drives one axis's step/dir pin pair, one control-loop cycle at a time.
pub struct PulseEngine {
    step_pin: u32,
    dir_pin: u32,
    direction_invert: bool,
    direction: Option<Direction>,
    level: bool,
    half_period_us: u32,
    next_edge_due_us: u64,
    edges_remaining: u32,
    running: bool,
}

impl PulseEngine {
    pub fn new(step_pin: u32, dir_pin: u32, direction_invert: bool) -> Self {
        Self {
            step_pin,
            dir_pin,
            direction_invert,
            direction: None,
            level: false,
            half_period_us: 0,
            next_edge_due_us: 0,
            edges_remaining: 0,
            running: false,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Half-period currently armed for the running (or most recently run) burst.
    pub fn half_period_us(&self) -> u32 {
        self.half_period_us
    }

    /// Whether a run is currently in progress (edges remain to be emitted).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Rising edges still to be emitted in the current run.
    pub fn edges_remaining(&self) -> u32 {
        self.edges_remaining
    }

    /// Latch direction and arm a new run of `rising_edges` steps at
    /// `half_period_us`. Direction must settle before the caller's next
    /// `tick` — this writes the dir pin immediately.
    pub fn start_run(
        &mut self,
        gpio: &mut dyn Gpio,
        direction: Direction,
        rising_edges: u32,
        half_period_us: u32,
        now_us: u64,
    ) -> Result<(), GpioError> {
        let level = match (direction, self.direction_invert) {
            (Direction::Forward, false) | (Direction::Reverse, true) => true,
            (Direction::Reverse, false) | (Direction::Forward, true) => false,
        };
        gpio.write_digital(self.dir_pin, level)?;
        self.direction = Some(direction);
        self.half_period_us = half_period_us;
        self.edges_remaining = rising_edges;
        self.next_edge_due_us = now_us + half_period_us as u64;
        self.running = rising_edges > 0;
        self.level = false;
        Ok(())
    }

    /// Stop the current run immediately, leaving the step line at its
    /// current level. Remaining edge count is discarded.
    pub fn cancel_run(&mut self) {
        self.running = false;
        self.edges_remaining = 0;
    }

    /// Advance by one control-loop cycle. No-op if no run is active or the
    /// half-period deadline hasn't arrived yet.
    pub fn tick(&mut self, gpio: &mut dyn Gpio, now_us: u64) -> Result<TickEvent, GpioError> {
        if !self.running || now_us < self.next_edge_due_us {
            return Ok(TickEvent::Idle);
        }

        self.next_edge_due_us = now_us + self.half_period_us as u64;
        self.level = !self.level;
        gpio.write_digital(self.step_pin, self.level)?;

        if !self.level {
            // Falling edge — nothing counted.
            return Ok(TickEvent::Idle);
        }

        // Rising edge.
        self.edges_remaining -= 1;
        if self.edges_remaining == 0 {
            self.running = false;
            Ok(TickEvent::RunComplete)
        } else {
            Ok(TickEvent::RisingEdge)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillctl_hal::backends::fake::FakeGpio;

    #[test]
    fn direction_latches_on_start() {
        let mut gpio = FakeGpio::new();
        let mut engine = PulseEngine::new(10, 11, false);
        engine.start_run(&mut gpio, Direction::Forward, 3, 100, 0).unwrap();
        assert_eq!(engine.direction(), Some(Direction::Forward));
        assert!(gpio.get_output(11));
    }

    #[test]
    fn direction_invert_flips_dir_level() {
        let mut gpio = FakeGpio::new();
        let mut engine = PulseEngine::new(10, 11, true);
        engine.start_run(&mut gpio, Direction::Forward, 1, 100, 0).unwrap();
        assert!(!gpio.get_output(11));
    }

    #[test]
    fn run_emits_exact_rising_edge_count() {
        let mut gpio = FakeGpio::new();
        let mut engine = PulseEngine::new(10, 11, false);
        engine.start_run(&mut gpio, Direction::Forward, 2, 100, 0).unwrap();

        let mut rising = 0;
        let mut now = 0u64;
        let mut last_event = TickEvent::Idle;
        for _ in 0..10 {
            now += 50;
            last_event = engine.tick(&mut gpio, now).unwrap();
            if last_event == TickEvent::RisingEdge || last_event == TickEvent::RunComplete {
                rising += 1;
            }
            if last_event == TickEvent::RunComplete {
                break;
            }
        }
        assert_eq!(rising, 2);
        assert_eq!(last_event, TickEvent::RunComplete);
        assert!(!engine.is_running());
    }

    #[test]
    fn idle_before_deadline() {
        let mut gpio = FakeGpio::new();
        let mut engine = PulseEngine::new(10, 11, false);
        engine.start_run(&mut gpio, Direction::Forward, 1, 1000, 0).unwrap();
        assert_eq!(engine.tick(&mut gpio, 10).unwrap(), TickEvent::Idle);
    }

    #[test]
    fn cancel_run_stops_edge_emission() {
        let mut gpio = FakeGpio::new();
        let mut engine = PulseEngine::new(10, 11, false);
        engine.start_run(&mut gpio, Direction::Forward, 5, 10, 0).unwrap();
        engine.cancel_run();
        assert!(!engine.is_running());
        assert_eq!(engine.tick(&mut gpio, 1000).unwrap(), TickEvent::Idle);
    }
}
