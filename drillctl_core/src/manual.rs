//! Manual controller — joystick-driven jogging of the linear axis and a
//! push-to-toggle drill spindle, used when the coordinator is not running
//! the automatic cycle.
//!
//! The joystick only ever commands the linear axis. Deflection magnitude is
//! carried through from the raw analog reading (`InputSnapshot::joystick_raw`)
//! and mapped linearly from the edge of the neutral band out to full
//! deflection, into `[manual_velocity_slow_us, manual_velocity_fast_us]` —
//! a light nudge just past the threshold jogs slow, full deflection jogs
//! fast, and everything between is monotonic in distance from the band
//! edge. This replaces a fixed two-speed jog with the continuous curve the
//! joystick hardware can actually deliver.

use drillctl_hal::{Gpio, GpioError};

use crate::input::{InputSnapshot, JoystickBand};
use crate::pulse::{Direction, PulseEngine, TickEvent};

/// Drives the linear axis from the joystick and the drill axis from a
/// toggle button while the machine is in manual mode.
pub struct ManualController {
    linear: PulseEngine,
    drill: PulseEngine,
    drill_running: bool,
    manual_velocity_slow_us: u32,
    manual_velocity_fast_us: u32,
    joystick_low: u16,
    joystick_high: u16,
    last_band: JoystickBand,
    limit_rebound_steps: u32,
    limit_rebound_half_period_us: u32,
    rebounding: bool,
    toggle_debounce_us: u64,
    toggle_ignore_until_us: u64,
}

/// Top of the analog joystick's raw reading range (10-bit ADC).
const JOYSTICK_RAW_MAX: u16 = 1023;

/// Number of rising edges armed per jog refresh. Large enough that the
/// controller rarely runs the engine dry at cycle cadence, small enough
/// that a released joystick stops the axis within a few control cycles
/// instead of coasting through a long queued run.
const JOG_REFRESH_EDGES: u32 = 8;

impl ManualController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        linear: PulseEngine,
        drill: PulseEngine,
        manual_velocity_slow_us: u32,
        manual_velocity_fast_us: u32,
        joystick_low: u16,
        joystick_high: u16,
        limit_rebound_steps: u32,
        limit_rebound_half_period_us: u32,
        toggle_debounce_us: u64,
    ) -> Self {
        Self {
            linear,
            drill,
            drill_running: false,
            manual_velocity_slow_us,
            manual_velocity_fast_us,
            joystick_low,
            joystick_high,
            last_band: JoystickBand::Neutral,
            limit_rebound_steps,
            limit_rebound_half_period_us,
            rebounding: false,
            toggle_debounce_us,
            toggle_ignore_until_us: 0,
        }
    }

    /// Half-period for a jog at `raw` with the given `band`, linearly
    /// interpolated from `manual_velocity_slow_us` at the neutral band's
    /// edge to `manual_velocity_fast_us` at full deflection. Monotonic in
    /// raw distance from the band edge.
    fn deflection_half_period_us(&self, raw: u16, band: JoystickBand) -> u32 {
        let (distance, span) = match band {
            JoystickBand::TowardHome => (
                self.joystick_low.saturating_sub(raw) as u32,
                self.joystick_low as u32,
            ),
            JoystickBand::TowardFinal => (
                raw.saturating_sub(self.joystick_high) as u32,
                JOYSTICK_RAW_MAX.saturating_sub(self.joystick_high) as u32,
            ),
            JoystickBand::Neutral => return self.manual_velocity_slow_us,
        };

        if span == 0 {
            return self.manual_velocity_fast_us;
        }

        let frac = (distance as f64 / span as f64).clamp(0.0, 1.0);
        let slow = self.manual_velocity_slow_us as f64;
        let fast = self.manual_velocity_fast_us as f64;
        (slow - frac * (slow - fast)).round() as u32
    }

    /// Advance one control-loop cycle: read the joystick band and drill
    /// toggle edge from `snapshot`/`previous`, and keep the axes moving
    /// accordingly.
    pub fn tick(
        &mut self,
        gpio: &mut dyn Gpio,
        snapshot: &InputSnapshot,
        previous: &InputSnapshot,
        limit_home: bool,
        limit_final: bool,
        now_us: u64,
    ) -> Result<(), GpioError> {
        self.tick_linear(gpio, snapshot, limit_home, limit_final, now_us)?;
        self.tick_drill(gpio, snapshot, previous, now_us)?;
        Ok(())
    }

    fn tick_linear(
        &mut self,
        gpio: &mut dyn Gpio,
        snapshot: &InputSnapshot,
        limit_home: bool,
        limit_final: bool,
        now_us: u64,
    ) -> Result<(), GpioError> {
        if self.rebounding {
            if let TickEvent::RunComplete = self.linear.tick(gpio, now_us)? {
                self.rebounding = false;
                self.linear.cancel_run();
            }
            self.last_band = snapshot.joystick;
            return Ok(());
        }

        let band = snapshot.joystick;

        if band == JoystickBand::Neutral {
            self.linear.cancel_run();
            self.last_band = band;
            return Ok(());
        }

        let blocked = (band == JoystickBand::TowardHome && limit_home)
            || (band == JoystickBand::TowardFinal && limit_final);
        if blocked {
            let rebound_direction = match band {
                JoystickBand::TowardHome => Direction::Forward,
                JoystickBand::TowardFinal => Direction::Reverse,
                JoystickBand::Neutral => unreachable!(),
            };
            self.rebounding = true;
            self.linear.start_run(
                gpio,
                rebound_direction,
                self.limit_rebound_steps,
                self.limit_rebound_half_period_us,
                now_us,
            )?;
            self.linear.tick(gpio, now_us)?;
            self.last_band = band;
            return Ok(());
        }

        let direction = match band {
            JoystickBand::TowardHome => Direction::Reverse,
            JoystickBand::TowardFinal => Direction::Forward,
            JoystickBand::Neutral => unreachable!(),
        };

        let target_half_period = self.deflection_half_period_us(snapshot.joystick_raw, band);
        let direction_changed = band != self.last_band;
        let speed_changed = self.linear.is_running() && self.linear.half_period_us() != target_half_period;
        if direction_changed || speed_changed || !self.linear.is_running() || self.linear.edges_remaining() <= 1 {
            self.linear
                .start_run(gpio, direction, JOG_REFRESH_EDGES, target_half_period, now_us)?;
        }
        self.last_band = band;

        self.linear.tick(gpio, now_us)?;
        Ok(())
    }

    fn tick_drill(
        &mut self,
        gpio: &mut dyn Gpio,
        snapshot: &InputSnapshot,
        previous: &InputSnapshot,
        now_us: u64,
    ) -> Result<(), GpioError> {
        if snapshot.drill_toggle_rising_edge(previous) && now_us >= self.toggle_ignore_until_us {
            self.toggle_ignore_until_us = now_us + self.toggle_debounce_us;
            self.drill_running = !self.drill_running;
            if self.drill_running {
                self.drill
                    .start_run(gpio, Direction::Forward, u32::MAX, self.manual_velocity_fast_us, now_us)?;
            } else {
                self.drill.cancel_run();
            }
        }

        if self.drill_running {
            if let TickEvent::RunComplete = self.drill.tick(gpio, now_us)? {
                // u32::MAX edges should never be exhausted in practice; if it
                // ever is, just keep spinning.
                self.drill_running = true;
                self.drill
                    .start_run(gpio, Direction::Forward, u32::MAX, self.manual_velocity_fast_us, now_us)?;
            }
        }
        Ok(())
    }

    pub fn is_drill_running(&self) -> bool {
        self.drill_running
    }

    /// Cancel both axes immediately, e.g. for an emergency stop.
    pub fn force_idle(&mut self) {
        self.linear.cancel_run();
        self.drill.cancel_run();
        self.drill_running = false;
        self.last_band = JoystickBand::Neutral;
        self.rebounding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillctl_hal::backends::fake::FakeGpio;

    fn neutral() -> InputSnapshot {
        InputSnapshot {
            btn_reset: false,
            btn_start: false,
            btn_stop: false,
            btn_drill: false,
            safety_ok: true,
            limit_home: false,
            limit_final: false,
            joystick: JoystickBand::Neutral,
            joystick_raw: 500,
        }
    }

    fn controller() -> ManualController {
        let linear = PulseEngine::new(10, 11, false);
        let drill = PulseEngine::new(12, 13, false);
        ManualController::new(linear, drill, 4000, 600, 352, 652, 300, 2500, 50_000)
    }

    #[test]
    fn joystick_toward_final_drives_linear_forward() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();
        let mut snap = neutral();
        snap.joystick = JoystickBand::TowardFinal;
        snap.joystick_raw = 900;
        mc.tick(&mut gpio, &snap, &neutral(), false, false, 0).unwrap();
        assert!(mc.linear.is_running());
        assert_eq!(mc.linear.direction(), Some(Direction::Forward));
    }

    #[test]
    fn deflection_further_from_band_edge_jogs_faster() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();

        let mut light = neutral();
        light.joystick = JoystickBand::TowardFinal;
        light.joystick_raw = 660; // just past the 652 threshold
        mc.tick(&mut gpio, &light, &neutral(), false, false, 0).unwrap();
        let light_period = mc.linear.half_period_us();

        let mut full = neutral();
        full.joystick = JoystickBand::TowardFinal;
        full.joystick_raw = 1023; // full deflection
        mc.tick(&mut gpio, &full, &light, false, false, 10).unwrap();
        let full_period = mc.linear.half_period_us();

        // Half-period shrinks (velocity rises) monotonically with deflection.
        assert!(full_period < light_period);
    }

    #[test]
    fn joystick_neutral_stops_linear() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();
        let mut snap = neutral();
        snap.joystick = JoystickBand::TowardFinal;
        mc.tick(&mut gpio, &snap, &neutral(), false, false, 0).unwrap();
        assert!(mc.linear.is_running());

        mc.tick(&mut gpio, &neutral(), &snap, false, false, 10).unwrap();
        assert!(!mc.linear.is_running());
    }

    #[test]
    fn joystick_blocked_by_limit_switch_triggers_rebound() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();
        let mut snap = neutral();
        snap.joystick = JoystickBand::TowardFinal;
        mc.tick(&mut gpio, &snap, &neutral(), false, true, 0).unwrap();
        assert!(mc.rebounding);
        assert_eq!(mc.linear.direction(), Some(Direction::Reverse));

        // Rebound runs to completion even if the stick is released mid-way.
        let mut now = 0u64;
        for _ in 0..2000 {
            now += 2500;
            mc.tick(&mut gpio, &neutral(), &neutral(), false, true, now).unwrap();
            if !mc.rebounding {
                break;
            }
        }
        assert!(!mc.rebounding);
        assert!(!mc.linear.is_running());
    }

    #[test]
    fn drill_toggle_ignored_within_debounce_window() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();
        let prev = neutral();
        let mut pressed = neutral();
        pressed.btn_drill = true;

        mc.tick(&mut gpio, &pressed, &prev, false, false, 0).unwrap();
        assert!(mc.is_drill_running());

        // A release-then-press well inside the 50ms window is ignored.
        let mut released = neutral();
        released.btn_drill = false;
        mc.tick(&mut gpio, &released, &pressed, false, false, 1_000).unwrap();
        mc.tick(&mut gpio, &pressed, &released, false, false, 2_000).unwrap();
        assert!(mc.is_drill_running());

        // Once the window has elapsed, a fresh press toggles it again.
        mc.tick(&mut gpio, &released, &pressed, false, false, 60_000).unwrap();
        mc.tick(&mut gpio, &pressed, &released, false, false, 70_000).unwrap();
        assert!(!mc.is_drill_running());
    }

    #[test]
    fn drill_toggle_starts_and_stops_on_rising_edge() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();
        let prev = neutral();
        let mut pressed = neutral();
        pressed.btn_drill = true;

        mc.tick(&mut gpio, &pressed, &prev, false, false, 0).unwrap();
        assert!(mc.is_drill_running());

        // Holding the button (no new edge) keeps it running.
        mc.tick(&mut gpio, &pressed, &pressed, false, false, 10).unwrap();
        assert!(mc.is_drill_running());

        let mut released = neutral();
        released.btn_drill = false;
        mc.tick(&mut gpio, &released, &pressed, false, false, 20).unwrap();
        assert!(mc.is_drill_running()); // no edge on release, still running

        // A second press, well past the toggle debounce window, flips it back off.
        mc.tick(&mut gpio, &pressed, &released, false, false, 80_000).unwrap();
        assert!(!mc.is_drill_running());
    }

    #[test]
    fn force_idle_cancels_both_axes() {
        let mut gpio = FakeGpio::new();
        let mut mc = controller();
        let mut snap = neutral();
        snap.joystick = JoystickBand::TowardFinal;
        snap.btn_drill = true;
        mc.tick(&mut gpio, &snap, &neutral(), false, false, 0).unwrap();
        assert!(mc.linear.is_running());
        assert!(mc.is_drill_running());

        mc.force_idle();
        assert!(!mc.linear.is_running());
        assert!(!mc.is_drill_running());
    }
}
