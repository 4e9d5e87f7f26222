//! Input sampler — debounced digital reads and joystick banding.

use drillctl_common::config::PinMap;
use drillctl_hal::{Gpio, GpioError};

/// A single debounced digital channel.
///
/// A reading must hold steady for `debounce_us` before it replaces the
/// stable value — this is what keeps switch bounce from registering as a
/// spurious edge on the Start button or a limit switch.
#[derive(Debug, Clone, Copy)]
struct Debouncer {
    stable: bool,
    candidate: bool,
    candidate_since_us: u64,
    debounce_us: u64,
}

impl Debouncer {
    fn new(debounce_us: u64) -> Self {
        Self {
            stable: false,
            candidate: false,
            candidate_since_us: 0,
            debounce_us,
        }
    }

    fn sample(&mut self, raw: bool, now_us: u64) -> bool {
        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since_us = now_us;
        } else if raw != self.stable && now_us.saturating_sub(self.candidate_since_us) >= self.debounce_us {
            self.stable = raw;
        }
        self.stable
    }
}

/// Direction a manual joystick input is commanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickBand {
    TowardHome,
    Neutral,
    TowardFinal,
}

/// One cycle's worth of debounced machine inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSnapshot {
    pub btn_reset: bool,
    pub btn_start: bool,
    pub btn_stop: bool,
    pub btn_drill: bool,
    pub safety_ok: bool,
    pub limit_home: bool,
    pub limit_final: bool,
    pub joystick: JoystickBand,
    /// Raw analog reading behind `joystick`'s banding, kept so a consumer
    /// that needs deflection magnitude (not just direction) doesn't have to
    /// re-read the channel itself.
    pub joystick_raw: u16,
}

impl InputSnapshot {
    /// Whether `other` represents a rising edge on the Start button relative to this snapshot.
    pub fn start_rising_edge(&self, previous: &InputSnapshot) -> bool {
        self.btn_start && !previous.btn_start
    }

    /// Whether `self` represents a rising edge on the manual drill-toggle button.
    pub fn drill_toggle_rising_edge(&self, previous: &InputSnapshot) -> bool {
        self.btn_drill && !previous.btn_drill
    }

    /// Whether `self` represents a rising edge on the Stop button.
    pub fn stop_rising_edge(&self, previous: &InputSnapshot) -> bool {
        self.btn_stop && !previous.btn_stop
    }

    /// Whether `self` represents a rising edge on the Reset button.
    pub fn reset_rising_edge(&self, previous: &InputSnapshot) -> bool {
        self.btn_reset && !previous.btn_reset
    }
}

/// Debounced reader for the machine's fixed input set.
pub struct InputSampler {
    pins: PinMap,
    joystick_low: u16,
    joystick_high: u16,
    btn_reset: Debouncer,
    btn_start: Debouncer,
    btn_stop: Debouncer,
    btn_drill: Debouncer,
    safety_ok: Debouncer,
    limit_home: Debouncer,
    limit_final: Debouncer,
    last: InputSnapshot,
}

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

impl InputSampler {
    pub fn new(pins: PinMap, debounce_us: u64, joystick_low: u16, joystick_high: u16) -> Self {
        Self {
            pins,
            joystick_low,
            joystick_high,
            btn_reset: Debouncer::new(debounce_us),
            btn_start: Debouncer::new(debounce_us),
            btn_stop: Debouncer::new(debounce_us),
            btn_drill: Debouncer::new(debounce_us),
            safety_ok: Debouncer::new(debounce_us),
            limit_home: Debouncer::new(debounce_us),
            limit_final: Debouncer::new(debounce_us),
            last: NEUTRAL_SNAPSHOT,
        }
    }

    /// Read every channel, debounce it, and band the joystick reading.
    pub fn sample(&mut self, gpio: &mut dyn Gpio, now_us: u64) -> Result<InputSnapshot, GpioError> {
        let btn_reset = self
            .btn_reset
            .sample(gpio.read_digital(self.pins.btn_reset)?, now_us);
        let btn_start = self
            .btn_start
            .sample(gpio.read_digital(self.pins.btn_start)?, now_us);
        let btn_stop = self
            .btn_stop
            .sample(gpio.read_digital(self.pins.btn_stop)?, now_us);
        let btn_drill = self
            .btn_drill
            .sample(gpio.read_digital(self.pins.btn_drill)?, now_us);
        let safety_ok = self
            .safety_ok
            .sample(gpio.read_digital(self.pins.safety_interlock)?, now_us);
        let limit_home = self
            .limit_home
            .sample(gpio.read_digital(self.pins.limit_home)?, now_us);
        let limit_final = self
            .limit_final
            .sample(gpio.read_digital(self.pins.limit_final)?, now_us);

        let raw_joystick = gpio.read_analog(self.pins.joystick_channel)?;
        let joystick = if raw_joystick < self.joystick_low {
            JoystickBand::TowardHome
        } else if raw_joystick > self.joystick_high {
            JoystickBand::TowardFinal
        } else {
            JoystickBand::Neutral
        };

        let snapshot = InputSnapshot {
            btn_reset,
            btn_start,
            btn_stop,
            btn_drill,
            safety_ok,
            limit_home,
            limit_final,
            joystick,
            joystick_raw,
        };
        self.last = snapshot;
        Ok(snapshot)
    }

    /// The most recently computed snapshot (for edge detection against the next sample).
    pub fn last(&self) -> InputSnapshot {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drillctl_hal::backends::fake::FakeGpio;

    fn sample_pins() -> PinMap {
        PinMap {
            btn_reset: 1,
            btn_start: 2,
            btn_stop: 3,
            btn_drill: 4,
            safety_interlock: 5,
            limit_home: 6,
            limit_final: 7,
            joystick_channel: 0,
            linear_step: 10,
            linear_dir: 11,
            drill_step: 12,
            drill_dir: 13,
        }
    }

    #[test]
    fn debounce_suppresses_short_glitch() {
        let mut gpio = FakeGpio::new();
        let mut sampler = InputSampler::new(sample_pins(), 100, 352, 652);

        gpio.set_digital(2, true);
        let s1 = sampler.sample(&mut gpio, 0).unwrap();
        assert!(!s1.btn_start); // not yet stable

        gpio.set_digital(2, false);
        let s2 = sampler.sample(&mut gpio, 10).unwrap();
        assert!(!s2.btn_start); // glitch reverted before debounce window elapsed

        gpio.set_digital(2, true);
        let _ = sampler.sample(&mut gpio, 20).unwrap();
        let s3 = sampler.sample(&mut gpio, 200).unwrap();
        assert!(s3.btn_start); // held stable past debounce window
    }

    #[test]
    fn joystick_bands_correctly() {
        let mut gpio = FakeGpio::new();
        let mut sampler = InputSampler::new(sample_pins(), 0, 352, 652);

        gpio.set_analog(0, 100);
        assert_eq!(sampler.sample(&mut gpio, 0).unwrap().joystick, JoystickBand::TowardHome);

        gpio.set_analog(0, 500);
        assert_eq!(sampler.sample(&mut gpio, 0).unwrap().joystick, JoystickBand::Neutral);

        gpio.set_analog(0, 900);
        assert_eq!(sampler.sample(&mut gpio, 0).unwrap().joystick, JoystickBand::TowardFinal);
    }

    #[test]
    fn start_rising_edge_detection() {
        let prev = NEUTRAL_SNAPSHOT;
        let mut cur = NEUTRAL_SNAPSHOT;
        cur.btn_start = true;
        assert!(cur.start_rising_edge(&prev));
        assert!(!prev.start_rising_edge(&cur));
    }
}
