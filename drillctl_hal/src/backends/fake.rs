//! In-process fake GPIO backend for unit and integration tests.
//!
//! Mirrors the teacher's `IOSimulator`: plain in-memory channel maps with
//! test-only setters, no timing simulation or linked reactions — the state
//! machine under test drives its own clock.

use crate::error::GpioError;
use crate::gpio::Gpio;
use std::collections::HashMap;
use std::time::Instant;

/// In-memory GPIO backend. Digital/analog channels default to `false`/`0`
/// until explicitly set via [`FakeGpio::set_digital`] / [`FakeGpio::set_analog`].
pub struct FakeGpio {
    digital_in: HashMap<u32, bool>,
    digital_out: HashMap<u32, bool>,
    analog_in: HashMap<u32, u16>,
    epoch: Instant,
}

impl FakeGpio {
    pub fn new() -> Self {
        Self {
            digital_in: HashMap::new(),
            digital_out: HashMap::new(),
            analog_in: HashMap::new(),
            epoch: Instant::now(),
        }
    }

    /// Drive a digital input channel, as a test harness would toggle a switch.
    pub fn set_digital(&mut self, channel: u32, level: bool) {
        self.digital_in.insert(channel, level);
    }

    /// Drive an analog input channel, as a test harness would move a joystick.
    pub fn set_analog(&mut self, channel: u32, value: u16) {
        self.analog_in.insert(channel, value);
    }

    /// Inspect the last value written to a digital output channel.
    pub fn get_output(&self, channel: u32) -> bool {
        self.digital_out.get(&channel).copied().unwrap_or(false)
    }
}

impl Default for FakeGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpio for FakeGpio {
    fn read_digital(&mut self, channel: u32) -> Result<bool, GpioError> {
        Ok(self.digital_in.get(&channel).copied().unwrap_or(false))
    }

    fn write_digital(&mut self, channel: u32, level: bool) -> Result<(), GpioError> {
        self.digital_out.insert(channel, level);
        Ok(())
    }

    fn read_analog(&mut self, channel: u32) -> Result<u16, GpioError> {
        Ok(self.analog_in.get(&channel).copied().unwrap_or(0))
    }

    fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_digital_input_reads_false() {
        let mut gpio = FakeGpio::new();
        assert_eq!(gpio.read_digital(3).unwrap(), false);
    }

    #[test]
    fn set_digital_round_trips() {
        let mut gpio = FakeGpio::new();
        gpio.set_digital(3, true);
        assert_eq!(gpio.read_digital(3).unwrap(), true);
    }

    #[test]
    fn write_digital_is_observable() {
        let mut gpio = FakeGpio::new();
        gpio.write_digital(7, true).unwrap();
        assert!(gpio.get_output(7));
        gpio.write_digital(7, false).unwrap();
        assert!(!gpio.get_output(7));
    }

    #[test]
    fn analog_defaults_to_zero() {
        let mut gpio = FakeGpio::new();
        assert_eq!(gpio.read_analog(0).unwrap(), 0);
        gpio.set_analog(0, 512);
        assert_eq!(gpio.read_analog(0).unwrap(), 512);
    }

    #[test]
    fn clock_is_monotonic() {
        let gpio = FakeGpio::new();
        let t1 = gpio.now_micros();
        let t2 = gpio.now_micros();
        assert!(t2 >= t1);
    }
}
