//! Real Raspberry Pi GPIO backend, built on `rppal`.
//!
//! Compiled only with the `hardware` feature — `rppal` requires a BCM2xxx
//! GPIO chip and fails to initialize on any other platform.

use crate::error::GpioError;
use crate::gpio::Gpio;
use rppal::gpio::{Gpio as RppalChip, InputPin, Level, OutputPin};
use std::collections::HashMap;
use std::time::Instant;

/// GPIO backend driving real pins through `rppal`.
///
/// Pins are opened lazily on first access and cached by channel number —
/// this machine's fixed pin map means every channel used in a run is opened
/// exactly once.
pub struct RppalGpio {
    chip: RppalChip,
    inputs: HashMap<u32, InputPin>,
    outputs: HashMap<u32, OutputPin>,
    epoch: Instant,
}

impl RppalGpio {
    pub fn new() -> Result<Self, GpioError> {
        let chip = RppalChip::new().map_err(|e| GpioError::InitFailed(e.to_string()))?;
        Ok(Self {
            chip,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            epoch: Instant::now(),
        })
    }

    fn input_pin(&mut self, channel: u32) -> Result<&mut InputPin, GpioError> {
        if !self.inputs.contains_key(&channel) {
            let pin = self
                .chip
                .get(channel as u8)
                .map_err(|e| GpioError::CommunicationError(e.to_string()))?
                .into_input();
            self.inputs.insert(channel, pin);
        }
        Ok(self.inputs.get_mut(&channel).expect("just inserted"))
    }

    fn output_pin(&mut self, channel: u32) -> Result<&mut OutputPin, GpioError> {
        if !self.outputs.contains_key(&channel) {
            let pin = self
                .chip
                .get(channel as u8)
                .map_err(|e| GpioError::CommunicationError(e.to_string()))?
                .into_output();
            self.outputs.insert(channel, pin);
        }
        Ok(self.outputs.get_mut(&channel).expect("just inserted"))
    }
}

impl Gpio for RppalGpio {
    fn read_digital(&mut self, channel: u32) -> Result<bool, GpioError> {
        let pin = self.input_pin(channel)?;
        Ok(pin.read() == Level::High)
    }

    fn write_digital(&mut self, channel: u32, level: bool) -> Result<(), GpioError> {
        let pin = self.output_pin(channel)?;
        if level {
            pin.set_high();
        } else {
            pin.set_low();
        }
        Ok(())
    }

    fn read_analog(&mut self, channel: u32) -> Result<u16, GpioError> {
        Err(GpioError::NoSuchAnalogChannel(channel))
    }

    fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn name(&self) -> &'static str {
        "hardware"
    }
}
