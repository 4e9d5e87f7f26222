//! The `Gpio` trait — the single seam between [`drillctl_core`] and physical
//! or simulated I/O.
//!
//! The control loop only ever talks to this trait. Everything downstream of
//! it (real hardware, an HTTP-addressable simulator, or an in-process fake)
//! is swapped in at startup through [`crate::registry::GpioRegistry`].

use crate::error::GpioError;

/// Reads and writes the machine's fixed set of digital and analog channels.
///
/// Channel numbers are the raw pin identifiers from [`drillctl_common::config::PinMap`] —
/// this trait does no role resolution, it is a thin, timing-sensitive boundary.
///
/// # Timing contract
///
/// `now_micros` must be monotonic and cheap enough to call once per pulse
/// half-period (as low as a few hundred microseconds). `read_digital` and
/// `write_digital` are called from the control loop's hot path and must not
/// block for more than a fraction of the shortest configured half-period.
pub trait Gpio: Send {
    /// Read a digital input channel. `true` means the physical contact is
    /// electrically active (post-polarity, pre-debounce).
    fn read_digital(&mut self, channel: u32) -> Result<bool, GpioError>;

    /// Drive a digital output channel.
    fn write_digital(&mut self, channel: u32, level: bool) -> Result<(), GpioError>;

    /// Read an analog input channel as a raw ADC-style value.
    fn read_analog(&mut self, channel: u32) -> Result<u16, GpioError>;

    /// Monotonic time in microseconds since an arbitrary backend-chosen epoch.
    fn now_micros(&self) -> u64;

    /// Backend identifier, used in diagnostics and logs.
    fn name(&self) -> &'static str;
}
