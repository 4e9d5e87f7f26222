//! Concrete [`crate::gpio::Gpio`] implementations.

pub mod fake;
pub mod http_sim;

#[cfg(feature = "hardware")]
pub mod hardware;
