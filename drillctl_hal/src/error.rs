//! Error types for the GPIO abstraction layer.

use thiserror::Error;

/// Errors a [`crate::gpio::Gpio`] backend can report.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("no such digital channel: {0}")]
    NoSuchDigitalChannel(u32),

    #[error("no such analog channel: {0}")]
    NoSuchAnalogChannel(u32),

    #[error("backend initialization failed: {0}")]
    InitFailed(String),

    #[error("backend communication error: {0}")]
    CommunicationError(String),

    #[error("no backend registered under name '{0}'")]
    BackendNotFound(String),
}
