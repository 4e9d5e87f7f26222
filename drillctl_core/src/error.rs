//! Top-level error type for the control core.

use drillctl_common::config::ConfigError;
use drillctl_hal::GpioError;
use thiserror::Error;

/// Errors that can abort startup or the control loop.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("real-time setup failed: {0}")]
    RtSetup(String),

    #[error("cycle overrun: {actual_us}us > {budget_us}us budget")]
    CycleOverrun { actual_us: u64, budget_us: u64 },
}
