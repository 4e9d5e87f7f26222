//! Prelude module for common re-exports.
//!
//! Lets consumers do `use drillctl_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DrillConfig, ModeParams, PinMap, SystemConstants};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{COMMAND_QUEUE_CAPACITY, CYCLE_TIME_US_DEFAULT, MODE_COUNT};
