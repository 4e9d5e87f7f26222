//! Configuration types and TOML loading for the drill-station core.
//!
//! Mirrors the workspace's usual `ConfigLoader` pattern: any
//! `serde::de::DeserializeOwned` type gets a blanket `load()` that reads a
//! TOML file and maps I/O and parse failures onto [`ConfigError`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use drillctl_common::config::{ConfigLoader, DrillConfig};
//! use std::path::Path;
//!
//! let config = DrillConfig::load(Path::new("drillctl.toml")).expect("load config");
//! config.validate().expect("valid config");
//! ```

use crate::consts::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Log level for configuration (mirrors `tracing`'s level filter strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// The `tracing_subscriber::EnvFilter` directive for this level.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file not found")]
    FileNotFound,

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for any `DeserializeOwned` type.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Mode parameters ────────────────────────────────────────────────

/// Immutable parameters bound to a selected drilling mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeParams {
    /// Linear steps per reciprocation stroke during Cycle-1.
    pub steps_cycle1: u32,
    /// Linear steps of one-way advance between Cycle-1 and Cycle-2.
    pub steps_intermediate: u32,
    /// Linear steps per reciprocation stroke during Cycle-2.
    pub steps_cycle2: u32,
    /// Spindle revolutions target for Cycle-1.
    pub revolutions_level1: u32,
    /// Spindle revolutions (burst count) target for Cycle-2.
    pub revolutions_level2: u32,
    /// Half-period [µs] between linear-axis pulse edges.
    pub linear_half_period_us: u32,
    /// Half-period [µs] between drill-axis pulse edges.
    pub drill_half_period_us: u32,
}

impl ModeParams {
    /// Validate that every field is in a physically sane range.
    pub fn validate(&self, mode_index: usize) -> Result<(), ConfigError> {
        let ctx = |field: &str| {
            ConfigError::ValidationError(format!("mode[{mode_index}].{field} must be > 0"))
        };
        if self.steps_cycle1 == 0 {
            return Err(ctx("steps_cycle1"));
        }
        if self.steps_cycle2 == 0 {
            return Err(ctx("steps_cycle2"));
        }
        if self.revolutions_level1 == 0 {
            return Err(ctx("revolutions_level1"));
        }
        if self.revolutions_level2 == 0 {
            return Err(ctx("revolutions_level2"));
        }
        if self.linear_half_period_us == 0 {
            return Err(ctx("linear_half_period_us"));
        }
        if self.drill_half_period_us == 0 {
            return Err(ctx("drill_half_period_us"));
        }
        Ok(())
    }
}

// ─── System-wide timing/geometry constants (overridable) ───────────

fn default_home_rebound_steps() -> u32 {
    HOME_REBOUND_STEPS_DEFAULT
}
fn default_limit_rebound_steps() -> u32 {
    LIMIT_REBOUND_STEPS_DEFAULT
}
fn default_limit_rebound_half_period_us() -> u32 {
    LIMIT_REBOUND_HALF_PERIOD_US_DEFAULT
}
fn default_home_half_period_us() -> u32 {
    HOME_HALF_PERIOD_US_DEFAULT
}
fn default_drill_burst_half_period_us() -> u32 {
    DRILL_BURST_HALF_PERIOD_US_DEFAULT
}
fn default_drill_burst_step_edges() -> u32 {
    DRILL_BURST_STEP_EDGES_DEFAULT
}
fn default_spindle_revolutions_cycle2_bursts() -> u32 {
    SPINDLE_REVOLUTIONS_CYCLE2_BURSTS_DEFAULT
}
fn default_pulses_per_spindle_revolution() -> u32 {
    PULSES_PER_SPINDLE_REVOLUTION_DEFAULT
}
fn default_pre_cycle_drill_warmup_ms() -> u64 {
    PRE_CYCLE_DRILL_WARMUP_MS_DEFAULT
}
fn default_pause_resume_delay_ms() -> u64 {
    PAUSE_RESUME_DELAY_MS_DEFAULT
}
fn default_manual_velocity_slow_us() -> u32 {
    MANUAL_VELOCITY_SLOW_US_DEFAULT
}
fn default_manual_velocity_fast_us() -> u32 {
    MANUAL_VELOCITY_FAST_US_DEFAULT
}
fn default_joystick_low_threshold() -> u16 {
    JOYSTICK_LOW_THRESHOLD_DEFAULT
}
fn default_joystick_high_threshold() -> u16 {
    JOYSTICK_HIGH_THRESHOLD_DEFAULT
}

/// System-wide constants, overridable per installation (`[constants]` in TOML).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConstants {
    #[serde(default = "default_home_rebound_steps")]
    pub home_rebound_steps: u32,
    #[serde(default = "default_limit_rebound_steps")]
    pub limit_rebound_steps: u32,
    #[serde(default = "default_limit_rebound_half_period_us")]
    pub limit_rebound_half_period_us: u32,
    #[serde(default = "default_home_half_period_us")]
    pub home_half_period_us: u32,
    #[serde(default = "default_drill_burst_half_period_us")]
    pub drill_burst_half_period_us: u32,
    #[serde(default = "default_drill_burst_step_edges")]
    pub drill_burst_step_edges: u32,
    #[serde(default = "default_spindle_revolutions_cycle2_bursts")]
    pub spindle_revolutions_cycle2_bursts: u32,
    #[serde(default = "default_pulses_per_spindle_revolution")]
    pub pulses_per_spindle_revolution: u32,
    #[serde(default = "default_pre_cycle_drill_warmup_ms")]
    pub pre_cycle_drill_warmup_ms: u64,
    #[serde(default = "default_pause_resume_delay_ms")]
    pub pause_resume_delay_ms: u64,
    #[serde(default = "default_manual_velocity_slow_us")]
    pub manual_velocity_slow_us: u32,
    #[serde(default = "default_manual_velocity_fast_us")]
    pub manual_velocity_fast_us: u32,
    #[serde(default = "default_joystick_low_threshold")]
    pub joystick_low_threshold: u16,
    #[serde(default = "default_joystick_high_threshold")]
    pub joystick_high_threshold: u16,
    /// Invert the logical direction sense of the linear axis output.
    #[serde(default)]
    pub linear_direction_invert: bool,
    /// Invert the logical direction sense of the drill axis output.
    #[serde(default)]
    pub drill_direction_invert: bool,
}

impl Default for SystemConstants {
    fn default() -> Self {
        Self {
            home_rebound_steps: default_home_rebound_steps(),
            limit_rebound_steps: default_limit_rebound_steps(),
            limit_rebound_half_period_us: default_limit_rebound_half_period_us(),
            home_half_period_us: default_home_half_period_us(),
            drill_burst_half_period_us: default_drill_burst_half_period_us(),
            drill_burst_step_edges: default_drill_burst_step_edges(),
            spindle_revolutions_cycle2_bursts: default_spindle_revolutions_cycle2_bursts(),
            pulses_per_spindle_revolution: default_pulses_per_spindle_revolution(),
            pre_cycle_drill_warmup_ms: default_pre_cycle_drill_warmup_ms(),
            pause_resume_delay_ms: default_pause_resume_delay_ms(),
            manual_velocity_slow_us: default_manual_velocity_slow_us(),
            manual_velocity_fast_us: default_manual_velocity_fast_us(),
            joystick_low_threshold: default_joystick_low_threshold(),
            joystick_high_threshold: default_joystick_high_threshold(),
            linear_direction_invert: false,
            drill_direction_invert: false,
        }
    }
}

impl SystemConstants {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.home_rebound_steps == 0 {
            return Err(ConfigError::ValidationError(
                "constants.home_rebound_steps must be > 0".into(),
            ));
        }
        if self.limit_rebound_steps == 0 {
            return Err(ConfigError::ValidationError(
                "constants.limit_rebound_steps must be > 0".into(),
            ));
        }
        if self.pulses_per_spindle_revolution == 0 {
            return Err(ConfigError::ValidationError(
                "constants.pulses_per_spindle_revolution must be > 0".into(),
            ));
        }
        if self.joystick_low_threshold >= self.joystick_high_threshold {
            return Err(ConfigError::ValidationError(format!(
                "constants.joystick_low_threshold ({}) must be < joystick_high_threshold ({})",
                self.joystick_low_threshold, self.joystick_high_threshold
            )));
        }
        if self.manual_velocity_fast_us >= self.manual_velocity_slow_us {
            return Err(ConfigError::ValidationError(
                "constants.manual_velocity_fast_us must be < manual_velocity_slow_us".into(),
            ));
        }
        Ok(())
    }
}

// ─── Pin map ─────────────────────────────────────────────────────────

/// Logical-to-physical pin assignment for the machine's fixed I/O set.
///
/// Unlike a generic bus-oriented I/O registry, this machine has a small,
/// fixed set of named signals — two axes and a handful of buttons/limits —
/// so the map is a flat struct rather than a role-string lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinMap {
    pub btn_reset: u32,
    pub btn_start: u32,
    pub btn_stop: u32,
    pub btn_drill: u32,
    pub safety_interlock: u32,
    pub limit_home: u32,
    pub limit_final: u32,
    pub joystick_channel: u32,
    pub linear_step: u32,
    pub linear_dir: u32,
    pub drill_step: u32,
    pub drill_dir: u32,
}

impl PinMap {
    /// Validate that no physical digital pin is assigned to two roles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let digital = [
            ("btn_reset", self.btn_reset),
            ("btn_start", self.btn_start),
            ("btn_stop", self.btn_stop),
            ("btn_drill", self.btn_drill),
            ("safety_interlock", self.safety_interlock),
            ("limit_home", self.limit_home),
            ("limit_final", self.limit_final),
            ("linear_step", self.linear_step),
            ("linear_dir", self.linear_dir),
            ("drill_step", self.drill_step),
            ("drill_dir", self.drill_dir),
        ];
        for (i, (name_a, pin_a)) in digital.iter().enumerate() {
            for (name_b, pin_b) in &digital[i + 1..] {
                if pin_a == pin_b {
                    return Err(ConfigError::ValidationError(format!(
                        "pins.{name_a} and pins.{name_b} both assigned to pin {pin_a}"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ─── Top-level configuration ─────────────────────────────────────────

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Top-level configuration loaded from `drillctl.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrillConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// GPIO backend to resolve at startup: `"fake"`, `"http-sim"`, `"hardware"`.
    pub gpio_backend: String,
    #[serde(default)]
    pub constants: SystemConstants,
    pub pins: PinMap,
    /// Exactly [`MODE_COUNT`] mode parameter sets, indexed 0..MODE_COUNT.
    pub modes: Vec<ModeParams>,
}

impl DrillConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.constants.validate()?;
        self.pins.validate()?;
        if self.modes.len() != MODE_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "expected exactly {MODE_COUNT} modes, got {}",
                self.modes.len()
            )));
        }
        for (i, mode) in self.modes.iter().enumerate() {
            mode.validate(i)?;
        }
        if self.gpio_backend.is_empty() {
            return Err(ConfigError::ValidationError(
                "gpio_backend must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn mode(&self, index: usize) -> Option<&ModeParams> {
        self.modes.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mode() -> ModeParams {
        ModeParams {
            steps_cycle1: 100,
            steps_intermediate: 50,
            steps_cycle2: 80,
            revolutions_level1: 5,
            revolutions_level2: 3,
            linear_half_period_us: 2000,
            drill_half_period_us: 2200,
        }
    }

    fn sample_config() -> DrillConfig {
        DrillConfig {
            log_level: LogLevel::Info,
            gpio_backend: "fake".to_string(),
            constants: SystemConstants::default(),
            pins: PinMap {
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
            },
            modes: (0..MODE_COUNT).map(|_| sample_mode()).collect(),
        }
    }

    #[test]
    fn log_level_default() {
        assert_eq!(default_log_level(), LogLevel::Info);
    }

    #[test]
    fn mode_params_validate_rejects_zero_steps() {
        let mut mode = sample_mode();
        mode.steps_cycle1 = 0;
        assert!(mode.validate(0).is_err());
    }

    #[test]
    fn system_constants_validate_rejects_bad_joystick_thresholds() {
        let mut c = SystemConstants::default();
        c.joystick_low_threshold = 700;
        c.joystick_high_threshold = 600;
        assert!(c.validate().is_err());
    }

    #[test]
    fn pin_map_validate_rejects_duplicate_pin() {
        let mut cfg = sample_config();
        cfg.pins.btn_start = cfg.pins.btn_reset;
        assert!(cfg.pins.validate().is_err());
    }

    #[test]
    fn drill_config_validate_succeeds_on_sample() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn drill_config_validate_rejects_wrong_mode_count() {
        let mut cfg = sample_config();
        cfg.modes.pop();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_loader_file_not_found() {
        let result = DrillConfig::load(Path::new("/nonexistent/drillctl.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn config_loader_round_trip() {
        let cfg = sample_config();
        let toml_str = toml::to_string(&cfg).unwrap();
        let parsed: DrillConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.modes.len(), MODE_COUNT);
        assert!(parsed.validate().is_ok());
    }
}
