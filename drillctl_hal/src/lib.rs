//! # drillctl_hal
//!
//! GPIO abstraction with pluggable backends for the drill-station control
//! workspace.
//!
//! [`gpio::Gpio`] is the single seam between [`drillctl_core`]'s real-time
//! control loop and the outside world. Three backends implement it:
//!
//! - `fake` — in-process, for unit and integration tests
//! - `http-sim` — proxies to an external pin-simulator service over HTTP
//! - `hardware` — real Raspberry Pi GPIO via `rppal` (feature-gated)
//!
//! # Module Structure
//!
//! - [`gpio`] - The `Gpio` trait
//! - [`error`] - `GpioError`
//! - [`registry`] - Backend factory registration and resolution
//! - [`backends`] - Concrete backend implementations

#![deny(warnings)]

pub mod backends;
pub mod error;
pub mod gpio;
pub mod registry;

pub use crate::error::GpioError;
pub use crate::gpio::Gpio;
pub use crate::registry::{register_all_backends, GpioFactory, GpioRegistry};
