//! Registry of pluggable GPIO backend factories.
//!
//! Constructed at startup, populated via [`GpioRegistry::register`], and
//! resolved once by name from configuration. No global state — testable in
//! isolation.

use crate::error::GpioError;
use crate::gpio::Gpio;
use std::collections::HashMap;

/// Constructs a boxed [`Gpio`] backend. Factories take no arguments — any
/// backend-specific configuration (HTTP base URL, chip select) is read from
/// environment or baked in by the registration site.
pub type GpioFactory = fn() -> Box<dyn Gpio>;

/// Registry of available GPIO backends.
pub struct GpioRegistry {
    factories: HashMap<&'static str, GpioFactory>,
}

impl GpioRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: GpioFactory) {
        if self.factories.contains_key(name) {
            panic!("GPIO backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a backend instance by name.
    pub fn create(&self, name: &str) -> Result<Box<dyn Gpio>, GpioError> {
        let factory = self
            .factories
            .get(name)
            .copied()
            .ok_or_else(|| GpioError::BackendNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered backend names.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for GpioRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every backend compiled into this binary.
///
/// `hardware` is only registered when the `hardware` feature is enabled,
/// since it depends on `rppal` and a Raspberry Pi GPIO chip being present.
pub fn register_all_backends(registry: &mut GpioRegistry) {
    registry.register("fake", || Box::new(crate::backends::fake::FakeGpio::new()));
    registry.register("http-sim", || {
        Box::new(crate::backends::http_sim::HttpSimGpio::from_env())
    });
    #[cfg(feature = "hardware")]
    registry.register("hardware", || {
        Box::new(
            crate::backends::hardware::RppalGpio::new()
                .expect("failed to initialize rppal GPIO chip"),
        )
    });
}
