//! HTTP-addressable GPIO simulator backend.
//!
//! Talks to an external process (e.g. a browser-based pin simulator UI,
//! explicitly out of scope for this crate) over a small REST contract:
//!
//! - `GET  {base_url}/digital/{channel}`  -> `{"level": bool}`
//! - `POST {base_url}/digital/{channel}`  body `{"level": bool}`
//! - `GET  {base_url}/analog/{channel}`   -> `{"value": u16}`
//!
//! Every call is a blocking round trip, so this backend is only suitable for
//! the slower manual/test cadences, not the pulse engine's hot path.

use crate::error::GpioError;
use crate::gpio::Gpio;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8088";
const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct DigitalWrite {
    level: bool,
}

#[derive(Debug, Deserialize)]
struct DigitalRead {
    level: bool,
}

#[derive(Debug, Deserialize)]
struct AnalogRead {
    value: u16,
}

/// GPIO backend that proxies reads/writes to an HTTP simulator service.
pub struct HttpSimGpio {
    client: reqwest::blocking::Client,
    base_url: String,
    epoch: Instant,
}

impl HttpSimGpio {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into(),
            epoch: Instant::now(),
        }
    }

    /// Build from `DRILLCTL_SIM_URL`, falling back to the local default.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("DRILLCTL_SIM_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }
}

impl Gpio for HttpSimGpio {
    fn read_digital(&mut self, channel: u32) -> Result<bool, GpioError> {
        let url = format!("{}/digital/{channel}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| GpioError::CommunicationError(e.to_string()))?
            .json::<DigitalRead>()
            .map_err(|e| GpioError::CommunicationError(e.to_string()))?;
        Ok(resp.level)
    }

    fn write_digital(&mut self, channel: u32, level: bool) -> Result<(), GpioError> {
        let url = format!("{}/digital/{channel}", self.base_url);
        self.client
            .post(&url)
            .json(&DigitalWrite { level })
            .send()
            .map_err(|e| GpioError::CommunicationError(e.to_string()))?;
        Ok(())
    }

    fn read_analog(&mut self, channel: u32) -> Result<u16, GpioError> {
        let url = format!("{}/analog/{channel}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| GpioError::CommunicationError(e.to_string()))?
            .json::<AnalogRead>()
            .map_err(|e| GpioError::CommunicationError(e.to_string()))?;
        Ok(resp.value)
    }

    fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn name(&self) -> &'static str {
        "http-sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_falls_back_to_default() {
        std::env::remove_var("DRILLCTL_SIM_URL");
        let backend = HttpSimGpio::from_env();
        assert_eq!(backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn name_is_http_sim() {
        let backend = HttpSimGpio::new("http://localhost:9");
        assert_eq!(backend.name(), "http-sim");
    }
}
