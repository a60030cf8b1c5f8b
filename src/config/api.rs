//! Trading API endpoint configuration
//!
//! Resolution order, highest priority first:
//! 1. `FINAM_API_URL` / `FINAM_REQUEST_TIMEOUT_MS` environment variables
//! 2. Values from the JSON config file
//! 3. Built-in defaults (production Finam TradeAPI)
//!
//! # Examples
//!
//! ```bash
//! # Point the assistant at a sandbox gateway with a tighter timeout
//! export FINAM_API_URL="https://sandbox.example.org"
//! export FINAM_REQUEST_TIMEOUT_MS=3000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{Error, Result};

/// Public Finam TradeAPI host
pub const DEFAULT_BASE_URL: &str = "https://api.finam.ru";

/// Environment variable names
pub(crate) mod env_vars {
    pub const API_URL: &str = "FINAM_API_URL";
    pub const REQUEST_TIMEOUT_MS: &str = "FINAM_REQUEST_TIMEOUT_MS";
}

/// Upstream trading API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL without the `/v1` prefix
    pub base_url: String,
    /// Upper bound for a single outbound call (auth or trading)
    pub request_timeout_ms: u64,
    /// Upper bound for establishing a TCP/TLS connection
    pub connect_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl ApiConfig {
    /// Apply environment overrides on top of the current values
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(env_vars::API_URL) {
            tracing::debug!("Using FINAM_API_URL for trading API base URL");
            self.base_url = url;
        }
        if let Ok(raw) = std::env::var(env_vars::REQUEST_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(e) => tracing::warn!(
                    value = %raw,
                    error = %e,
                    "Ignoring malformed FINAM_REQUEST_TIMEOUT_MS"
                ),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parsed base URL
    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))
    }

    /// Join an API path (e.g. `/v1/assets`) onto the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base()?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.base()?;
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = ApiConfig {
            base_url: "https://api.finam.ru/".to_string(),
            ..ApiConfig::default()
        };
        let url = config.endpoint("/v1/instruments/SBER@MISX/quotes/latest").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.finam.ru/v1/instruments/SBER@MISX/quotes/latest"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            ..ApiConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ApiConfig {
            request_timeout_ms: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
