//! Configuration for the trading assistant

pub mod api;

use chrono::TimeDelta;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

pub use api::ApiConfig;

/// Long-lived Finam access secret used to mint session tokens
pub const ACCESS_TOKEN_ENV: &str = "FINAM_ACCESS_TOKEN";

/// Upper bound for the margin and default lifetime (one week)
pub const MAX_TOKEN_POLICY_SECS: u64 = 7 * 24 * 3600;

/// Upper bound for the refresh backoff (one hour)
pub const MAX_REFRESH_BACKOFF_MS: u64 = 3_600_000;

/// Token lifetime policy
///
/// Finam does not document a fixed safety margin, so every value here is
/// explicit configuration rather than a hidden constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    /// A token is treated as expired this many seconds before `expires_at`
    pub safety_margin_secs: u64,
    /// Lifetime assumed when the auth endpoint does not state one
    pub default_lifetime_secs: u64,
    /// After a failed refresh, further attempts fail fast for this long
    pub refresh_backoff_ms: u64,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            safety_margin_secs: 60,
            default_lifetime_secs: 900, // Finam session JWTs live 15 minutes
            refresh_backoff_ms: 2_000,
        }
    }
}

impl TokenPolicy {
    pub fn safety_margin(&self) -> TimeDelta {
        seconds(self.safety_margin_secs)
    }

    pub fn default_lifetime(&self) -> TimeDelta {
        seconds(self.default_lifetime_secs)
    }

    pub fn refresh_backoff(&self) -> Duration {
        Duration::from_millis(self.refresh_backoff_ms)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("safety_margin_secs", self.safety_margin_secs),
            ("default_lifetime_secs", self.default_lifetime_secs),
        ] {
            if value > MAX_TOKEN_POLICY_SECS {
                return Err(Error::Config(format!(
                    "{} ({}) must not exceed {}",
                    name, value, MAX_TOKEN_POLICY_SECS
                )));
            }
        }
        if self.refresh_backoff_ms > MAX_REFRESH_BACKOFF_MS {
            return Err(Error::Config(format!(
                "refresh_backoff_ms ({}) must not exceed {}",
                self.refresh_backoff_ms, MAX_REFRESH_BACKOFF_MS
            )));
        }
        if self.default_lifetime_secs <= self.safety_margin_secs {
            return Err(Error::Config(format!(
                "default_lifetime_secs ({}) must exceed safety_margin_secs ({})",
                self.default_lifetime_secs, self.safety_margin_secs
            )));
        }
        Ok(())
    }
}

/// Saturating seconds-to-`TimeDelta`
fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream endpoint and timeouts
    pub api: ApiConfig,
    /// Session token lifecycle
    pub token: TokenPolicy,
    /// Path to the JSONL tool-call audit log
    pub audit_log_path: Option<String>,
}

impl Config {
    /// Load from a JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content).map_err(|e| {
                    Error::Config(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
            None => Config::default(),
        };
        config.api.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.token.validate()
    }

    /// Read the long-lived access secret from the environment
    pub fn secret_from_env() -> Result<SecretString> {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(secret) if !secret.trim().is_empty() => Ok(SecretString::from(secret)),
            _ => Err(Error::Config(format!(
                "Environment variable {} not set. Required to authenticate with Finam TradeAPI.",
                ACCESS_TOKEN_ENV
            ))),
        }
    }
}
