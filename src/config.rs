// src/config.rs

//! Manages client configuration: loading, resolving overrides, and validation.

use crate::core::operation::DEFAULT_IDLE_TIMEOUT;
use crate::core::pool::DEFAULT_CONNECT_TIMEOUT;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Environment variable that overrides the token from the config file.
pub const TOKEN_ENV_VAR: &str = "BIFROST_TOKEN";

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    endpoint: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    idle_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    connect_timeout: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}
fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}
fn default_endpoint() -> Url {
    Url::parse("ws://127.0.0.1:8080/cfe").expect("static endpoint URL is valid")
}

/// Represents the final, validated, and resolved client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Base WebSocket URL of the CFE; token and engine type are appended per connection.
    pub endpoint: Url,
    /// Session token sent as the `xr-token` query parameter.
    #[serde(skip_serializing)]
    pub token: String,
    pub log_level: String,
    /// Silence after which an operation gives up and closes its connection.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: String::new(),
            log_level: default_log_level(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents, std::env::var(TOKEN_ENV_VAR).ok())
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates TOML text. `token_override` wins over the file's token.
    pub fn from_toml_str(contents: &str, token_override: Option<String>) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;

        let endpoint = Url::parse(&raw_config.endpoint)
            .with_context(|| format!("Invalid endpoint URL '{}'", raw_config.endpoint))?;

        let token = match token_override {
            Some(token) => {
                info!("Using session token from {TOKEN_ENV_VAR}.");
                token
            }
            None => raw_config.token.unwrap_or_default(),
        };

        let config = Config {
            endpoint,
            token,
            log_level: raw_config.log_level,
            idle_timeout: raw_config.idle_timeout,
            connect_timeout: raw_config.connect_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        match self.endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(anyhow!(
                    "endpoint scheme must be 'ws' or 'wss', got '{other}'"
                ));
            }
        }
        if self.endpoint.host_str().is_none_or(|h| h.trim().is_empty()) {
            return Err(anyhow!("endpoint must have a host"));
        }
        if self.token.trim().is_empty() {
            return Err(anyhow!(
                "token cannot be empty (set it in the config file or via {TOKEN_ENV_VAR})"
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(anyhow!("idle_timeout cannot be 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }
        if self.idle_timeout < Duration::from_secs(10) {
            warn!(
                "low idle_timeout setting: {:?}. Long-running formulations may be cut off.",
                self.idle_timeout
            );
        }
        if self.endpoint.scheme() == "ws"
            && !matches!(self.endpoint.host_str(), Some("localhost" | "127.0.0.1" | "::1"))
        {
            warn!(
                "endpoint '{}' is not encrypted; the session token travels in clear text.",
                self.endpoint
            );
        }
        Ok(())
    }
}
