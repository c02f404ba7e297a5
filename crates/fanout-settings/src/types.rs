//! Settings types.

use std::time::Duration;

use fanout_logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Process configuration for the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutSettings {
    /// Host to bind the peer listener on.
    pub host: String,
    /// Port to bind the peer listener on. Required.
    pub port: Option<u16>,
    /// Upstream WebSocket URL (`ws://` or `wss://`). Required.
    pub source_url: Option<String>,
    /// How long peer writers get to finish during shutdown.
    pub shutdown_timeout_ms: u64,
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: None,
            source_url: None,
            shutdown_timeout_ms: 5_000,
            log_level: "info".into(),
            log_format: LogFormat::Compact,
        }
    }
}

impl FanoutSettings {
    /// Check that every required value is present and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.port.is_none() {
            return Err(SettingsError::Missing("$PORT"));
        }
        let Some(url) = self.source_url.as_deref() else {
            return Err(SettingsError::Missing("$WS_SOURCE"));
        };
        if url.trim().is_empty() {
            return Err(SettingsError::Missing("$WS_SOURCE"));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "source URL must use ws:// or wss://, got {url}"
            )));
        }
        Ok(())
    }

    /// Listener address as `host:port`.
    pub fn listen_addr(&self) -> Result<String> {
        let port = self.port.ok_or(SettingsError::Missing("$PORT"))?;
        Ok(format!("{}:{port}", self.host))
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
