//! Settings loading with environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FanoutSettings::default()`]
//! 2. Apply environment variable overrides
//!
//! Each variable has strict parsing rules. Malformed values are logged and
//! ignored, so the layer below stays in effect.

use fanout_logging::LogFormat;
use tracing::{debug, warn};

use crate::types::FanoutSettings;

/// Listener port.
pub const ENV_PORT: &str = "PORT";
/// Upstream WebSocket URL.
pub const ENV_SOURCE: &str = "WS_SOURCE";
/// Listener host.
pub const ENV_HOST: &str = "FANOUT_HOST";
/// Shutdown grace period in milliseconds.
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "FANOUT_SHUTDOWN_TIMEOUT_MS";
/// Default log filter.
pub const ENV_LOG_LEVEL: &str = "FANOUT_LOG_LEVEL";
/// Log format (`compact` or `json`).
pub const ENV_LOG_FORMAT: &str = "FANOUT_LOG_FORMAT";

/// Load settings from defaults and the process environment.
pub fn load_settings() -> FanoutSettings {
    let mut settings = FanoutSettings::default();
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

/// Apply overrides from `lookup` (normally `std::env::var`).
pub fn apply_overrides<F>(settings: &mut FanoutSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = read_string(&lookup, ENV_PORT) {
        match parse_port(&raw) {
            Some(port) => settings.port = Some(port),
            None => warn!(var = ENV_PORT, value = %raw, "ignoring invalid port"),
        }
    }
    if let Some(url) = read_string(&lookup, ENV_SOURCE) {
        settings.source_url = Some(url);
    }
    if let Some(host) = read_string(&lookup, ENV_HOST) {
        settings.host = host;
    }
    if let Some(raw) = read_string(&lookup, ENV_SHUTDOWN_TIMEOUT_MS) {
        match parse_u64_in_range(&raw, 0, 600_000) {
            Some(ms) => settings.shutdown_timeout_ms = ms,
            None => {
                warn!(var = ENV_SHUTDOWN_TIMEOUT_MS, value = %raw, "ignoring invalid timeout");
            }
        }
    }
    if let Some(level) = read_string(&lookup, ENV_LOG_LEVEL) {
        settings.log_level = level;
    }
    if let Some(raw) = read_string(&lookup, ENV_LOG_FORMAT) {
        match raw.parse::<LogFormat>() {
            Ok(format) => settings.log_format = format,
            Err(e) => warn!(var = ENV_LOG_FORMAT, error = %e, "ignoring invalid log format"),
        }
    }
    debug!(?settings, "settings resolved from environment");
}

/// Non-empty, trimmed value for `key`.
fn read_string<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a TCP port. Zero is allowed and means "pick any free port".
pub fn parse_port(val: &str) -> Option<u16> {
    val.trim().parse::<u16>().ok()
}

/// Parse an integer within `[min, max]`.
pub fn parse_u64_in_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}
