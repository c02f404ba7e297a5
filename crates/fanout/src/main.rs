//! # fanout
//!
//! Relay binary: loads settings, initializes logging and runs the relay
//! until the upstream ends or Ctrl-C.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use fanout_logging::LogFormat;
use fanout_server::FanoutServer;
use fanout_settings::FanoutSettings;
use tracing::{error, info};

/// Rebroadcast one upstream `WebSocket` feed to every connected peer.
#[derive(Parser, Debug)]
#[command(name = "fanout", about = "WebSocket fanout relay")]
struct Cli {
    /// Host to bind (overrides `FANOUT_HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to accept peers on (overrides `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Upstream `ws://` or `wss://` URL (overrides `WS_SOURCE`).
    #[arg(long)]
    source: Option<String>,

    /// Milliseconds peers get to flush on shutdown (overrides
    /// `FANOUT_SHUTDOWN_TIMEOUT_MS`).
    #[arg(long)]
    shutdown_timeout_ms: Option<u64>,

    /// Default log filter (overrides `FANOUT_LOG_LEVEL`).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: `compact` or `json` (overrides `FANOUT_LOG_FORMAT`).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply flags on top of the environment layer.
    fn apply(self, settings: &mut FanoutSettings) {
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(port) = self.port {
            settings.port = Some(port);
        }
        if let Some(source) = self.source {
            settings.source_url = Some(source);
        }
        if let Some(ms) = self.shutdown_timeout_ms {
            settings.shutdown_timeout_ms = ms;
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
        if let Some(format) = self.log_format {
            settings.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = fanout_settings::load_settings();
    cli.apply(&mut settings);

    fanout_logging::init_subscriber(&settings.log_level, settings.log_format);
    settings.validate().context("invalid configuration")?;

    let server = FanoutServer::new(settings);
    if let Err(e) = server.run().await {
        error!(error = %e, "relay stopped");
        return Err(e).context("relay failed");
    }

    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_keep_settings() {
        let mut settings = FanoutSettings {
            port: Some(7000),
            source_url: Some("ws://env/feed".into()),
            ..FanoutSettings::default()
        };
        let before = settings.clone();
        Cli::parse_from(["fanout"]).apply(&mut settings);
        assert_eq!(settings, before);
    }

    #[test]
    fn flags_override_environment() {
        let mut settings = FanoutSettings {
            port: Some(7000),
            source_url: Some("ws://env/feed".into()),
            ..FanoutSettings::default()
        };
        Cli::parse_from([
            "fanout",
            "--port",
            "9000",
            "--source",
            "wss://cli/feed",
            "--host",
            "127.0.0.1",
        ])
        .apply(&mut settings);

        assert_eq!(settings.port, Some(9000));
        assert_eq!(settings.source_url.as_deref(), Some("wss://cli/feed"));
        assert_eq!(settings.host, "127.0.0.1");
    }

    #[test]
    fn log_flags() {
        let mut settings = FanoutSettings::default();
        Cli::parse_from(["fanout", "--log-level", "debug", "--log-format", "json"])
            .apply(&mut settings);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn shutdown_timeout_flag() {
        let mut settings = FanoutSettings {
            shutdown_timeout_ms: 5_000,
            ..FanoutSettings::default()
        };
        Cli::parse_from(["fanout", "--shutdown-timeout-ms", "250"]).apply(&mut settings);
        assert_eq!(settings.shutdown_timeout_ms, 250);
        assert!(Cli::try_parse_from(["fanout", "--shutdown-timeout-ms", "-1"]).is_err());
    }

    #[test]
    fn invalid_log_format_rejected() {
        assert!(Cli::try_parse_from(["fanout", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn invalid_port_rejected() {
        assert!(Cli::try_parse_from(["fanout", "--port", "99999"]).is_err());
    }
}
