//! # skyrelay
//!
//! Session relay binary: loads settings, installs logging and metrics, and
//! serves `/ws`, `/health`, and `/metrics` until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use skyrelay_server::{RelayServer, ServerConfig};
use skyrelay_settings::{LogFormat, RelaySettings};

/// SkyRelay session relay server.
#[derive(Parser, Debug)]
#[command(name = "skyrelay", about = "Relay between a flight-sim producer and remote subscribers")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.skyrelay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `skyrelay_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply CLI flags over loaded settings; flags win.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn init_logging(settings: &RelaySettings) {
    match settings.logging.format {
        LogFormat::Compact => skyrelay_core::logging::init_subscriber(&settings.logging.level),
        LogFormat::Json => skyrelay_core::logging::init_json_subscriber(&settings.logging.level),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(skyrelay_settings::settings_path);
    let mut settings = skyrelay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    init_logging(&settings);
    tracing::info!(path = %settings_path.display(), "settings loaded");

    let metrics_handle = skyrelay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = RelayServer::new(ServerConfig::from_settings(&settings), Some(metrics_handle));
    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!("SkyRelay listening on http://{}", handle.addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server
        .shutdown()
        .graceful_shutdown(handle.into_tasks(), None)
        .await
    {
        tracing::info!("Shutdown complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "skyrelay",
            "--host",
            "127.0.0.1",
            "--port",
            "4000",
            "--config",
            "/etc/skyrelay.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(4000));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/skyrelay.json")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::try_parse_from(["skyrelay", "--port", "0", "--log-level", "warn"]).unwrap();
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn no_flags_keeps_settings() {
        let cli = Cli::try_parse_from(["skyrelay"]).unwrap();
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(Cli::try_parse_from(["skyrelay", "--port", "70000"]).is_err());
    }

    #[test]
    fn settings_file_feeds_server_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 5050}, "sessions": {"accessHint": "Ask the captain"}}"#,
        )
        .unwrap();

        let settings = skyrelay_settings::load_settings_from_path(&path).unwrap();
        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.access_hint, "Ask the captain");
    }
}
