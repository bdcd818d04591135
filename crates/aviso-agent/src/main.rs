//! aviso relay binary: wires settings, logging, metrics and the server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use aviso_core::AccountId;
use aviso_core::logging::{LogFormat, init_subscriber};
use aviso_settings::{AvisoSettings, load_settings_from_path, settings_path};
use aviso_server::{AvisoServer, Relay, ServerConfig};
use clap::Parser;

/// Real-time notification relay.
#[derive(Parser, Debug)]
#[command(name = "aviso", about = "Real-time notification relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.aviso/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Account that receives new-registration notices.
    #[arg(long)]
    admin_account_id: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer the flags over loaded settings.
    fn apply(&self, settings: &mut AvisoSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(raw) = &self.admin_account_id {
            settings.notifications.admin_account_id = raw
                .parse::<AccountId>()
                .context("invalid --admin-account-id")?;
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(())
    }
}

/// Load settings from `--config` or the default path, then apply the flags.
fn resolve_settings(cli: &Cli) -> Result<AvisoSettings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings)?;
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics_handle = aviso_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let admin = settings.notifications.admin_account_id.clone();
    let relay = Arc::new(Relay::new(admin.clone()));
    let server = AvisoServer::new(ServerConfig::from(&settings.server), relay, metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(%addr, admin_account_id = %admin, "aviso listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server.shutdown().graceful_shutdown(handle, None).await {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!("Shutdown incomplete, exiting with sessions still open");
    }
    Ok(())
}
