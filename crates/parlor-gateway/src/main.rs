//! # parlor-gateway
//!
//! Parlor chat gateway binary. Loads settings, wires the event table and the
//! login verifier into the server, and serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parlor_core::logging;
use parlor_server::auth::StaticCredentials;
use parlor_server::config::ServerConfig;
use parlor_server::dispatch::{EventRegistry, handlers};
use parlor_server::server::ParlorServer;
use parlor_settings::ParlorSettings;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Parlor chat gateway.
#[derive(Parser, Debug)]
#[command(name = "parlor-gateway", about = "WebSocket chat gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.parlor/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Only origin allowed to open a WebSocket.
    #[arg(long, conflicts_with = "any_origin")]
    allowed_origin: Option<String>,

    /// Accept WebSocket upgrades from any origin.
    #[arg(long)]
    any_origin: bool,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut ParlorSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(origin) = &self.allowed_origin {
            settings.server.allowed_origin = Some(origin.clone());
        }
        if self.any_origin {
            settings.server.allowed_origin = None;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load(cli: &Cli) -> Result<ParlorSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(parlor_settings::settings_path);
    let mut settings = parlor_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics_handle = match parlor_server::metrics::install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics will be empty");
            parlor_server::metrics::detached_handle()
        }
    };

    let mut events = EventRegistry::new();
    handlers::register_all(&mut events);
    let event_types = events.event_types();

    let credentials = StaticCredentials::from_settings(&settings.auth);
    if credentials.is_empty() {
        tracing::warn!("no users configured under auth.users, every login will be rejected");
    }

    let config = ServerConfig::from_settings(&settings);
    let server = ParlorServer::new(config, events, Arc::new(credentials), metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        origin = server.config().session.allowed_origin.as_deref().unwrap_or("*"),
        events = ?event_types,
        "parlor gateway listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown_gracefully(handle, Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
