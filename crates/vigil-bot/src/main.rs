//! Vigil binary: keeps one player logged in to a game server.
//!
//! Configuration is loaded from `config.ron`, then overridden from the
//! environment (`BOT_USERNAME`, `SERVER_IP`, `SERVER_PORT`, `BOT_PASSWORD`,
//! `BOT_VERSION`) and finally from CLI flags.
//! Run with `cargo run -p vigil-bot -- --username AFKBot123`.

use std::future::Future;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::sync::watch;
use vigil_config::{CliArgs, Config, ConfigError, default_config_dir};
use vigil_net::TcpConnector;
use vigil_presence::{PresenceRuntime, RuntimeSettings};

/// Build the effective config: file, then environment via `lookup`, then CLI.
fn resolve_config<F>(args: &CliArgs, config_dir: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::load_or_create(config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_overrides_from(lookup)?;
    config.apply_cli_overrides(args);
    if config.log.dir.is_none() {
        config.log.dir = Some(config_dir.join("logs"));
    }
    config.validate()?;
    Ok(config)
}

/// Flip `shutdown` once `signal` reports an interrupt. If the handler could
/// not be installed, `shutdown` is held open so the client keeps running.
async fn forward_interrupt<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Interrupt received, shutting down");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            tracing::error!("Failed to listen for ctrl+c: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config_dir: PathBuf = args.config.clone().unwrap_or_else(default_config_dir);

    let config = match resolve_config(&args, &config_dir, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("vigil: {e}");
            std::process::exit(1);
        }
    };

    vigil_log::init_logging(&config.log);
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        username = %config.server.username,
        "Starting presence client"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_interrupt(tokio::signal::ctrl_c(), shutdown_tx));

    let runtime = PresenceRuntime::new(TcpConnector::new(), RuntimeSettings::from(&config));
    runtime.run(shutdown_rx).await;
}
