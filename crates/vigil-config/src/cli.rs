//! Command-line argument parsing for Vigil.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Vigil command-line arguments.
///
/// CLI values override settings loaded from `config.ron` and the environment.
#[derive(Parser, Debug, Default)]
#[command(name = "vigil", about = "Keeps a player session present on a game server")]
pub struct CliArgs {
    /// Server host.
    #[arg(long)]
    pub host: Option<String>,

    /// Server port.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Player name.
    #[arg(long, short)]
    pub username: Option<String>,

    /// Protocol version announced at login.
    #[arg(long)]
    pub protocol_version: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref username) = args.username {
            self.server.username = username.clone();
        }
        if let Some(ref version) = args.protocol_version {
            self.server.protocol_version = version.clone();
        }
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
    }
}
