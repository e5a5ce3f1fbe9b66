//! Configuration system for Vigil.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! process environment and from command-line flags, in that order.
//! [`Config::validate`] enforces the startup preconditions (a non-empty
//! identity, a usable port, a sane reconnect policy).

mod cli;
mod config;
mod env;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, KeepAliveConfig, LogConfig, ReconnectConfig, ServerConfig, default_config_dir,
};
pub use env::{ENV_PASSWORD, ENV_PORT, ENV_SERVER, ENV_USERNAME, ENV_VERSION};
pub use error::ConfigError;
