//! Environment variable overrides.
//!
//! Hosted deployments configure the client purely through the environment,
//! so these take precedence over `config.ron` but yield to CLI flags.

use crate::Config;
use crate::error::ConfigError;

/// Player name.
pub const ENV_USERNAME: &str = "BOT_USERNAME";
/// Server host.
pub const ENV_SERVER: &str = "SERVER_IP";
/// Server port.
pub const ENV_PORT: &str = "SERVER_PORT";
/// Optional credential material.
pub const ENV_PASSWORD: &str = "BOT_PASSWORD";
/// Protocol version string.
pub const ENV_VERSION: &str = "BOT_VERSION";

impl Config {
    /// Apply environment overrides, using `lookup` to resolve variable names.
    /// The binary passes `std::env::var`; tests pass a map.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(username) = get(ENV_USERNAME) {
            self.server.username = username;
        }
        if let Some(host) = get(ENV_SERVER) {
            self.server.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(credential) = get(ENV_PASSWORD) {
            self.server.credential = Some(credential);
        }
        if let Some(version) = get(ENV_VERSION) {
            self.server.protocol_version = version;
        }
        Ok(())
    }
}
