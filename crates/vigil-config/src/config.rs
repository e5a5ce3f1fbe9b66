//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Remote server and identity settings.
    pub server: ServerConfig,
    /// Retry timing after a lost session.
    pub reconnect: ReconnectConfig,
    /// Periodic position re-announcement.
    pub keepalive: KeepAliveConfig,
    /// Logging settings.
    pub log: LogConfig,
}

/// Connection parameters handed to the session collaborator on every attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server port. Zero is rejected by [`Config::validate`].
    pub port: u16,
    /// Player name presented at login. Mandatory.
    pub username: String,
    /// Optional credential material forwarded with the login request.
    pub credential: Option<String>,
    /// Protocol version string announced at login.
    pub protocol_version: String,
    /// Upper bound on session establishment, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Upper bound on a graceful close, in milliseconds.
    pub close_timeout_ms: u64,
    /// Client locale announced at login.
    pub locale: String,
    /// Requested view distance in chunks.
    pub view_distance: u8,
}

/// Reconnect policy shape and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReconnectConfig {
    /// `delay = min(base * 2^attempt, ceiling)`.
    Exponential {
        /// Delay of the first retry, in milliseconds.
        base_ms: u64,
        /// Upper bound on any delay, in milliseconds.
        ceiling_ms: u64,
    },
    /// Constant delay for `max_attempts` retries, then one long cool-down
    /// after which the attempt counter starts over.
    Fixed {
        /// Delay of each regular retry, in milliseconds.
        delay_ms: u64,
        /// Regular retries before the cool-down.
        max_attempts: u32,
        /// Cool-down delay, in milliseconds.
        cooldown_ms: u64,
    },
}

/// Keep-alive settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Interval between position updates, in milliseconds.
    pub period_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (e.g., "debug", "info", "info,vigil_net=trace").
    pub level: String,
    /// Directory for the JSON log file.
    pub dir: Option<PathBuf>,
    /// Write a JSON log file into `dir` in addition to the console.
    pub json_file: bool,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25565,
            username: String::new(),
            credential: None,
            protocol_version: "1.21.1".to_string(),
            connect_timeout_ms: 90_000,
            close_timeout_ms: 30_000,
            locale: "en_US".to_string(),
            view_distance: 2,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 30_000,
            ceiling_ms: 300_000,
        }
    }
}

impl ReconnectConfig {
    /// The fixed-delay policy with the classic 20 s x 5, then 5 min cool-down.
    pub fn fixed_default() -> Self {
        Self::Fixed {
            delay_ms: 20_000,
            max_attempts: 5,
            cooldown_ms: 300_000,
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json_file: false,
        }
    }
}

impl ServerConfig {
    /// Session establishment timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Graceful close timeout.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl KeepAliveConfig {
    /// Keep-alive tick period.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Platform config directory for Vigil, e.g. `~/.config/vigil` on Linux.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vigil")
}

// --- Validation ---

impl Config {
    /// Check the startup preconditions.
    ///
    /// A missing username is reported as [`ConfigError::MissingIdentity`],
    /// which callers must treat as fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.username.trim().is_empty() {
            return Err(ConfigError::MissingIdentity);
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port.to_string()));
        }
        if self.keepalive.period_ms == 0 {
            return Err(ConfigError::InvalidKeepAlive);
        }
        match self.reconnect {
            ReconnectConfig::Exponential {
                base_ms,
                ceiling_ms,
            } => {
                if base_ms == 0 {
                    return Err(ConfigError::InvalidReconnect(
                        "base_ms must be greater than zero".to_string(),
                    ));
                }
                if ceiling_ms < base_ms {
                    return Err(ConfigError::InvalidReconnect(format!(
                        "ceiling_ms ({ceiling_ms}) is below base_ms ({base_ms})"
                    )));
                }
            }
            ReconnectConfig::Fixed {
                delay_ms,
                max_attempts,
                cooldown_ms,
            } => {
                if delay_ms == 0 {
                    return Err(ConfigError::InvalidReconnect(
                        "delay_ms must be greater than zero".to_string(),
                    ));
                }
                if max_attempts == 0 {
                    return Err(ConfigError::InvalidReconnect(
                        "max_attempts must be at least 1".to_string(),
                    ));
                }
                if cooldown_ms < delay_ms {
                    return Err(ConfigError::InvalidReconnect(format!(
                        "cooldown_ms ({cooldown_ms}) is below delay_ms ({delay_ms})"
                    )));
                }
            }
        }
        Ok(())
    }
}

// --- Load / Save ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.server.username = "AFKBot123".to_string();
        config
    }

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("port: 25565"));
        assert!(ron_str.contains("Exponential"));
        assert!(ron_str.contains("period_ms: 1000"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(server: (username: \"bot\"))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.server.username, "bot");
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.reconnect, ReconnectConfig::default());
        assert_eq!(config.keepalive, KeepAliveConfig::default());
    }

    #[test]
    fn test_fixed_policy_parses() {
        let ron_str =
            "(reconnect: Fixed(delay_ms: 20000, max_attempts: 5, cooldown_ms: 300000))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.reconnect, ReconnectConfig::fixed_default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid();
        config.server.host = "play.example.net".to_string();
        config.reconnect = ReconnectConfig::fixed_default();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_username_is_fatal() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingIdentity)
        ));

        let mut blank = valid();
        blank.server.username = "   ".to_string();
        assert!(matches!(blank.validate(), Err(ConfigError::MissingIdentity)));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = valid();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn test_reconnect_bounds_rejected() {
        let mut config = valid();
        config.reconnect = ReconnectConfig::Exponential {
            base_ms: 0,
            ceiling_ms: 1000,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReconnect(_))
        ));

        config.reconnect = ReconnectConfig::Exponential {
            base_ms: 5000,
            ceiling_ms: 1000,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReconnect(_))
        ));

        config.reconnect = ReconnectConfig::Fixed {
            delay_ms: 20_000,
            max_attempts: 5,
            cooldown_ms: 1000,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidReconnect(_))
        ));
    }

    #[test]
    fn test_zero_keepalive_rejected() {
        let mut config = valid();
        config.keepalive.period_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeepAlive)
        ));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.server.connect_timeout(), Duration::from_secs(90));
        assert_eq!(config.server.close_timeout(), Duration::from_secs(30));
        assert_eq!(config.keepalive.period(), Duration::from_secs(1));
    }
}
