//! Configuration error types.

/// Errors that can occur when loading, saving, parsing or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the config file to disk.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    /// Failed to parse RON content.
    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    /// Failed to serialize config to RON.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// No username was configured. This is never retried.
    #[error("no username configured (set server.username, BOT_USERNAME or --username)")]
    MissingIdentity,

    /// The server port is outside 1..=65535.
    #[error("invalid server port {0}: must be between 1 and 65535")]
    InvalidPort(String),

    /// The reconnect policy parameters would allow a zero, shrinking or unbounded delay.
    #[error("invalid reconnect policy: {0}")]
    InvalidReconnect(String),

    /// The keep-alive period is zero.
    #[error("keep-alive period must be greater than zero")]
    InvalidKeepAlive,
}
