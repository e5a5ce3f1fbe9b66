//! Wire message types and serialization.
//!
//! All messages are serialized with [`postcard`] and prefixed with a protocol
//! version byte. Use [`serialize_message`] and [`deserialize_message`] for
//! encoding/decoding.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Logout reason sent on a graceful close.
pub const QUIT_REASON: &str = "disconnect.quitting";

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Top-level network message. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Message {
    // --- Login ---
    /// Client requests to join with a player name.
    LoginRequest(LoginRequest),
    /// Server accepts or rejects the login.
    LoginResponse(LoginResponse),
    /// Client leaves voluntarily.
    Logout(Logout),

    // --- Position ---
    /// Server-authoritative position push that must be acknowledged.
    PositionSync(PositionSync),
    /// Client acknowledges a [`PositionSync`], echoing token and coordinates.
    SyncAck(SyncAck),
    /// Client re-announces its current position.
    PositionUpdate(PositionUpdate),

    // --- Termination ---
    /// Server closes the session with a reason.
    Disconnect(Disconnect),
    /// Server removes the player with a reason.
    Kick(Kick),

    // --- System ---
    /// Server keep-alive probe. The client must answer with a [`Pong`].
    Ping(Ping),
    /// Client answer to a [`Ping`].
    Pong(Pong),
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// Opaque identifier correlating a [`PositionSync`] with its [`SyncAck`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(pub String);

impl SyncToken {
    /// Borrow the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SyncToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// World position and orientation of the player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// World X coordinate.
    pub x: f64,
    /// World Y coordinate (height).
    pub y: f64,
    /// World Z coordinate.
    pub z: f64,
    /// Horizontal rotation in degrees.
    pub yaw: f32,
    /// Vertical rotation in degrees.
    pub pitch: f32,
    /// Whether the player stands on a block.
    pub on_ground: bool,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 72.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
        }
    }
}

impl Position {
    /// True if every coordinate and angle is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && self.yaw.is_finite()
            && self.pitch.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Client login request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    /// Player name.
    pub username: String,
    /// Random per-connection client identifier.
    pub client_id: u128,
    /// Protocol version string the client speaks.
    pub protocol_version: String,
    /// Optional credential material.
    pub credential: Option<String>,
    /// Client locale.
    pub locale: String,
    /// Requested view distance in chunks.
    pub view_distance: u8,
}

/// Server login response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    /// Assigned entity identifier (0 when rejected).
    pub entity_id: u64,
    /// Whether the login succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// Logout notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Logout {
    /// Reason for leaving.
    pub reason: String,
}

/// Server position push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSync {
    /// Token the acknowledgement must echo.
    pub token: SyncToken,
    /// Authoritative position.
    pub position: Position,
}

/// Acknowledgement of a [`PositionSync`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncAck {
    /// Echoed token.
    pub token: SyncToken,
    /// Echoed position.
    pub position: Position,
}

/// Periodic position re-announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionUpdate {
    /// Current believed position.
    pub position: Position,
}

/// Server-initiated disconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Disconnect {
    /// Reason text.
    pub reason: String,
}

/// Server-initiated kick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Kick {
    /// Reason text.
    pub reason: String,
}

/// Keep-alive probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ping {
    /// Probe identifier to echo.
    pub id: u64,
}

/// Keep-alive answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pong {
    /// Echoed probe identifier.
    pub id: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during message deserialization.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard deserialization failed.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a [`Message`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded Message]`
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`Message`].
pub fn deserialize_message(data: &[u8]) -> Result<Message, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}
