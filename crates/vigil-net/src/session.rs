//! Session handle contract between the presence controller and a protocol
//! implementation.
//!
//! A [`Connector`] opens sessions; each [`Session`] accepts outbound messages
//! and reports what happens on the wire as [`SessionEvent`]s through the
//! [`EventSink`] it was opened with. Every event is tagged with the generation
//! of the attempt that produced it, so a consumer can discard stragglers from
//! a session it has already torn down.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use vigil_config::ServerConfig;

use crate::framing::FrameError;
use crate::messages::{MessageError, PositionSync, PositionUpdate, SyncAck};

/// Connection parameters for one session attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Player name.
    pub username: String,
    /// Optional credential material.
    pub credential: Option<String>,
    /// Protocol version string.
    pub protocol_version: String,
    /// Client locale.
    pub locale: String,
    /// Requested view distance.
    pub view_distance: u8,
    /// Bound on establishment: transport connect plus login.
    pub connect_timeout: Duration,
    /// Absolute end of establishment, when the caller started the clock.
    pub deadline: Option<Instant>,
    /// Bound on a graceful close.
    pub close_timeout: Duration,
}

impl From<&ServerConfig> for ConnectParams {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            credential: config.credential.clone(),
            protocol_version: config.protocol_version.clone(),
            locale: config.locale.clone(),
            view_distance: config.view_distance,
            connect_timeout: config.connect_timeout(),
            deadline: None,
            close_timeout: config.close_timeout(),
        }
    }
}

impl ConnectParams {
    /// When establishment must be complete: [`ConnectParams::deadline`] if
    /// set, otherwise `connect_timeout` from now.
    pub fn establish_deadline(&self) -> Instant {
        self.deadline
            .unwrap_or_else(|| Instant::now() + self.connect_timeout)
    }
}

/// Something that happened on an open session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Login accepted; the server will push a position sync next.
    Connected {
        /// Entity identifier assigned by the server.
        entity_id: u64,
    },
    /// Server-authoritative position push.
    Sync(PositionSync),
    /// The server closed the session or the stream ended.
    Disconnected {
        /// Reason given by the server, or a description of the close.
        reason: String,
    },
    /// The server removed the player or rejected the login.
    Kicked {
        /// Reason given by the server.
        reason: String,
    },
    /// The transport failed.
    Errored {
        /// Description of the failure.
        cause: String,
    },
}

/// Messages the controller may send through a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Acknowledge a position sync.
    SyncAck(SyncAck),
    /// Re-announce the current position.
    Position(PositionUpdate),
}

/// A [`SessionEvent`] tagged with the generation of the session that emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    /// Generation of the emitting session.
    pub generation: u64,
    /// The event.
    pub event: SessionEvent,
}

/// Sending side of the event stream handed to [`Connector::open`].
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    /// Create a sink that tags every event with `generation`.
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation this sink tags events with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns `false` if the consumer is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Errors raised by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing failure.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A message could not be decoded.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] postcard::Error),

    /// The operation did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The session has already been closed.
    #[error("session closed")]
    Closed,
}

/// An open session.
///
/// Both methods are non-blocking: implementations queue work for their own
/// I/O tasks. `close` must be idempotent.
pub trait Session: Send + 'static {
    /// Queue a message for sending.
    fn send(&mut self, message: Outbound) -> Result<(), SessionError>;

    /// Begin a graceful close. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), SessionError>;

    /// Resolves once a close started by [`Session::close`] has been flushed,
    /// or immediately if the session was never closed.
    fn closed(&mut self) -> impl Future<Output = ()> + Send + '_;
}

/// Opens sessions.
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Session: Session;

    /// Establish a session. Events for it are delivered through `events`.
    fn open(
        &self,
        params: ConnectParams,
        events: EventSink,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}
