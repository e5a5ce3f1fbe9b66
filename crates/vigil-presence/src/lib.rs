//! Presence controller for Vigil.
//!
//! Keeps one player session online: acknowledges the server's position syncs,
//! re-announces the confirmed position on a fixed period, and reconnects on a
//! bounded schedule after any disconnect. [`Lifecycle`] is the I/O-free state
//! machine; [`PresenceRuntime`] drives it against a
//! [`Connector`](vigil_net::Connector) on tokio.

pub mod keepalive;
pub mod lifecycle;
pub mod reconnect;
pub mod runtime;
pub mod timer;
pub mod tracker;

pub use keepalive::KeepAliveEmitter;
pub use lifecycle::{Effect, Input, Lifecycle, Status};
pub use reconnect::{Backoff, ReconnectCounter, ReconnectPolicy};
pub use runtime::{Command, PresenceRuntime, RuntimeSettings};
pub use timer::TaskSlot;
pub use tracker::{PositionSnapshot, PositionTracker, SyncRejected};
