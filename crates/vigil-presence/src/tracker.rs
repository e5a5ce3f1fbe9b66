//! Server-confirmed position state.
//!
//! The tracker only changes in response to a [`PositionSync`]. Recording a
//! sync makes its token pending; [`PositionTracker::acknowledge`] turns the
//! pending token into a [`SyncAck`] carrying the recorded coordinates and
//! clears it. A later sync that arrives before the acknowledgement simply
//! replaces the pending one, so only the latest is ever acknowledged.

use vigil_net::{Position, PositionSync, PositionUpdate, SyncAck, SyncToken};

/// Why a sync was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncRejected {
    /// A coordinate or angle is NaN or infinite.
    #[error("non-finite position {0:?}")]
    NonFinite(Position),
    /// The token is empty, so no acknowledgement could be correlated.
    #[error("empty sync token")]
    EmptyToken,
}

/// The believed position plus the token awaiting acknowledgement, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionSnapshot {
    /// Coordinates, orientation and grounded flag.
    pub position: Position,
    /// Token recorded but not yet acknowledged.
    pub pending_token: Option<SyncToken>,
}

impl PositionSnapshot {
    /// True if no token is waiting for an acknowledgement.
    pub fn is_confirmed(&self) -> bool {
        self.pending_token.is_none()
    }
}

/// Applies sync messages and enforces acknowledgement ordering.
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    snapshot: PositionSnapshot,
    /// An acknowledgement has gone out during the current session.
    acknowledged: bool,
}

impl PositionTracker {
    /// Tracker at the default spawn position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sync. All fields are replaced together or not at all.
    pub fn record(&mut self, sync: PositionSync) -> Result<(), SyncRejected> {
        if sync.token.as_str().is_empty() {
            return Err(SyncRejected::EmptyToken);
        }
        if !sync.position.is_finite() {
            return Err(SyncRejected::NonFinite(sync.position));
        }
        if let Some(previous) = self.snapshot.pending_token.as_ref() {
            tracing::debug!("Sync {} supersedes unacknowledged {previous}", sync.token);
        }
        self.snapshot = PositionSnapshot {
            position: sync.position,
            pending_token: Some(sync.token),
        };
        Ok(())
    }

    /// Build the acknowledgement for the pending token and mark it confirmed.
    ///
    /// Returns `None` if nothing is pending.
    pub fn acknowledge(&mut self) -> Option<SyncAck> {
        let token = self.snapshot.pending_token.take()?;
        self.acknowledged = true;
        Some(SyncAck {
            token,
            position: self.snapshot.position,
        })
    }

    /// True once the current session has acknowledged a sync and nothing new
    /// is pending. Keep-alive updates are only allowed in this state.
    pub fn is_ready(&self) -> bool {
        self.acknowledged && self.snapshot.is_confirmed()
    }

    /// Position update for the keep-alive, if the tracker is ready.
    pub fn position_update(&self) -> Option<PositionUpdate> {
        self.is_ready().then(|| PositionUpdate {
            position: self.snapshot.position,
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> &PositionSnapshot {
        &self.snapshot
    }

    /// Forget session-scoped state. The last known position is kept.
    pub fn end_session(&mut self) {
        self.snapshot.pending_token = None;
        self.acknowledged = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(token: &str, y: f64) -> PositionSync {
        PositionSync {
            token: SyncToken::from(token),
            position: Position {
                x: 10.0,
                y,
                z: -3.0,
                yaw: 90.0,
                pitch: 0.0,
                on_ground: true,
            },
        }
    }

    #[test]
    fn test_ack_echoes_token_and_coordinates() {
        let mut tracker = PositionTracker::new();
        tracker.record(sync("abc", 72.0)).unwrap();
        assert!(!tracker.snapshot().is_confirmed());

        let ack = tracker.acknowledge().unwrap();
        assert_eq!(ack.token, SyncToken::from("abc"));
        assert_eq!(ack.position, sync("abc", 72.0).position);
        assert!(tracker.snapshot().is_confirmed());
    }

    #[test]
    fn test_no_ack_without_recorded_token() {
        let mut tracker = PositionTracker::new();
        assert!(tracker.acknowledge().is_none());

        tracker.record(sync("abc", 72.0)).unwrap();
        tracker.acknowledge().unwrap();
        assert!(tracker.acknowledge().is_none(), "token must not be acked twice");
    }

    #[test]
    fn test_latest_sync_wins() {
        let mut tracker = PositionTracker::new();
        tracker.record(sync("first", 72.0)).unwrap();
        tracker.record(sync("second", 80.0)).unwrap();

        let ack = tracker.acknowledge().unwrap();
        assert_eq!(ack.token, SyncToken::from("second"));
        assert_eq!(ack.position.y, 80.0);
        assert!(tracker.acknowledge().is_none());
    }

    #[test]
    fn test_not_ready_before_first_ack() {
        let mut tracker = PositionTracker::new();
        assert!(tracker.position_update().is_none());

        tracker.record(sync("abc", 72.0)).unwrap();
        assert!(tracker.position_update().is_none());

        tracker.acknowledge().unwrap();
        let update = tracker.position_update().unwrap();
        assert_eq!(update.position.y, 72.0);
    }

    #[test]
    fn test_pending_correction_blocks_updates() {
        let mut tracker = PositionTracker::new();
        tracker.record(sync("abc", 72.0)).unwrap();
        tracker.acknowledge().unwrap();

        tracker.record(sync("abc2", 73.0)).unwrap();
        assert!(!tracker.is_ready());
        tracker.acknowledge().unwrap();
        assert_eq!(tracker.position_update().unwrap().position.y, 73.0);
    }

    #[test]
    fn test_malformed_sync_leaves_snapshot_untouched() {
        let mut tracker = PositionTracker::new();
        tracker.record(sync("abc", 72.0)).unwrap();
        tracker.acknowledge().unwrap();
        let before = tracker.snapshot().clone();

        assert_eq!(tracker.record(sync("", 90.0)), Err(SyncRejected::EmptyToken));
        assert!(matches!(
            tracker.record(sync("nan", f64::NAN)),
            Err(SyncRejected::NonFinite(_))
        ));
        assert_eq!(tracker.snapshot(), &before);
        assert!(tracker.is_ready());
    }

    #[test]
    fn test_end_session_requires_new_ack() {
        let mut tracker = PositionTracker::new();
        tracker.record(sync("abc", 72.0)).unwrap();
        tracker.acknowledge().unwrap();

        tracker.end_session();
        assert!(!tracker.is_ready());
        assert_eq!(tracker.snapshot().position.y, 72.0);
    }
}
