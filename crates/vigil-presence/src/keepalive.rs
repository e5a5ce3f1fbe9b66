//! Keep-alive emitter.
//!
//! The emitter is bound to one session generation at a time. A tick produces
//! a position update only when it belongs to the running generation, the
//! session is [`Status::Active`], and the tracker is ready. Anything else is
//! a silent no-op, which covers ticks that were already queued when the
//! session was torn down.

use std::time::Duration;

use vigil_net::PositionUpdate;

use crate::lifecycle::{Effect, Status};
use crate::tracker::PositionTracker;

/// Default tick period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Shortest period the emitter will run at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Tracks which session, if any, the periodic trigger runs for.
#[derive(Debug, Clone)]
pub struct KeepAliveEmitter {
    period: Duration,
    running_for: Option<u64>,
}

impl Default for KeepAliveEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD)
    }
}

impl KeepAliveEmitter {
    /// Emitter with the given tick period, raised to [`MIN_PERIOD`] if shorter.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            running_for: None,
        }
    }

    /// True while a periodic trigger is running.
    pub fn is_running(&self) -> bool {
        self.running_for.is_some()
    }

    /// Start the trigger for `generation`.
    ///
    /// Returns `None` if it already runs for that generation. Starting for a
    /// new generation replaces the old trigger.
    pub fn start(&mut self, generation: u64) -> Option<Effect> {
        if self.running_for == Some(generation) {
            return None;
        }
        self.running_for = Some(generation);
        Some(Effect::StartKeepAlive {
            generation,
            period: self.period,
        })
    }

    /// Stop the trigger. Returns `None` if it was not running.
    pub fn stop(&mut self) -> Option<Effect> {
        self.running_for.take().map(|_| Effect::StopKeepAlive)
    }

    /// Position update to send for a tick of `generation`, if any.
    pub fn tick(
        &self,
        generation: u64,
        status: Status,
        tracker: &PositionTracker,
    ) -> Option<PositionUpdate> {
        if self.running_for != Some(generation) || status != Status::Active {
            return None;
        }
        tracker.position_update()
    }
}
