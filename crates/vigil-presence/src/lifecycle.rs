//! Connection lifecycle state machine.
//!
//! ```text
//! Idle -> Connecting -> AwaitingSync -> Active
//!   ^          |              |           |
//!   +----------+--------------+-----------+   (disconnect / kick / error:
//!                 via Terminating               teardown, then retry)
//! ```
//!
//! [`Lifecycle`] performs no I/O. Each call takes one [`Input`], updates the
//! owned state, and returns the [`Effect`]s the runtime must carry out, in
//! order. Every session attempt gets a new generation number; session events
//! and keep-alive ticks carry the generation they belong to, and anything
//! from an earlier generation is ignored.

use std::fmt;
use std::time::Duration;

use vigil_net::{Outbound, PositionSync, SessionEvent, TaggedEvent};

use crate::keepalive::KeepAliveEmitter;
use crate::reconnect::{ReconnectCounter, ReconnectPolicy};
use crate::tracker::{PositionSnapshot, PositionTracker};

/// Connectivity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No session. A retry may be pending.
    Idle,
    /// A session has been requested and the login is in progress.
    Connecting,
    /// Logged in, waiting for the first position sync.
    AwaitingSync,
    /// First sync acknowledged; keep-alive running.
    Active,
    /// Tearing down. Permanent once shutdown has been requested.
    Terminating,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingSync => "awaiting-sync",
            Self::Active => "active",
            Self::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// Everything the state machine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Start a session if none is in progress.
    Connect,
    /// Event from a session.
    Session(TaggedEvent),
    /// The keep-alive trigger fired for a session.
    KeepAliveTick {
        /// Generation the trigger was started for.
        generation: u64,
    },
    /// The retry delay elapsed.
    RetryElapsed,
    /// Orderly process shutdown.
    Shutdown,
}

/// Work for the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the connector for a new session tagged with `generation`.
    OpenSession {
        /// Generation of the new attempt.
        generation: u64,
    },
    /// Gracefully close and release the current session.
    CloseSession,
    /// Send a message through the current session.
    Send(Outbound),
    /// Start the periodic keep-alive trigger.
    StartKeepAlive {
        /// Generation ticks must carry.
        generation: u64,
        /// Tick period.
        period: Duration,
    },
    /// Stop the periodic keep-alive trigger.
    StopKeepAlive,
    /// Arrange for [`Input::RetryElapsed`] after `delay`.
    ScheduleRetry {
        /// Delay before the retry.
        delay: Duration,
    },
    /// Drop any pending retry timer.
    CancelRetry,
    /// Stop the runtime.
    Exit,
}

/// The lifecycle controller's state.
#[derive(Debug)]
pub struct Lifecycle {
    status: Status,
    generation: u64,
    session_open: bool,
    retry_pending: bool,
    shutting_down: bool,
    tracker: PositionTracker,
    emitter: KeepAliveEmitter,
    counter: ReconnectCounter,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    /// Idle controller with the given policy and keep-alive period.
    pub fn new(policy: ReconnectPolicy, keepalive_period: Duration) -> Self {
        Self {
            status: Status::Idle,
            generation: 0,
            session_open: false,
            retry_pending: false,
            shutting_down: false,
            tracker: PositionTracker::new(),
            emitter: KeepAliveEmitter::new(keepalive_period),
            counter: ReconnectCounter::default(),
            policy,
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Generation of the latest session attempt (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consecutive failures since the last successful sync.
    pub fn attempts(&self) -> u32 {
        self.counter.attempts()
    }

    /// Current position snapshot.
    pub fn snapshot(&self) -> &PositionSnapshot {
        self.tracker.snapshot()
    }

    /// True while this controller owns a requested or open session.
    pub fn session_open(&self) -> bool {
        self.session_open
    }

    /// True while a retry timer is pending.
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// True while the keep-alive trigger runs.
    pub fn keepalive_running(&self) -> bool {
        self.emitter.is_running()
    }

    /// True if a session opened for `generation` should be kept.
    pub fn wants_session(&self, generation: u64) -> bool {
        self.session_open && generation == self.generation
    }

    /// Feed one input and collect the resulting effects.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Connect => self.connect(),
            Input::RetryElapsed => {
                self.retry_pending = false;
                self.connect()
            }
            Input::Session(TaggedEvent { generation, event }) => {
                self.on_session_event(generation, event)
            }
            Input::KeepAliveTick { generation } => self.on_tick(generation),
            Input::Shutdown => self.shutdown(),
        }
    }

    /// Request a new session unless one is already in progress.
    pub fn connect(&mut self) -> Vec<Effect> {
        if self.shutting_down {
            tracing::debug!("Shutdown in progress, not connecting");
            return Vec::new();
        }
        if self.status != Status::Idle {
            tracing::debug!("Connect ignored, session already {}", self.status);
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            effects.push(Effect::CancelRetry);
        }

        self.generation += 1;
        self.session_open = true;
        self.set_status(Status::Connecting);
        tracing::info!(
            generation = self.generation,
            attempts = self.counter.attempts(),
            "Attempting to connect"
        );
        effects.push(Effect::OpenSession {
            generation: self.generation,
        });
        effects
    }

    /// Stop the keep-alive, release the session, clear the pending token and
    /// return to [`Status::Idle`]. A second call changes nothing.
    pub fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.status == Status::Idle && !self.session_open && !self.emitter.is_running() {
            return effects;
        }

        self.set_status(Status::Terminating);
        effects.extend(self.emitter.stop());
        if self.session_open {
            self.session_open = false;
            effects.push(Effect::CloseSession);
        }
        self.tracker.end_session();
        self.set_status(Status::Idle);
        effects
    }

    /// Count the failure and arrange the next attempt. Suppressed while a
    /// retry is already pending.
    pub fn schedule_retry(&mut self) -> Vec<Effect> {
        if self.shutting_down {
            return Vec::new();
        }
        if self.retry_pending {
            tracing::debug!("Retry already pending, not scheduling another");
            return Vec::new();
        }

        let attempt = self.counter.record_failure();
        let backoff = self.policy.backoff(attempt);
        if backoff.cooldown {
            tracing::warn!(
                "Reached {attempt} consecutive reconnect attempts, cooling down for {:?}",
                backoff.delay
            );
            self.counter.reset();
        } else {
            tracing::info!(
                attempt = attempt + 1,
                "Reconnecting in {:?}",
                backoff.delay
            );
        }

        self.retry_pending = true;
        vec![Effect::ScheduleRetry {
            delay: backoff.delay,
        }]
    }

    fn shutdown(&mut self) -> Vec<Effect> {
        tracing::info!("Shutting down");
        let mut effects = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            effects.push(Effect::CancelRetry);
        }
        effects.extend(self.teardown());
        self.shutting_down = true;
        self.set_status(Status::Terminating);
        effects.push(Effect::Exit);
        effects
    }

    fn on_session_event(&mut self, generation: u64, event: SessionEvent) -> Vec<Effect> {
        if generation != self.generation || !self.session_open {
            tracing::debug!(generation, "Ignoring event from a closed session: {event:?}");
            return Vec::new();
        }

        match event {
            SessionEvent::Connected { entity_id } => {
                if self.status == Status::Connecting {
                    tracing::info!(entity_id, "Connected, waiting for position sync");
                    self.set_status(Status::AwaitingSync);
                } else {
                    tracing::warn!("Unexpected connected event while {}", self.status);
                }
                Vec::new()
            }
            SessionEvent::Sync(sync) => self.on_sync(sync),
            SessionEvent::Disconnected { reason } => {
                tracing::info!("Disconnected by server: {reason}");
                self.fail()
            }
            SessionEvent::Kicked { reason } => {
                tracing::warn!("Kicked from server: {reason}");
                self.fail()
            }
            SessionEvent::Errored { cause } => {
                tracing::warn!("Session error: {cause}");
                self.fail()
            }
        }
    }

    fn fail(&mut self) -> Vec<Effect> {
        let mut effects = self.teardown();
        effects.extend(self.schedule_retry());
        effects
    }

    fn on_sync(&mut self, sync: PositionSync) -> Vec<Effect> {
        match self.status {
            Status::AwaitingSync | Status::Active => {}
            status => {
                tracing::warn!(token = %sync.token, "Position sync while {status}, ignoring");
                return Vec::new();
            }
        }

        let token = sync.token.clone();
        if let Err(e) = self.tracker.record(sync) {
            tracing::warn!(token = %token, "Dropping malformed position sync: {e}");
            return Vec::new();
        }
        let Some(ack) = self.tracker.acknowledge() else {
            return Vec::new();
        };

        let mut effects = vec![Effect::Send(Outbound::SyncAck(ack))];
        if self.status == Status::AwaitingSync {
            self.set_status(Status::Active);
            self.counter.reset();
            tracing::info!(
                token = %token,
                position = ?self.tracker.snapshot().position,
                "Initial position confirmed"
            );
            effects.extend(self.emitter.start(self.generation));
        } else {
            tracing::debug!(token = %token, "Position corrected by server");
        }
        effects
    }

    fn on_tick(&mut self, generation: u64) -> Vec<Effect> {
        self.emitter
            .tick(generation, self.status, &self.tracker)
            .map(|update| vec![Effect::Send(Outbound::Position(update))])
            .unwrap_or_default()
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            tracing::debug!(generation = self.generation, "Status {} -> {}", self.status, status);
            self.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_net::{Position, PositionUpdate, SyncAck, SyncToken};

    const SECOND: Duration = Duration::from_secs(1);

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(
            ReconnectPolicy::Exponential {
                base: Duration::from_millis(30_000),
                ceiling: Duration::from_millis(300_000),
            },
            SECOND,
        )
    }

    fn event(lc: &Lifecycle, event: SessionEvent) -> Input {
        Input::Session(TaggedEvent {
            generation: lc.generation(),
            event,
        })
    }

    fn spawn(y: f64) -> Position {
        Position {
            x: 10.0,
            y,
            z: -3.0,
            yaw: 90.0,
            pitch: 0.0,
            on_ground: true,
        }
    }

    fn sync(token: &str, y: f64) -> SessionEvent {
        SessionEvent::Sync(PositionSync {
            token: SyncToken::from(token),
            position: spawn(y),
        })
    }

    fn disconnected() -> SessionEvent {
        SessionEvent::Disconnected {
            reason: "restarting".to_string(),
        }
    }

    /// Drive a fresh controller to Active and return it.
    fn active() -> Lifecycle {
        let mut lc = lifecycle();
        lc.handle(Input::Connect);
        let connected = event(&lc, SessionEvent::Connected { entity_id: 1 });
        lc.handle(connected);
        let first = event(&lc, sync("abc", 72.0));
        lc.handle(first);
        assert_eq!(lc.status(), Status::Active);
        lc
    }

    #[test]
    fn test_connect_opens_one_session() {
        let mut lc = lifecycle();
        assert_eq!(
            lc.handle(Input::Connect),
            vec![Effect::OpenSession { generation: 1 }]
        );
        assert_eq!(lc.status(), Status::Connecting);
        assert!(lc.session_open());
    }

    #[test]
    fn test_connect_while_connecting_is_noop() {
        let mut lc = lifecycle();
        lc.handle(Input::Connect);
        assert!(lc.handle(Input::Connect).is_empty());
        assert_eq!(lc.generation(), 1);
        assert_eq!(lc.status(), Status::Connecting);
    }

    #[test]
    fn test_connect_while_active_is_noop() {
        let mut lc = active();
        assert!(lc.handle(Input::Connect).is_empty());
        assert_eq!(lc.generation(), 1);
    }

    #[test]
    fn test_connected_moves_to_awaiting_sync() {
        let mut lc = lifecycle();
        lc.handle(Input::Connect);
        let input = event(&lc, SessionEvent::Connected { entity_id: 9 });
        assert!(lc.handle(input).is_empty());
        assert_eq!(lc.status(), Status::AwaitingSync);
        assert!(!lc.retry_pending());
    }

    #[test]
    fn test_first_sync_acks_then_starts_keepalive() {
        let mut lc = lifecycle();
        lc.handle(Input::Connect);
        let connected = event(&lc, SessionEvent::Connected { entity_id: 1 });
        lc.handle(connected);

        let first = event(&lc, sync("abc", 72.0));
        let effects = lc.handle(first);
        assert_eq!(
            effects,
            vec![
                Effect::Send(Outbound::SyncAck(SyncAck {
                    token: SyncToken::from("abc"),
                    position: spawn(72.0),
                })),
                Effect::StartKeepAlive {
                    generation: 1,
                    period: SECOND
                },
            ]
        );
        assert_eq!(lc.status(), Status::Active);
        assert!(lc.snapshot().is_confirmed());
    }

    #[test]
    fn test_zero_keepalive_period_is_raised() {
        let mut lc = Lifecycle::new(ReconnectPolicy::default(), Duration::ZERO);
        lc.handle(Input::Connect);
        let connected = event(&lc, SessionEvent::Connected { entity_id: 1 });
        lc.handle(connected);
        let first = event(&lc, sync("abc", 72.0));
        let effects = lc.handle(first);
        assert!(effects.contains(&Effect::StartKeepAlive {
            generation: 1,
            period: crate::keepalive::MIN_PERIOD
        }));
    }

    #[test]
    fn test_correction_reacks_without_restarting_emitter() {
        let mut lc = active();
        let correction = event(&lc, sync("abc2", 73.0));
        let effects = lc.handle(correction);
        assert_eq!(
            effects,
            vec![Effect::Send(Outbound::SyncAck(SyncAck {
                token: SyncToken::from("abc2"),
                position: spawn(73.0),
            }))]
        );
        assert_eq!(lc.snapshot().position.y, 73.0);
    }

    #[test]
    fn test_tick_sends_snapshot() {
        let mut lc = active();
        assert_eq!(
            lc.handle(Input::KeepAliveTick { generation: 1 }),
            vec![Effect::Send(Outbound::Position(PositionUpdate {
                position: spawn(72.0)
            }))]
        );

        let correction = event(&lc, sync("abc2", 73.0));
        lc.handle(correction);
        assert_eq!(
            lc.handle(Input::KeepAliveTick { generation: 1 }),
            vec![Effect::Send(Outbound::Position(PositionUpdate {
                position: spawn(73.0)
            }))]
        );
    }

    #[test]
    fn test_no_keepalive_before_first_ack() {
        let mut lc = lifecycle();
        lc.handle(Input::Connect);
        assert!(lc.handle(Input::KeepAliveTick { generation: 1 }).is_empty());
        let connected = event(&lc, SessionEvent::Connected { entity_id: 1 });
        lc.handle(connected);
        assert!(lc.handle(Input::KeepAliveTick { generation: 1 }).is_empty());
    }

    #[test]
    fn test_sync_before_connected_is_ignored() {
        let mut lc = lifecycle();
        lc.handle(Input::Connect);
        let early = event(&lc, sync("early", 72.0));
        assert!(lc.handle(early).is_empty());
        assert_eq!(lc.status(), Status::Connecting);
        assert!(lc.snapshot().is_confirmed());
    }

    #[test]
    fn test_malformed_sync_is_dropped_and_session_continues() {
        let mut lc = active();
        let bad = event(&lc, sync("bad", f64::NAN));
        assert!(lc.handle(bad).is_empty());
        assert_eq!(lc.status(), Status::Active);
        assert_eq!(lc.snapshot().position.y, 72.0);
        assert!(!lc.handle(Input::KeepAliveTick { generation: 1 }).is_empty());
    }

    #[test]
    fn test_disconnect_mid_active_tears_down_and_schedules_one_retry() {
        let mut lc = active();
        let input = event(&lc, disconnected());
        let effects = lc.handle(input);
        assert_eq!(
            effects,
            vec![
                Effect::StopKeepAlive,
                Effect::CloseSession,
                Effect::ScheduleRetry {
                    delay: Duration::from_millis(30_000)
                },
            ]
        );
        assert_eq!(lc.status(), Status::Idle);
        assert_eq!(lc.attempts(), 1);
        assert!(lc.retry_pending());
        assert!(lc.snapshot().is_confirmed());
    }

    #[test]
    fn test_duplicate_terminal_events_schedule_one_retry() {
        let mut lc = active();
        let first = event(&lc, disconnected());
        lc.handle(first);
        let second = event(
            &lc,
            SessionEvent::Errored {
                cause: "reset".to_string(),
            },
        );
        assert!(lc.handle(second).is_empty());
        assert_eq!(lc.attempts(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut lc = active();
        let first = lc.teardown();
        assert_eq!(first, vec![Effect::StopKeepAlive, Effect::CloseSession]);
        let status = lc.status();
        let snapshot = lc.snapshot().clone();

        assert!(lc.teardown().is_empty());
        assert_eq!(lc.status(), status);
        assert_eq!(lc.snapshot(), &snapshot);
        assert!(!lc.keepalive_running());
        assert!(!lc.session_open());
    }

    #[test]
    fn test_teardown_on_fresh_controller_is_noop() {
        let mut lc = lifecycle();
        assert!(lc.teardown().is_empty());
        assert_eq!(lc.status(), Status::Idle);
    }

    #[test]
    fn test_backoff_grows_until_sync_then_resets() {
        let mut lc = lifecycle();
        let mut delays = Vec::new();
        for expected_attempts in 1..=4 {
            lc.handle(Input::Connect);
            let err = event(
                &lc,
                SessionEvent::Errored {
                    cause: "refused".to_string(),
                },
            );
            for effect in lc.handle(err) {
                if let Effect::ScheduleRetry { delay } = effect {
                    delays.push(delay.as_millis());
                }
            }
            assert_eq!(lc.attempts(), expected_attempts);
            lc.handle(Input::RetryElapsed);
            lc.teardown();
        }
        assert_eq!(delays, vec![30_000, 60_000, 120_000, 240_000]);

        lc.handle(Input::Connect);
        let connected = event(&lc, SessionEvent::Connected { entity_id: 1 });
        lc.handle(connected);
        assert_eq!(lc.attempts(), 4, "connected alone does not reset");
        let first = event(&lc, sync("abc", 72.0));
        lc.handle(first);
        assert_eq!(lc.attempts(), 0);
    }

    #[test]
    fn test_retry_elapsed_reconnects_with_new_generation() {
        let mut lc = active();
        let input = event(&lc, disconnected());
        lc.handle(input);
        assert_eq!(
            lc.handle(Input::RetryElapsed),
            vec![Effect::OpenSession { generation: 2 }]
        );
        assert!(!lc.retry_pending());
    }

    #[test]
    fn test_manual_connect_cancels_pending_retry() {
        let mut lc = active();
        let input = event(&lc, disconnected());
        lc.handle(input);
        assert_eq!(
            lc.handle(Input::Connect),
            vec![Effect::CancelRetry, Effect::OpenSession { generation: 2 }]
        );
    }

    #[test]
    fn test_stale_generation_events_ignored() {
        let mut lc = active();
        let input = event(&lc, disconnected());
        lc.handle(input);
        lc.handle(Input::RetryElapsed);
        assert_eq!(lc.generation(), 2);

        let stale = Input::Session(TaggedEvent {
            generation: 1,
            event: SessionEvent::Kicked {
                reason: "late".to_string(),
            },
        });
        assert!(lc.handle(stale).is_empty());
        assert_eq!(lc.status(), Status::Connecting);
        assert!(lc.handle(Input::KeepAliveTick { generation: 1 }).is_empty());
    }

    #[test]
    fn test_at_most_one_session_open() {
        let mut lc = lifecycle();
        let mut open = 0i32;
        let script = [
            "connect", "connect", "fail", "connect", "retry", "connect", "fail", "fail",
            "retry", "retry", "connect",
        ];
        for step in script {
            let input = match step {
                "connect" => Input::Connect,
                "retry" => Input::RetryElapsed,
                _ => event(
                    &lc,
                    SessionEvent::Errored {
                        cause: "x".to_string(),
                    },
                ),
            };
            for effect in lc.handle(input) {
                match effect {
                    Effect::OpenSession { .. } => open += 1,
                    Effect::CloseSession => open -= 1,
                    _ => {}
                }
                assert!((0..=1).contains(&open), "{open} sessions after {step}");
            }
        }
    }

    #[test]
    fn test_fixed_policy_cooldown_resets_counter() {
        let mut lc = Lifecycle::new(
            ReconnectPolicy::Fixed {
                delay: Duration::from_secs(20),
                max_attempts: 2,
                cooldown: Duration::from_secs(300),
            },
            SECOND,
        );
        let mut delays = Vec::new();
        for _ in 0..4 {
            lc.handle(Input::Connect);
            let err = event(
                &lc,
                SessionEvent::Errored {
                    cause: "refused".to_string(),
                },
            );
            for effect in lc.handle(err) {
                if let Effect::ScheduleRetry { delay } = effect {
                    delays.push(delay.as_secs());
                }
            }
            lc.handle(Input::RetryElapsed);
            lc.teardown();
        }
        assert_eq!(delays, vec![20, 20, 300, 20]);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut lc = active();
        let effects = lc.handle(Input::Shutdown);
        assert_eq!(
            effects,
            vec![Effect::StopKeepAlive, Effect::CloseSession, Effect::Exit]
        );
        assert_eq!(lc.status(), Status::Terminating);
        assert!(lc.handle(Input::Connect).is_empty());
        assert!(lc.handle(Input::RetryElapsed).is_empty());
    }

    #[test]
    fn test_shutdown_cancels_pending_retry() {
        let mut lc = active();
        let input = event(&lc, disconnected());
        lc.handle(input);
        assert_eq!(
            lc.handle(Input::Shutdown),
            vec![Effect::CancelRetry, Effect::Exit]
        );
        assert!(!lc.retry_pending());
    }
}
