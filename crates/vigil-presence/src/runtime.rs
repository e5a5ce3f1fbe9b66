//! Runtime shell around [`Lifecycle`].
//!
//! One task owns the state machine and the current session handle. Session
//! opens, session events, keep-alive ticks and the retry timer all reach it as
//! [`Command`]s on a single channel, so every mutation happens on this task in
//! arrival order and no locking is needed.
//!
//! Each open runs in its own task: it stamps the attempt with one
//! establishment deadline, awaits the connector (bounded by that deadline,
//! which the connector also applies to its login), reports the outcome, then forwards that session's events
//! onto the command channel. Because the forwarder only starts after the
//! outcome is sent, the shell always holds the session before it sees any of
//! its events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use vigil_config::Config;
use vigil_net::{
    ConnectParams, Connector, EventSink, Session, SessionError, SessionEvent, TaggedEvent,
};

use crate::lifecycle::{Effect, Input, Lifecycle};
use crate::reconnect::ReconnectPolicy;
use crate::timer::TaskSlot;

/// Message delivered to the runtime task.
#[derive(Debug)]
pub enum Command<S> {
    /// Input for the state machine.
    Input(Input),
    /// Outcome of an open started for `generation`.
    Opened {
        /// Generation the open was started for.
        generation: u64,
        /// The session, or why it could not be opened.
        result: Result<S, SessionError>,
    },
}

/// Static settings for a [`PresenceRuntime`].
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Parameters for every session attempt. `connect_timeout` bounds the
    /// whole establishment.
    pub params: ConnectParams,
    /// Retry timing.
    pub policy: ReconnectPolicy,
    /// Keep-alive tick period.
    pub keepalive_period: Duration,
}

impl From<&Config> for RuntimeSettings {
    fn from(config: &Config) -> Self {
        Self {
            params: ConnectParams::from(&config.server),
            policy: ReconnectPolicy::from(&config.reconnect),
            keepalive_period: config.keepalive.period(),
        }
    }
}

/// Drives a [`Lifecycle`] against a [`Connector`] until shutdown.
pub struct PresenceRuntime<C: Connector> {
    connector: Arc<C>,
    params: ConnectParams,
    lifecycle: Lifecycle,
    session: Option<C::Session>,
    /// Last session handed a close, kept so shutdown can wait for its flush.
    closing: Option<C::Session>,
    commands_tx: mpsc::UnboundedSender<Command<C::Session>>,
    commands_rx: mpsc::UnboundedReceiver<Command<C::Session>>,
    /// Command pulled ahead while coalescing syncs.
    deferred: Option<Command<C::Session>>,
    opener: TaskSlot,
    keepalive: TaskSlot,
    retry: TaskSlot,
    exiting: bool,
}

impl<C: Connector> PresenceRuntime<C> {
    /// Runtime that will open sessions through `connector`.
    pub fn new(connector: C, settings: RuntimeSettings) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(connector),
            params: settings.params,
            lifecycle: Lifecycle::new(settings.policy, settings.keepalive_period),
            session: None,
            closing: None,
            commands_tx,
            commands_rx,
            deferred: None,
            opener: TaskSlot::new("session open"),
            keepalive: TaskSlot::new("keep-alive"),
            retry: TaskSlot::new("retry"),
            exiting: false,
        }
    }

    /// Connect and keep reconnecting until `shutdown` changes or its sender
    /// is dropped. On return every timer is cancelled and the last session
    /// has been closed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.apply(Input::Connect);

        while !self.exiting {
            let command = match self.deferred.take() {
                Some(command) => command,
                None => tokio::select! {
                    biased;
                    _ = shutdown.changed() => Command::Input(Input::Shutdown),
                    Some(command) = self.commands_rx.recv() => command,
                },
            };
            self.dispatch(command);
        }

        self.opener.cancel();
        if let Some(session) = self.closing.as_mut() {
            let wait = self.params.close_timeout;
            if tokio::time::timeout(wait, session.closed()).await.is_err() {
                tracing::warn!("Session did not finish closing within {wait:?}");
            }
        }
        tracing::info!("Presence runtime stopped");
    }

    fn dispatch(&mut self, command: Command<C::Session>) {
        match command {
            Command::Input(Input::Session(tagged)) => {
                let tagged = self.coalesce(tagged);
                self.apply(Input::Session(tagged));
            }
            Command::Input(input) => self.apply(input),
            Command::Opened { generation, result } => self.on_opened(generation, result),
        }
    }

    /// If `first` is a sync, fold any syncs of the same generation already
    /// queued behind it into the latest one.
    fn coalesce(&mut self, first: TaggedEvent) -> TaggedEvent {
        if !matches!(first.event, SessionEvent::Sync(_)) {
            return first;
        }
        let mut latest = first;
        while let Ok(next) = self.commands_rx.try_recv() {
            match next {
                Command::Input(Input::Session(tagged))
                    if tagged.generation == latest.generation
                        && matches!(tagged.event, SessionEvent::Sync(_)) =>
                {
                    tracing::debug!("Superseding queued sync");
                    latest = tagged;
                }
                other => {
                    self.deferred = Some(other);
                    break;
                }
            }
        }
        latest
    }

    fn on_opened(&mut self, generation: u64, result: Result<C::Session, SessionError>) {
        match result {
            Ok(session) if self.lifecycle.wants_session(generation) => {
                tracing::debug!(generation, "Session handle acquired");
                self.session = Some(session);
            }
            Ok(mut session) => {
                tracing::debug!(generation, "Discarding session from a superseded attempt");
                if let Err(e) = session.close() {
                    tracing::warn!("Closing superseded session failed: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(generation, "Could not open session: {e}");
                self.apply(Input::Session(TaggedEvent {
                    generation,
                    event: SessionEvent::Errored {
                        cause: e.to_string(),
                    },
                }));
            }
        }
    }

    fn apply(&mut self, input: Input) {
        for effect in self.lifecycle.handle(input) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenSession { generation } => self.open(generation),
            Effect::CloseSession => {
                if let Some(mut session) = self.session.take() {
                    if let Err(e) = session.close() {
                        tracing::warn!("Closing session failed: {e}");
                    }
                    self.closing = Some(session);
                }
            }
            Effect::Send(message) => {
                let Some(session) = self.session.as_mut() else {
                    tracing::warn!("No session to send {message:?} through");
                    return;
                };
                if let Err(e) = session.send(message) {
                    tracing::warn!("Send failed: {e}");
                    let _ = self.commands_tx.send(Command::Input(Input::Session(TaggedEvent {
                        generation: self.lifecycle.generation(),
                        event: SessionEvent::Errored {
                            cause: e.to_string(),
                        },
                    })));
                }
            }
            Effect::StartKeepAlive { generation, period } => {
                self.keepalive.every(period, self.commands_tx.clone(), move || {
                    Command::Input(Input::KeepAliveTick { generation })
                });
            }
            Effect::StopKeepAlive => {
                self.keepalive.cancel();
            }
            Effect::ScheduleRetry { delay } => {
                self.retry
                    .after(delay, self.commands_tx.clone(), Command::Input(Input::RetryElapsed));
            }
            Effect::CancelRetry => {
                self.retry.cancel();
            }
            Effect::Exit => {
                self.keepalive.cancel();
                self.retry.cancel();
                self.exiting = true;
            }
        }
    }

    fn open(&mut self, generation: u64) {
        let connector = Arc::clone(&self.connector);
        let mut params = self.params.clone();
        let timeout = params.connect_timeout;
        let deadline = Instant::now() + timeout;
        params.deadline = Some(deadline);
        let commands = self.commands_tx.clone();

        self.opener.spawn(async move {
            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            let sink = EventSink::new(generation, events_tx);
            let result = match tokio::time::timeout_at(deadline, connector.open(params, sink)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout(timeout)),
            };
            let opened = result.is_ok();
            if commands
                .send(Command::Opened { generation, result })
                .is_err()
                || !opened
            {
                return;
            }
            while let Some(tagged) = events_rx.recv().await {
                if commands.send(Command::Input(Input::Session(tagged))).is_err() {
                    return;
                }
            }
        });
    }
}
