//! TCP implementation of the session contract.
//!
//! [`TcpConnector::open`] connects, queues a login request and spawns two
//! tasks: a writer draining the outbound queue and a reader turning server
//! frames into [`SessionEvent`]s. Server pings are answered by the reader
//! directly. Undecodable frames are logged and dropped without ending the
//! session. The transport connect and the login share one deadline,
//! [`ConnectParams::establish_deadline`].

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::messages::{
    LoginRequest, Logout, Message, Pong, QUIT_REASON, deserialize_message, serialize_message,
};
use crate::session::{
    ConnectParams, Connector, EventSink, Outbound, Session, SessionError, SessionEvent,
};
use crate::socket::{SocketConfig, connect_stream};

/// Work item for the writer task.
#[derive(Debug)]
enum WriterCommand {
    Send(Message),
    /// Send a logout, flush and shut the stream down.
    Close,
}

/// Opens [`TcpSession`]s.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    /// Socket options for new connections.
    pub socket: SocketConfig,
    /// Framing limits.
    pub frame: FrameConfig,
}

impl TcpConnector {
    /// Connector with default socket and framing settings.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for TcpConnector {
    type Session = TcpSession;

    async fn open(
        &self,
        params: ConnectParams,
        events: EventSink,
    ) -> Result<TcpSession, SessionError> {
        let deadline = params.establish_deadline();
        let stream = tokio::time::timeout_at(
            deadline,
            connect_stream(&params.host, params.port, &self.socket),
        )
        .await
        .map_err(|_| SessionError::Timeout(params.connect_timeout))??;
        tracing::info!(
            host = %params.host,
            port = params.port,
            generation = events.generation(),
            "Transport established, logging in as {}",
            params.username
        );

        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let login = Message::LoginRequest(LoginRequest {
            username: params.username.clone(),
            client_id: rand::random(),
            protocol_version: params.protocol_version.clone(),
            credential: params.credential.clone(),
            locale: params.locale.clone(),
            view_distance: params.view_distance,
        });
        // The channel is fresh, so this cannot fail.
        let _ = outbound_tx.send(WriterCommand::Send(login));

        let writer = tokio::spawn(write_loop(
            writer,
            outbound_rx,
            self.frame.clone(),
            events.clone(),
            params.close_timeout,
        ));
        tokio::spawn(read_loop(
            reader,
            outbound_tx.clone(),
            shutdown_rx,
            self.frame.clone(),
            events,
            deadline,
            params.connect_timeout,
        ));

        Ok(TcpSession {
            outbound: outbound_tx,
            shutdown_tx,
            writer: Some(writer),
            closed: false,
        })
    }
}

/// Handle to an open TCP session.
///
/// Dropping the handle closes the session.
pub struct TcpSession {
    outbound: mpsc::UnboundedSender<WriterCommand>,
    shutdown_tx: watch::Sender<bool>,
    writer: Option<JoinHandle<()>>,
    closed: bool,
}

impl Session for TcpSession {
    fn send(&mut self, message: Outbound) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let message = match message {
            Outbound::SyncAck(ack) => Message::SyncAck(ack),
            Outbound::Position(update) => Message::PositionUpdate(update),
        };
        self.outbound
            .send(WriterCommand::Send(message))
            .map_err(|_| SessionError::Closed)
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.shutdown_tx.send(true);
        self.outbound
            .send(WriterCommand::Close)
            .map_err(|_| SessionError::Closed)
    }

    async fn closed(&mut self) {
        if !self.closed {
            return;
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    frame: FrameConfig,
    events: EventSink,
    close_timeout: Duration,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Send(message) => {
                if let Err(e) = write_message(&mut writer, &message, &frame).await {
                    tracing::warn!("Write failed: {e}");
                    events.emit(SessionEvent::Errored {
                        cause: e.to_string(),
                    });
                    return;
                }
            }
            WriterCommand::Close => {
                let logout = Message::Logout(Logout {
                    reason: QUIT_REASON.to_string(),
                });
                let graceful = async {
                    write_message(&mut writer, &logout, &frame).await?;
                    writer.shutdown().await?;
                    Ok::<_, SessionError>(())
                };
                match tokio::time::timeout(close_timeout, graceful).await {
                    Ok(Ok(())) => tracing::debug!("Session closed gracefully"),
                    Ok(Err(e)) => tracing::warn!("Graceful close failed: {e}"),
                    Err(_) => tracing::warn!("Graceful close timed out after {close_timeout:?}"),
                }
                return;
            }
        }
    }
}

async fn write_message(
    writer: &mut OwnedWriteHalf,
    message: &Message,
    frame: &FrameConfig,
) -> Result<(), SessionError> {
    let payload = serialize_message(message)?;
    write_frame(writer, &payload, frame).await?;
    Ok(())
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    outbound: mpsc::UnboundedSender<WriterCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    frame: FrameConfig,
    events: EventSink,
    login_deadline: Instant,
    connect_timeout: Duration,
) {
    let mut logged_in = false;

    loop {
        let payload = tokio::select! {
            result = read_frame(&mut reader, &frame) => result,
            _ = shutdown_rx.changed() => return,
            _ = tokio::time::sleep_until(login_deadline), if !logged_in => {
                events.emit(SessionEvent::Errored {
                    cause: format!("session not established within {connect_timeout:?}"),
                });
                return;
            }
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(FrameError::ConnectionClosed) => {
                events.emit(SessionEvent::Disconnected {
                    reason: "connection closed by server".to_string(),
                });
                return;
            }
            Err(e) => {
                events.emit(SessionEvent::Errored {
                    cause: e.to_string(),
                });
                return;
            }
        };

        let message = match deserialize_message(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame ({} bytes): {e}", payload.len());
                continue;
            }
        };

        match message {
            Message::LoginResponse(response) if response.success => {
                logged_in = true;
                tracing::info!(
                    entity_id = response.entity_id,
                    "Logged in: {}",
                    response.message
                );
                events.emit(SessionEvent::Connected {
                    entity_id: response.entity_id,
                });
            }
            Message::LoginResponse(response) => {
                events.emit(SessionEvent::Kicked {
                    reason: response.message,
                });
                return;
            }
            Message::PositionSync(sync) => {
                events.emit(SessionEvent::Sync(sync));
            }
            Message::Ping(ping) => {
                let _ = outbound.send(WriterCommand::Send(Message::Pong(Pong { id: ping.id })));
            }
            Message::Disconnect(disconnect) => {
                events.emit(SessionEvent::Disconnected {
                    reason: disconnect.reason,
                });
                return;
            }
            Message::Kick(kick) => {
                events.emit(SessionEvent::Kicked {
                    reason: kick.reason,
                });
                return;
            }
            other => {
                tracing::debug!("Ignoring unexpected server message: {other:?}");
            }
        }
    }
}
