//! Session transport for Vigil: framing, wire messages, socket setup, and the
//! session contract the presence controller drives.

pub mod framing;
pub mod messages;
pub mod session;
pub mod socket;
pub mod tcp_client;

pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use messages::{
    Message, MessageError, Position, PositionSync, PositionUpdate, SyncAck, SyncToken,
    deserialize_message, serialize_message,
};
pub use session::{
    ConnectParams, Connector, EventSink, Outbound, Session, SessionError, SessionEvent,
    TaggedEvent,
};
pub use socket::SocketConfig;
pub use tcp_client::{TcpConnector, TcpSession};
