//! # Socketry
//!
//! Resilient connection core for raw TCP and WebSocket transports.
//!
//! ## Features
//!
//! - **ClientSession**: connect, detect failure, reconnect on a pluggable policy
//! - **Server**: accept up to a limit, track peers in a registry, send to one or all
//! - **Heartbeat**: ping/pong liveness for framed transports
//! - **Ordered callbacks**: one dispatch worker per session or connection, so
//!   handlers never block I/O and never see events out of order
//! - **Transport seam**: the same lifecycle code drives TCP and WebSocket

pub mod core;
pub mod server;
pub mod traits;
pub mod transport;

pub use traits::{error, handler, message, reconnect};

// Re-export commonly used types
pub use crate::core::{
    builder, client, config, connection, connection_state,
    builder::{states, ClientSessionBuilder},
    client::ClientSession,
    config::{ClientConfig, ConfigError, ServerConfig, TransportKind},
    connection::Connection,
    connection_state::{ConnState, SessionState},
};
pub use error::{Result, SocketError};
pub use handler::{ClientHandler, NoOpHandler, ServerHandler};
pub use message::{CloseReason, Message, MessageKind};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use server::{ConnectionId, ConnectionRegistry, Server};
pub use transport::{FrameReader, FrameWriter, TcpTransport, Transport, TransportParts, WsTransport};
