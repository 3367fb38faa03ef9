//! # Socketry Traits
//!
//! The types shared by every layer of the connection core:
//!
//! - **SocketError**: the error taxonomy
//! - **Message**: text, binary and control frames
//! - **ClientHandler / ServerHandler**: lifecycle callbacks
//! - **ReconnectionStrategy**: delay and attempt limit between reconnects
//! - **Transport**: dial/accept capability split into reader and writer halves

pub mod error;
pub mod handler;
pub mod message;
pub mod reconnect;
pub mod transport;

pub use error::{Result, SocketError};
pub use handler::{ClientHandler, NoOpHandler, ServerHandler};
pub use message::{CloseReason, Message, MessageKind};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{FrameReader, FrameWriter, Transport, TransportParts};
