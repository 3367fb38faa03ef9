//! Transport seam
//!
//! A transport turns a target address into a connected pair of halves, or
//! upgrades an accepted TCP stream into one. The core only ever talks to the
//! halves, so the same session, server and heartbeat code drives raw TCP and
//! WebSocket connections alike.

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Inbound half of an established connection
#[async_trait]
pub trait FrameReader: Send {
    /// Next inbound message
    ///
    /// `None` means the peer closed the stream cleanly. The returned payload
    /// is owned and never aliases an internal read buffer.
    async fn next(&mut self) -> Option<Result<Message>>;
}

/// Outbound half of an established connection
#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Best-effort close of the outbound side
    async fn close(&mut self) -> Result<()>;
}

/// A freshly established connection, split into halves
pub struct TransportParts {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
    pub remote_addr: String,
    /// `User-Agent` of the upgrade request, framed server side only
    pub user_agent: Option<String>,
}

/// Dial and accept capability for one wire protocol
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short protocol name used in logs
    fn name(&self) -> &'static str;

    /// Whether the transport has discrete messages and control frames
    ///
    /// Heartbeats only run on framed transports.
    fn framed(&self) -> bool;

    /// Dial `target` and complete the protocol handshake
    ///
    /// The caller applies the connect timeout.
    async fn connect(&self, target: &str) -> Result<TransportParts>;

    /// Complete the server side of the handshake on an accepted stream
    async fn accept(&self, stream: TcpStream, peer: SocketAddr) -> Result<TransportParts>;
}
