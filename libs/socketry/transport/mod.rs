//! Wire protocols
//!
//! - [`TcpTransport`]: raw byte stream, no message boundaries, no heartbeat
//! - [`WsTransport`]: WebSocket frames with ping/pong control frames

pub mod tcp;
pub mod ws;

pub use crate::traits::transport::{FrameReader, FrameWriter, Transport, TransportParts};
pub use tcp::TcpTransport;
pub use ws::WsTransport;

use crate::core::config::{ClientConfig, ServerConfig, TransportKind};
use std::sync::Arc;

/// Transport selected by a client configuration
pub fn for_client(config: &ClientConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Tcp => Arc::new(TcpTransport::from_client_config(config)),
        TransportKind::Ws => Arc::new(WsTransport::from_client_config(config)),
    }
}

/// Transport selected by a server configuration
pub fn for_server(config: &ServerConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Tcp => Arc::new(TcpTransport::from_server_config(config)),
        TransportKind::Ws => Arc::new(WsTransport::from_server_config(config)),
    }
}
