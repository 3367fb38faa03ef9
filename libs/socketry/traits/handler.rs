//! Lifecycle callbacks
//!
//! Handlers are invoked from a dispatch worker, never from the task that
//! triggered the event. Events for one session (client) or one connection
//! (server) are delivered sequentially and in order, so `on_connect` always
//! precedes the first `on_message` and `on_disconnect` is the last event of a
//! connection.

use crate::core::connection::Connection;
use crate::error::SocketError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Callbacks for a [`ClientSession`](crate::core::client::ClientSession)
///
/// All methods have empty default bodies; implement the ones you need.
#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    /// Fired once per successful (re)connection
    async fn on_connect(&self) {}

    /// Fired once per teardown; `cause` is `None` for an intentional disconnect
    async fn on_disconnect(&self, _cause: Option<SocketError>) {}

    /// Fired once per inbound text or binary message
    async fn on_message(&self, _message: Message) {}

    /// Fired for non-fatal anomalies: failed sends, failed reconnect attempts,
    /// reconnection exhaustion
    async fn on_error(&self, _error: SocketError) {}
}

/// Callbacks for a [`Server`](crate::server::Server)
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    async fn on_connect(&self, _connection: Arc<Connection>) {}

    async fn on_disconnect(&self, _connection: Arc<Connection>, _cause: Option<SocketError>) {}

    async fn on_message(&self, _connection: Arc<Connection>, _message: Message) {}

    /// Rejected connections, failed handshakes, failed broadcast deliveries
    async fn on_error(&self, _error: SocketError) {}
}

/// A handler that ignores every event
pub struct NoOpHandler;

#[async_trait]
impl ClientHandler for NoOpHandler {}

#[async_trait]
impl ServerHandler for NoOpHandler {}
