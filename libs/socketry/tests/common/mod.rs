//! Common test utilities for socketry integration tests
//!
//! Recording handlers forward every callback into an unbounded channel so
//! tests can assert on the exact event sequence.

#![allow(dead_code)]

use async_trait::async_trait;
use socketry::{
    ClientConfig, ClientHandler, ClientSession, Connection, Message, Server, ServerConfig,
    ServerHandler, SocketError, TransportKind,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum ClientRecord {
    Connected,
    Disconnected(Option<SocketError>),
    Message(Message),
    Error(SocketError),
}

pub struct RecordingClient {
    tx: mpsc::UnboundedSender<ClientRecord>,
}

pub fn recording_client() -> (RecordingClient, mpsc::UnboundedReceiver<ClientRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordingClient { tx }, rx)
}

#[async_trait]
impl ClientHandler for RecordingClient {
    async fn on_connect(&self) {
        let _ = self.tx.send(ClientRecord::Connected);
    }

    async fn on_disconnect(&self, cause: Option<SocketError>) {
        let _ = self.tx.send(ClientRecord::Disconnected(cause));
    }

    async fn on_message(&self, message: Message) {
        let _ = self.tx.send(ClientRecord::Message(message));
    }

    async fn on_error(&self, error: SocketError) {
        let _ = self.tx.send(ClientRecord::Error(error));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerRecord {
    Connected(String),
    Disconnected(String, Option<SocketError>),
    Message(String, Message),
    Error(SocketError),
}

/// Reply policy of a [`RecordingServer`]
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Silent,
    /// Send the payload back unchanged
    Echo,
    /// Send the payload back with this prefix
    Prefixed(&'static str),
}

pub struct RecordingServer {
    tx: mpsc::UnboundedSender<ServerRecord>,
    reply: Reply,
}

pub fn recording_server(reply: Reply) -> (RecordingServer, mpsc::UnboundedReceiver<ServerRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordingServer { tx, reply }, rx)
}

#[async_trait]
impl ServerHandler for RecordingServer {
    async fn on_connect(&self, connection: Arc<Connection>) {
        let _ = self
            .tx
            .send(ServerRecord::Connected(connection.id().to_string()));
    }

    async fn on_disconnect(&self, connection: Arc<Connection>, cause: Option<SocketError>) {
        let _ = self.tx.send(ServerRecord::Disconnected(
            connection.id().to_string(),
            cause,
        ));
    }

    async fn on_message(&self, connection: Arc<Connection>, message: Message) {
        let response = match (self.reply, &message) {
            (Reply::Silent, _) => None,
            (Reply::Echo, _) => Some(message.clone()),
            (Reply::Prefixed(prefix), Message::Text(text)) => {
                Some(Message::Text(format!("{}{}", prefix, text)))
            }
            (Reply::Prefixed(prefix), other) => {
                let mut payload = prefix.as_bytes().to_vec();
                payload.extend_from_slice(other.payload());
                Some(Message::Binary(payload))
            }
        };

        let _ = self.tx.send(ServerRecord::Message(
            connection.id().to_string(),
            message,
        ));

        if let Some(response) = response {
            let _ = connection.send(response).await;
        }
    }

    async fn on_error(&self, error: SocketError) {
        let _ = self.tx.send(ServerRecord::Error(error));
    }
}

/// Next event or panic after [`EVENT_TIMEOUT`]
pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip events until one matches `predicate`
pub async fn wait_for<T, F>(rx: &mut mpsc::UnboundedReceiver<T>, mut predicate: F) -> T
where
    T: std::fmt::Debug,
    F: FnMut(&T) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if predicate(&event) {
            return event;
        }
        verbose_println!("  skipping {:?}", event);
    }
}

/// Assert nothing arrives for `quiet`
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>, quiet: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(quiet, rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

pub fn server_config(kind: TransportKind) -> ServerConfig {
    ServerConfig::new("127.0.0.1:0")
        .with_transport(kind)
        .with_shutdown_grace(Duration::from_secs(2))
}

/// Client address for a server bound at `addr`
pub fn client_config(kind: TransportKind, addr: SocketAddr) -> ClientConfig {
    let address = match kind {
        TransportKind::Tcp => addr.to_string(),
        TransportKind::Ws => format!("ws://{}/", addr),
    };
    ClientConfig::new(address)
        .with_transport(kind)
        .with_connect_timeout(Duration::from_secs(2))
}

/// Start a recording server on an ephemeral port
pub async fn start_server(
    config: ServerConfig,
    reply: Reply,
) -> (Server, SocketAddr, mpsc::UnboundedReceiver<ServerRecord>) {
    let (handler, rx) = recording_server(reply);
    let server = Server::from_config(config, handler);
    let addr = server.start().await.expect("server should start");
    (server, addr, rx)
}

/// Build a recording session for `config` without connecting
pub fn session(config: ClientConfig) -> (ClientSession, mpsc::UnboundedReceiver<ClientRecord>) {
    let (handler, rx) = recording_client();
    let session = ClientSession::builder()
        .shared_transport(socketry::transport::for_client(&config))
        .config(config)
        .handler(handler)
        .build()
        .expect("valid client config");
    (session, rx)
}
