use crate::core::connection_state::SessionState;
use thiserror::Error;

/// Main error type for socketry
///
/// Every variant carries owned strings so one cause can be handed to several
/// callbacks (`on_disconnect` and `on_error`) and returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// `connect()` called while the session is not `Disconnected`
    #[error("Already connected")]
    AlreadyConnected,

    /// Operation requires a live connection
    #[error("Not connected")]
    NotConnected,

    /// `start()` called on a running server
    #[error("Server is already running")]
    AlreadyRunning,

    /// Listener could not bind to the configured address
    #[error("Failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    /// The listener failed to accept a connection; the server keeps running
    #[error("Failed to accept connection: {0}")]
    Accept(String),

    /// Dial or protocol handshake failed
    #[error("Handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    /// Dial did not complete within the connect timeout
    #[error("Connecting to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout { address: String, timeout_ms: u64 },

    /// The target address or URL could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Server refused a connection because it is at capacity
    #[error("Connection limit reached ({limit}), rejecting connection from {remote_addr}")]
    ConnectionLimitExceeded { limit: usize, remote_addr: String },

    /// Reading from the transport failed
    #[error("Transport read error: {0}")]
    TransportRead(String),

    /// Writing to the transport failed or timed out
    #[error("Transport write error: {0}")]
    TransportWrite(String),

    /// No pong arrived before the read deadline
    #[error("Heartbeat timed out: no pong within {pong_wait_ms}ms")]
    HeartbeatTimeout { pong_wait_ms: u64 },

    /// A single reconnection attempt failed
    #[error("Reconnect attempt {attempt} failed: {reason}")]
    ReconnectAttemptFailed { attempt: u32, reason: String },

    /// The reconnection policy gave up
    #[error("Max reconnect attempts ({attempts}) reached")]
    ReconnectAttemptsExhausted { attempts: u32 },

    /// Structured payload encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The connection was already closed when the operation ran
    #[error("Connection {0} is closed")]
    ConnectionClosed(String),

    /// No registered connection with the given id
    #[error("Connection {0} not found")]
    ConnectionNotFound(String),

    /// The session was closed for good
    #[error("Session has been closed")]
    SessionClosed,

    /// An in-flight operation was invalidated by `disconnect()`/`close()`
    #[error("Operation cancelled")]
    Cancelled,

    /// The session state machine refused a move
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// Configuration rejected when starting
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SocketError {
    /// Whether this error ends the connection it happened on
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            SocketError::TransportRead(_)
                | SocketError::TransportWrite(_)
                | SocketError::HeartbeatTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for SocketError {
    fn from(err: serde_json::Error) -> Self {
        SocketError::Serialization(err.to_string())
    }
}

/// Result type for socketry operations
pub type Result<T> = std::result::Result<T, SocketError>;
