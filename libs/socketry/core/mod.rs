//! Connection lifecycle: sessions, connections and the loops that drive them
//!
//! ```ignore
//! use socketry::{ClientSession, WsTransport};
//!
//! let session = ClientSession::builder()
//!     .target("ws://127.0.0.1:8080/")
//!     .transport(WsTransport::default())
//!     .handler(MyHandler)
//!     .heartbeat(Duration::from_secs(30), Duration::from_secs(60))
//!     .build()?;
//!
//! session.connect().await?;
//! session.send_text("hello").await?;
//! session.close().await;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection;
pub mod connection_state;
pub(crate) mod deadline;
pub(crate) mod dispatcher;
pub(crate) mod heartbeat;
pub(crate) mod reader;

pub use builder::{states, ClientSessionBuilder};
pub use client::ClientSession;
pub use config::{ClientConfig, ConfigError, ServerConfig, TransportKind};
pub use connection::Connection;
pub use connection_state::{ConnState, SessionState};
