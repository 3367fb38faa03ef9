//! Server side: listener and connection registry

pub mod listener;
pub mod registry;

pub use listener::Server;
pub use registry::{ConnectionId, ConnectionRegistry};
