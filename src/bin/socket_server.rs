//! Echo / relay server
//!
//! Accepts TCP or WebSocket clients and echoes every message back. With
//! `--broadcast`, each message is relayed to every connected client instead.
//!
//! Usage:
//!   cargo run --bin socket_server -- [config.yaml] [--broadcast]
//!
//! Environment variables:
//!   SOCKETRY_SERVER_CONFIG - config path when none is given (default config/server.yaml)
//!   SOCKETRY_BIND          - overrides bind_address from the file

use anyhow::{Context, Result};
use async_trait::async_trait;
use socketry_toolkit::bin_common::{
    load_or_default, BinaryRunner, CliArgs, ConfigType, RunConfig, ShutdownManager,
};
use socketry_toolkit::socketry::{Connection, Message, Server, ServerConfig, ServerHandler, SocketError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

struct EchoHandler {
    /// Set in broadcast mode; messages go to the main loop instead of back
    relay: Option<mpsc::UnboundedSender<Message>>,
}

#[async_trait]
impl ServerHandler for EchoHandler {
    async fn on_connect(&self, connection: Arc<Connection>) {
        info!(
            id = %connection.id(),
            remote = %connection.remote_addr(),
            user_agent = connection.user_agent().unwrap_or("-"),
            "Peer joined"
        );
    }

    async fn on_disconnect(&self, connection: Arc<Connection>, cause: Option<SocketError>) {
        match cause {
            Some(e) => info!(id = %connection.id(), uptime = ?connection.uptime(), error = %e, "Peer left"),
            None => info!(id = %connection.id(), uptime = ?connection.uptime(), "Peer left"),
        }
    }

    async fn on_message(&self, connection: Arc<Connection>, message: Message) {
        match &self.relay {
            Some(relay) => {
                let _ = relay.send(message);
            }
            None => {
                if let Err(e) = connection.send(message).await {
                    warn!(id = %connection.id(), error = %e, "Echo failed");
                }
            }
        }
    }

    async fn on_error(&self, error: SocketError) {
        warn!(error = %error, "Server error");
    }
}

struct ServerApp {
    run: RunConfig,
    config: ServerConfig,
    broadcast: bool,
    shutdown: ShutdownManager,
}

impl BinaryRunner for ServerApp {
    async fn run(&mut self) -> Result<()> {
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
        let handler = EchoHandler {
            relay: self.broadcast.then_some(relay_tx),
        };

        let server = Server::from_config(self.config.clone(), handler);
        let addr = server.start().await.context("failed to start server")?;
        info!(
            address = %addr,
            transport = ?self.config.transport,
            broadcast = self.broadcast,
            "Ready"
        );

        self.shutdown.spawn_signal_handler();
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                Some(message) = relay_rx.recv() => {
                    let delivered = server.broadcast(message).await;
                    info!(delivered, "Relayed");
                }
            }
        }

        server.stop().await;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = CliArgs::from_env();
    let broadcast = args.has_flag("broadcast");
    let path = args.config_path(ConfigType::Server);
    let config = load_or_default(&path, |path| ServerConfig::load(path))
        .with_context(|| format!("loading {}", path.display()))?;

    let mut app = ServerApp {
        run: RunConfig::new("socket_server").with_log_level(config.log_level.clone()),
        config,
        broadcast,
        shutdown: ShutdownManager::new(),
    };
    app.execute().await
}
