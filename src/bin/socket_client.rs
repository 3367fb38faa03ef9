//! Line-oriented client
//!
//! Sends each stdin line as a text message and prints whatever comes back.
//! The session reconnects on its own when the server goes away.
//!
//! Usage:
//!   cargo run --bin socket_client -- [config.yaml]
//!
//! Environment variables:
//!   SOCKETRY_CLIENT_CONFIG - config path when none is given (default config/client.yaml)
//!   SOCKETRY_ADDRESS       - overrides address from the file

use anyhow::{Context, Result};
use async_trait::async_trait;
use socketry_toolkit::bin_common::{
    load_or_default, BinaryRunner, CliArgs, ConfigType, RunConfig, ShutdownManager,
};
use socketry_toolkit::socketry::{
    transport, ClientConfig, ClientHandler, ClientSession, Message, SocketError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

struct PrintHandler;

#[async_trait]
impl ClientHandler for PrintHandler {
    async fn on_connect(&self) {
        info!("Connected");
    }

    async fn on_disconnect(&self, cause: Option<SocketError>) {
        match cause {
            Some(e) => warn!(error = %e, "Disconnected"),
            None => info!("Disconnected"),
        }
    }

    async fn on_message(&self, message: Message) {
        match message.as_text() {
            Some(text) => println!("< {}", text),
            None => println!("< {} bytes", message.len()),
        }
    }

    async fn on_error(&self, error: SocketError) {
        warn!(error = %error, "Session error");
    }
}

struct ClientApp {
    run: RunConfig,
    config: ClientConfig,
    shutdown: ShutdownManager,
}

impl BinaryRunner for ClientApp {
    async fn run(&mut self) -> Result<()> {
        let session = ClientSession::builder()
            .shared_transport(transport::for_client(&self.config))
            .config(self.config.clone())
            .handler(PrintHandler)
            .build()
            .context("invalid client configuration")?;

        session
            .connect()
            .await
            .with_context(|| format!("connecting to {}", session.target()))?;

        self.shutdown.spawn_signal_handler();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                line = lines.next_line() => match line? {
                    Some(line) if line.is_empty() => {}
                    Some(line) => {
                        if let Err(e) = session.send_text(line).await {
                            warn!(error = %e, state = %session.state(), "Send failed");
                        }
                    }
                    None => break,
                },
            }
        }

        session.close().await;
        info!("Session closed");
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let path = CliArgs::from_env().config_path(ConfigType::Client);
    let config = load_or_default(&path, |path| ClientConfig::load(path))
        .with_context(|| format!("loading {}", path.display()))?;

    let mut app = ClientApp {
        run: RunConfig::new("socket_client").with_log_level(config.log_level.clone()),
        config,
        shutdown: ShutdownManager::new(),
    };
    app.execute().await
}
