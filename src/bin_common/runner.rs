//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with proper
//! logging and graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Fallback filter when RUST_LOG is unset
    pub log_level: String,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_level: "info".to_string(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

/// Initialize the global fmt subscriber
///
/// RUST_LOG takes precedence over `level`. Calling this twice is harmless.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run until done or until shutdown is requested
    async fn run(&mut self) -> anyhow::Result<()>;

    fn config(&self) -> &RunConfig;

    fn print_banner(&self) {
        let config = self.config();
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Press Ctrl+C to stop");
        info!("========================================");
    }

    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with logging initialized and banners printed
    async fn execute(&mut self) -> anyhow::Result<()> {
        init_tracing(&self.config().log_level);
        self.print_banner();
        let result = self.run().await;
        self.print_shutdown(None);
        result
    }
}

/// Ctrl+C driven shutdown signal
#[derive(Clone)]
pub struct ShutdownManager {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Spawn a Ctrl+C signal handler that triggers shutdown
    pub fn spawn_signal_handler(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal (Ctrl+C)");
                this.trigger();
            }
        });
    }

    pub fn trigger(&self) {
        self.running.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_running() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
