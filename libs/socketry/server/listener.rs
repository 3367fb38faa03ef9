//! Accepting server
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────── TaskTracker ─────────────────┐
//! TcpListener ──> accept loop ──> connection task ──> read loop   │
//!                  │   (limit)          │                         │
//!                  │                    ├──> heartbeat            │
//!                  │                    └──> dispatch worker ──> handler
//!                  └──> error dispatch worker ──> handler.on_error│
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! Every task belongs to the run's tracker and observes the run's
//! cancellation token, so `stop()` can cancel them all and wait for them.
//! Each connection gets its own dispatch worker: its callbacks are ordered,
//! callbacks of different connections run independently.

use crate::core::config::ServerConfig;
use crate::core::connection::Connection;
use crate::core::deadline::ReadDeadline;
use crate::core::dispatcher::{self, Dispatcher, ServerEvent};
use crate::core::heartbeat::spawn_heartbeat;
use crate::core::reader::{read_pump, ReadExit};
use crate::error::{Result, SocketError};
use crate::handler::ServerHandler;
use crate::message::Message;
use crate::server::registry::ConnectionRegistry;
use crate::transport::{self, Transport};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Pause after a failed accept so a persistent error cannot spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// State of one `start()`..`stop()` run
struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
    local_addr: SocketAddr,
    errors: Dispatcher<ServerEvent>,
}

struct ServerInner {
    config: ServerConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ServerHandler>,
    registry: ConnectionRegistry,
    /// Serializes start and stop
    lifecycle: tokio::sync::Mutex<()>,
    running: RwLock<Option<Running>>,
}

/// A listening server tracking its connections
///
/// Cloning is cheap; clones control the same server, so a handler may keep
/// one to broadcast or look up peers.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(config: ServerConfig, transport: impl Transport, handler: impl ServerHandler) -> Self {
        Self::with_shared(config, Arc::new(transport), Arc::new(handler))
    }

    /// Server with the transport named by `config.transport`
    pub fn from_config(config: ServerConfig, handler: impl ServerHandler) -> Self {
        let transport = transport::for_server(&config);
        Self::with_shared(config, transport, Arc::new(handler))
    }

    pub fn with_shared(
        config: ServerConfig,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn ServerHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                transport,
                handler,
                registry: ConnectionRegistry::new(),
                lifecycle: tokio::sync::Mutex::new(()),
                running: RwLock::new(None),
            }),
        }
    }

    /// Bind and start accepting
    ///
    /// Returns the bound address, which differs from the configured one when
    /// the configured port is 0. A stopped server may be started again.
    pub async fn start(&self) -> Result<SocketAddr> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_running() {
            return Err(SocketError::AlreadyRunning);
        }
        self.inner
            .config
            .validate()
            .map_err(|e| SocketError::InvalidConfig(e.to_string()))?;

        let address = self.inner.config.bind_address.clone();
        let bind_error = |e: std::io::Error| SocketError::Bind {
            address: address.clone(),
            reason: e.to_string(),
        };
        let listener = TcpListener::bind(&address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (errors, queue) = dispatcher::channel();
        tracker.spawn(queue.run(Arc::clone(&self.inner.handler)));
        tracker.spawn(Arc::clone(&self.inner).accept_loop(
            listener,
            cancel.clone(),
            tracker.clone(),
            errors.clone(),
        ));

        *self.inner.running.write() = Some(Running {
            cancel,
            tracker,
            local_addr,
            errors,
        });

        info!(
            address = %local_addr,
            transport = self.inner.transport.name(),
            max_connections = self.inner.config.max_connections,
            "Server listening"
        );
        Ok(local_addr)
    }

    /// Stop accepting, close every connection and wait for all workers
    ///
    /// Closing peers and waiting for workers are each bounded by the shutdown
    /// grace period. Calling `stop()` on a stopped server does nothing.
    pub async fn stop(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let running = self.inner.running.write().take();
        let Some(running) = running else {
            return;
        };

        info!(address = %running.local_addr, "Stopping server");
        running.cancel.cancel();

        let grace = self.inner.config.shutdown_grace();
        let connections = self.inner.registry.snapshot();
        let closing = join_all(connections.iter().map(|conn| conn.close()));
        if tokio::time::timeout(grace, closing).await.is_err() {
            warn!(
                count = connections.len(),
                "Timed out closing connections after {:?}", grace
            );
        }

        let Running {
            tracker, errors, ..
        } = running;
        drop(errors);
        tracker.close();
        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                remaining = tracker.len(),
                "Shutdown timed out after {:?}, some tasks may still be running", grace
            );
        }

        info!("Server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.read().is_some()
    }

    /// Actual bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.running.read().as_ref().map(|r| r.local_addr)
    }

    /// Send to every connection registered right now
    ///
    /// Sends run concurrently. A failure is reported through `on_error` and
    /// never stops delivery to the others; the failed connection is left for
    /// its read loop to deregister. Returns the number of successful sends.
    pub async fn broadcast(&self, message: Message) -> usize {
        let targets = self.inner.registry.snapshot();
        if targets.is_empty() {
            return 0;
        }

        let results = join_all(targets.iter().map(|conn| {
            let message = message.clone();
            async move { (conn, conn.send(message).await) }
        }))
        .await;

        let errors = self.inner.running.read().as_ref().map(|r| r.errors.clone());
        let mut delivered = 0;
        for (conn, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(id = %conn.id(), error = %e, "Broadcast delivery failed");
                    if let Some(errors) = &errors {
                        errors.dispatch(ServerEvent::Error(e));
                    }
                }
            }
        }
        delivered
    }

    pub async fn broadcast_text(&self, text: impl Into<String>) -> usize {
        self.broadcast(Message::Text(text.into())).await
    }

    pub async fn broadcast_binary(&self, data: impl Into<Vec<u8>>) -> usize {
        self.broadcast(Message::Binary(data.into())).await
    }

    pub async fn broadcast_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<usize> {
        Ok(self.broadcast(Message::json(value)?).await)
    }

    /// Send to one connection by id
    pub async fn send_to(&self, id: &str, message: Message) -> Result<()> {
        let connection = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| SocketError::ConnectionNotFound(id.to_string()))?;
        connection.send(message).await
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.registry.snapshot()
    }

    pub fn connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.inner.registry.get(id)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.count()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}

impl ServerInner {
    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
        tracker: TaskTracker,
        errors: Dispatcher<ServerEvent>,
    ) {
        let limit = self.config.max_connections;

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        errors.dispatch(ServerEvent::Error(SocketError::Accept(e.to_string())));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            if limit > 0 && self.registry.count() >= limit {
                drop(stream);
                warn!(%peer, limit, "Connection limit reached, rejecting");
                errors.dispatch(ServerEvent::Error(SocketError::ConnectionLimitExceeded {
                    limit,
                    remote_addr: peer.to_string(),
                }));
                continue;
            }

            tracker.spawn(Arc::clone(&self).serve(
                stream,
                peer,
                cancel.child_token(),
                tracker.clone(),
                errors.clone(),
            ));
        }

        debug!("Accept loop exiting");
    }

    /// Handshake, register, read until the connection ends, deregister
    async fn serve(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
        tracker: TaskTracker,
        errors: Dispatcher<ServerEvent>,
    ) {
        let timeout = self.config.handshake_timeout();
        let handshake = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::time::timeout(timeout, self.transport.accept(stream, peer)) => result,
        };
        let parts = match handshake {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "Handshake failed");
                errors.dispatch(ServerEvent::Error(e));
                return;
            }
            Err(_) => {
                debug!(%peer, "Handshake timed out");
                errors.dispatch(ServerEvent::Error(SocketError::Handshake {
                    address: peer.to_string(),
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                }));
                return;
            }
        };

        let (connection, reader) = Connection::establish(
            parts,
            self.transport.framed(),
            self.config.write_timeout(),
            cancel,
        );

        let limit = self.config.max_connections;
        if !self.registry.insert_bounded(Arc::clone(&connection), limit) {
            connection.close().await;
            errors.dispatch(ServerEvent::Error(SocketError::ConnectionLimitExceeded {
                limit,
                remote_addr: peer.to_string(),
            }));
            return;
        }
        drop(errors);

        let (events, queue) = dispatcher::channel();
        tracker.spawn(queue.run(Arc::clone(&self.handler)));
        events.dispatch(ServerEvent::Connected(Arc::clone(&connection)));

        info!(
            id = %connection.id(),
            remote = %connection.remote_addr(),
            count = self.registry.count(),
            "Client connected"
        );

        if connection.is_framed() {
            if let Some(interval) = self.config.ping_interval() {
                spawn_heartbeat(Arc::clone(&connection), interval, Some(&tracker));
            }
        }

        let deadline = ReadDeadline::for_connection(
            connection.is_framed(),
            self.config.ping_interval(),
            self.config.pong_wait(),
            self.config.read_timeout(),
        );
        let exit = read_pump(&connection, reader, deadline, |message| {
            events.dispatch(ServerEvent::Message(Arc::clone(&connection), message));
        })
        .await;

        let cause = match exit {
            ReadExit::Local(cause) => cause,
            ReadExit::PeerClosed => None,
            ReadExit::Failed(e) => Some(e),
        };

        connection.close_with(cause.clone()).await;
        self.registry.remove(connection.id());

        match &cause {
            Some(e) => info!(id = %connection.id(), error = %e, "Client disconnected"),
            None => info!(id = %connection.id(), "Client disconnected"),
        }
        events.dispatch(ServerEvent::Disconnected(connection, cause));
    }
}
