//! Outbound connection with automatic reconnection
//!
//! # Architecture
//!
//! ```text
//! connect() ──> dial (connect timeout) ──> install ──> read loop ──┐
//!                   ^                         │                    │ error
//!                   │                         └─> heartbeat        v
//!                   └──── sleep(delay) <──── reconnect loop <── connection lost
//! ```
//!
//! All state lives behind one lock: the [`SessionState`], the current
//! connection, the attempt counter and an *epoch* token. `disconnect()` and
//! `close()` cancel the epoch, which invalidates any dial or reconnect loop
//! started under it; a dial that completes after that is torn down instead of
//! being installed.
//!
//! Callbacks go through a single dispatch worker per session, so handlers see
//! `on_connect`, messages and `on_disconnect` in order, never concurrently.

use crate::core::config::ClientConfig;
use crate::core::connection::Connection;
use crate::core::connection_state::SessionState;
use crate::core::deadline::ReadDeadline;
use crate::core::dispatcher::{self, ClientEvent, DispatchQueue, Dispatcher};
use crate::core::heartbeat::spawn_heartbeat;
use crate::core::reader::{read_pump, ReadExit};
use crate::error::{Result, SocketError};
use crate::handler::ClientHandler;
use crate::message::Message;
use crate::reconnect::ReconnectionStrategy;
use crate::transport::{FrameReader, Transport};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct SessionCore {
    state: SessionState,
    connection: Option<Arc<Connection>>,
    attempt: u32,
    /// Cancelled by disconnect/close; every dial and reconnect loop holds a clone
    epoch: CancellationToken,
    closed: bool,
}

impl SessionCore {
    /// Move to `next` if the state machine allows it
    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SocketError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Fall back to `Disconnected`, which every state allows; returns the previous state
    fn settle_disconnected(&mut self) -> SessionState {
        std::mem::replace(&mut self.state, SessionState::Disconnected)
    }
}

struct SessionInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ClientHandler>,
    strategy: Box<dyn ReconnectionStrategy>,
    core: Mutex<SessionCore>,
    root: CancellationToken,
    events: Mutex<Option<Dispatcher<ClientEvent>>>,
    /// Consumer half, spawned on first connect
    queue: Mutex<Option<DispatchQueue<ClientEvent>>>,
}

/// A client connection that survives drops
///
/// Cloning is cheap and every clone drives the same session, so a handler
/// may keep one to reply. Call [`close`](ClientSession::close) when done:
/// background reconnection otherwise keeps running.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl ClientSession {
    pub(crate) fn from_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn ClientHandler>,
        strategy: Box<dyn ReconnectionStrategy>,
    ) -> Self {
        let root = CancellationToken::new();
        let (events, queue) = dispatcher::channel();
        let core = SessionCore {
            state: SessionState::Disconnected,
            connection: None,
            attempt: 0,
            epoch: root.child_token(),
            closed: false,
        };

        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                handler,
                strategy,
                core: Mutex::new(core),
                root,
                events: Mutex::new(Some(events)),
                queue: Mutex::new(Some(queue)),
            }),
        }
    }

    /// Connect to the configured target
    ///
    /// Only valid from `Disconnected`. A failed initial connect is returned to
    /// the caller and never retried; reconnection only follows a drop.
    pub async fn connect(&self) -> Result<()> {
        let epoch = {
            let mut core = self.inner.core.lock();
            if core.closed {
                return Err(SocketError::SessionClosed);
            }
            if core.state != SessionState::Disconnected {
                return Err(SocketError::AlreadyConnected);
            }
            core.transition(SessionState::Connecting)?;
            core.epoch.clone()
        };

        self.inner.ensure_worker();

        match SessionInner::dial(&self.inner, &epoch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut core = self.inner.core.lock();
                if !epoch.is_cancelled() && core.state == SessionState::Connecting {
                    core.settle_disconnected();
                }
                Err(e)
            }
        }
    }

    /// Drop the connection and stop reconnecting
    ///
    /// The session can `connect()` again afterwards. `on_disconnect(None)`
    /// fires only if it was connected.
    pub async fn disconnect(&self) {
        let connection = {
            let mut core = self.inner.core.lock();
            if core.closed {
                return;
            }

            let fresh = self.inner.root.child_token();
            std::mem::replace(&mut core.epoch, fresh).cancel();

            if core.settle_disconnected() == SessionState::Connected {
                self.inner.emit(ClientEvent::Disconnected(None));
            }
            core.connection.take()
        };

        if let Some(connection) = connection {
            connection.close().await;
            info!(target = %self.inner.config.address, "Disconnected");
        }
    }

    /// Terminal close
    ///
    /// Cancels everything the session started and releases the connection.
    /// Events already queued are still delivered; later calls on the session
    /// fail with [`SocketError::SessionClosed`].
    pub async fn close(&self) {
        let connection = {
            let mut core = self.inner.core.lock();
            if core.closed {
                return;
            }
            core.closed = true;
            self.inner.root.cancel();

            if core.settle_disconnected() == SessionState::Connected {
                self.inner.emit(ClientEvent::Disconnected(None));
            }
            // Dropping the sender lets the worker drain and exit
            self.inner.events.lock().take();
            self.inner.queue.lock().take();
            core.connection.take()
        };

        if let Some(connection) = connection {
            connection.close().await;
        }
        info!(target = %self.inner.config.address, "Session closed");
    }

    /// Send on the current connection, bounded by the write timeout
    ///
    /// A failed write tears the connection down exactly like a read failure,
    /// which fires the disconnect callbacks and starts reconnection.
    pub async fn send(&self, message: Message) -> Result<()> {
        let connection = {
            let core = self.inner.core.lock();
            if core.closed {
                return Err(SocketError::SessionClosed);
            }
            if core.state != SessionState::Connected {
                return Err(SocketError::NotConnected);
            }
            core.connection.clone().ok_or(SocketError::NotConnected)?
        };

        connection.send(message).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Serialize `value` as JSON and send it as text
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(Message::json(value)?).await
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.inner.core.lock().state
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.inner.core.lock().closed
    }

    /// Attempts made since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.core.lock().attempt
    }

    pub fn target(&self) -> &str {
        &self.inner.config.address
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl SessionInner {
    /// Enqueue a callback; dropped once the session is closed
    fn emit(&self, event: ClientEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            events.dispatch(event);
        }
    }

    fn ensure_worker(&self) {
        if let Some(queue) = self.queue.lock().take() {
            tokio::spawn(queue.run(Arc::clone(&self.handler)));
        }
    }

    /// Dial, then install the connection unless `epoch` was cancelled meanwhile
    ///
    /// Expects the state to be `Connecting`.
    async fn dial(self: &Arc<Self>, epoch: &CancellationToken) -> Result<()> {
        let address = self.config.address.clone();
        let timeout = self.config.connect_timeout();
        debug!(target = %address, transport = self.transport.name(), "Dialing");

        let parts = tokio::select! {
            biased;
            _ = epoch.cancelled() => return Err(SocketError::Cancelled),
            result = tokio::time::timeout(timeout, self.transport.connect(&address)) => match result {
                Ok(result) => result?,
                Err(_) => {
                    return Err(SocketError::ConnectTimeout {
                        address,
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
        };

        let (connection, reader) = Connection::establish(
            parts,
            self.transport.framed(),
            self.config.write_timeout(),
            epoch.child_token(),
        );

        let installed = {
            let mut core = self.core.lock();
            if epoch.is_cancelled() {
                false
            } else if let Err(e) = core.transition(SessionState::Connected) {
                debug!(target = %address, error = %e, "Dial finished outside Connecting");
                false
            } else {
                core.connection = Some(Arc::clone(&connection));
                core.attempt = 0;
                self.emit(ClientEvent::Connected);
                true
            }
        };

        if !installed {
            connection.close().await;
            return Err(SocketError::Cancelled);
        }

        info!(
            target = %address,
            id = %connection.id(),
            transport = self.transport.name(),
            "Connected"
        );

        if connection.is_framed() {
            if let Some(interval) = self.config.ping_interval() {
                spawn_heartbeat(Arc::clone(&connection), interval, None);
            }
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.read_loop(connection, reader).await });
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, connection: Arc<Connection>, reader: Box<dyn FrameReader>) {
        let deadline = ReadDeadline::for_connection(
            connection.is_framed(),
            self.config.ping_interval(),
            self.config.pong_wait(),
            self.config.read_timeout(),
        );
        let events = self.events.lock().clone();

        let exit = read_pump(&connection, reader, deadline, |message| {
            if let Some(events) = &events {
                events.dispatch(ClientEvent::Message(message));
            }
        })
        .await;
        drop(events);

        let cause = match exit {
            ReadExit::Local(Some(cause)) | ReadExit::Failed(cause) => cause,
            ReadExit::PeerClosed => {
                SocketError::TransportRead("connection closed by peer".to_string())
            }
            // disconnect() or close() already settled the state
            ReadExit::Local(None) => return,
        };

        connection.close_with(Some(cause.clone())).await;
        self.connection_lost(&connection, cause);
    }

    /// Move a dropped connection's session to `Reconnecting`, or `Disconnected`
    /// when auto-reconnect is off
    fn connection_lost(self: &Arc<Self>, connection: &Arc<Connection>, cause: SocketError) {
        let epoch = {
            let mut core = self.core.lock();
            let current = core
                .connection
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(c, connection));
            if !current || core.state != SessionState::Connected {
                return;
            }

            let next = if self.config.auto_reconnect {
                SessionState::Reconnecting
            } else {
                SessionState::Disconnected
            };
            if let Err(e) = core.transition(next) {
                debug!(error = %e, "Ignoring connection loss");
                return;
            }
            core.connection = None;
            self.emit(ClientEvent::Disconnected(Some(cause.clone())));
            self.emit(ClientEvent::Error(cause.clone()));
            core.epoch.clone()
        };

        warn!(target = %self.config.address, error = %cause, "Connection lost");

        if self.config.auto_reconnect {
            tokio::spawn(Arc::clone(self).reconnect_loop(epoch));
        }
    }

    async fn reconnect_loop(self: Arc<Self>, epoch: CancellationToken) {
        loop {
            let used = self.core.lock().attempt;

            let Some(delay) = self.strategy.next_delay(used) else {
                let mut core = self.core.lock();
                if epoch.is_cancelled() {
                    return;
                }
                core.settle_disconnected();
                self.emit(ClientEvent::Error(SocketError::ReconnectAttemptsExhausted {
                    attempts: used,
                }));
                warn!(target = %self.config.address, attempts = used, "Giving up reconnecting");
                return;
            };

            tokio::select! {
                _ = epoch.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let attempt = {
                let mut core = self.core.lock();
                // Only a reconnecting session may dial again
                if epoch.is_cancelled()
                    || core.state != SessionState::Reconnecting
                    || core.transition(SessionState::Connecting).is_err()
                {
                    return;
                }
                core.attempt += 1;
                core.attempt
            };

            info!(target = %self.config.address, attempt, "Reconnecting");

            match Self::dial(&self, &epoch).await {
                Ok(()) => return,
                Err(SocketError::Cancelled) => return,
                Err(e) => {
                    let mut core = self.core.lock();
                    if epoch.is_cancelled() {
                        return;
                    }
                    if let Err(e) = core.transition(SessionState::Reconnecting) {
                        debug!(attempt, error = %e, "Reconnect loop stopping");
                        return;
                    }
                    debug!(attempt, error = %e, "Reconnect attempt failed");
                    self.emit(ClientEvent::Error(SocketError::ReconnectAttemptFailed {
                        attempt,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}
