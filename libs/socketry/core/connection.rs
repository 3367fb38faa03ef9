//! One established connection, client or server side

use crate::core::connection_state::ConnState;
use crate::error::{Result, SocketError};
use crate::message::Message;
use crate::transport::{FrameReader, FrameWriter, TransportParts};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

struct Lifecycle {
    state: ConnState,
    close_cause: Option<SocketError>,
}

/// A live transport plus identity metadata
///
/// The connection exclusively owns the outbound half of its transport. Once
/// [`close`](Connection::close) has run, the writer is dropped and every
/// later send fails with [`SocketError::ConnectionClosed`].
///
/// Close is safe to call from any number of tasks at once: the first caller
/// tears the transport down, everyone else returns immediately.
pub struct Connection {
    id: String,
    remote_addr: String,
    user_agent: Option<String>,
    established_at: DateTime<Utc>,
    started: Instant,
    framed: bool,
    write_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
    writer: tokio::sync::Mutex<Option<Box<dyn FrameWriter>>>,
    cancel: CancellationToken,
}

impl Connection {
    /// Wrap freshly handshaken transport halves
    ///
    /// Returns the connection and the inbound half, which belongs to whoever
    /// runs the read loop. `cancel` fires when the connection closes and
    /// should be a child of the owner's token so owner shutdown reaches it.
    pub(crate) fn establish(
        parts: TransportParts,
        framed: bool,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> (Arc<Self>, Box<dyn FrameReader>) {
        let TransportParts {
            reader,
            writer,
            remote_addr,
            user_agent,
        } = parts;

        let connection = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            user_agent,
            established_at: Utc::now(),
            started: Instant::now(),
            framed,
            write_timeout,
            lifecycle: Mutex::new(Lifecycle {
                state: ConnState::Open,
                close_cause: None,
            }),
            writer: tokio::sync::Mutex::new(Some(writer)),
            cancel,
        });

        (connection, reader)
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// `User-Agent` from the upgrade request, when the peer sent one
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the underlying transport has frames and control messages
    pub fn is_framed(&self) -> bool {
        self.framed
    }

    pub fn state(&self) -> ConnState {
        self.lifecycle.lock().state
    }

    /// True once close has started
    pub fn is_closed(&self) -> bool {
        self.state() != ConnState::Open
    }

    /// The error that closed this connection, if any
    pub fn close_cause(&self) -> Option<SocketError> {
        self.lifecycle.lock().close_cause.clone()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Write one message, bounded by the write timeout
    ///
    /// A failed or timed-out write closes the connection with that error as
    /// the cause, so the read loop observes the same failure.
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(SocketError::ConnectionClosed(self.id.clone()));
        }

        let result = {
            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(SocketError::ConnectionClosed(self.id.clone()));
            };
            match tokio::time::timeout(self.write_timeout, writer.send(message)).await {
                Ok(result) => result,
                Err(_) => Err(SocketError::TransportWrite(format!(
                    "write timed out after {}ms",
                    self.write_timeout.as_millis()
                ))),
            }
        };

        if let Err(e) = &result {
            debug!(id = %self.id, error = %e, "Send failed, closing connection");
            self.close_with(Some(e.clone())).await;
        }
        result
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

    /// Graceful close
    pub async fn close(&self) {
        self.close_with(None).await;
    }

    /// Close and record `cause`
    ///
    /// Returns `true` for the caller that performed the teardown.
    pub(crate) async fn close_with(&self, cause: Option<SocketError>) -> bool {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != ConnState::Open {
                return false;
            }
            lifecycle.state = ConnState::Closing;
            lifecycle.close_cause = cause;
        }

        self.cancel.cancel();

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match tokio::time::timeout(self.write_timeout, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(id = %self.id, error = %e, "Transport close failed"),
                Err(_) => debug!(id = %self.id, "Transport close timed out"),
            }
        }

        self.lifecycle.lock().state = ConnState::Closed;
        debug!(id = %self.id, remote = %self.remote_addr, "Connection closed");
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("established_at", &self.established_at)
            .field("state", &self.state())
            .finish()
    }
}
