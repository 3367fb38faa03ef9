//! Callback dispatch
//!
//! I/O loops never call user handlers directly. They push events into an
//! unbounded queue drained by a single worker task, so a slow handler cannot
//! stall a read loop and events for one queue are delivered strictly in
//! order, one at a time.
//!
//! ```text
//! read loop ──┐
//! heartbeat ──┼──> unbounded mpsc ──> dispatch worker ──> handler.on_*()
//! session   ──┘
//! ```
//!
//! The worker exits once every sender is dropped and the queue is drained.

use crate::core::connection::Connection;
use crate::error::SocketError;
use crate::handler::{ClientHandler, ServerHandler};
use crate::message::Message;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Events delivered to a [`ClientHandler`]
#[derive(Debug)]
pub(crate) enum ClientEvent {
    Connected,
    Disconnected(Option<SocketError>),
    Message(Message),
    Error(SocketError),
}

/// Events delivered to a [`ServerHandler`]
#[derive(Debug)]
pub(crate) enum ServerEvent {
    Connected(Arc<Connection>),
    Disconnected(Arc<Connection>, Option<SocketError>),
    Message(Arc<Connection>, Message),
    Error(SocketError),
}

/// Something that can consume events of type `E`
#[async_trait]
pub(crate) trait EventTarget<E>: Send + Sync + 'static {
    async fn deliver(&self, event: E);
}

#[async_trait]
impl EventTarget<ClientEvent> for Arc<dyn ClientHandler> {
    async fn deliver(&self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => self.on_connect().await,
            ClientEvent::Disconnected(cause) => self.on_disconnect(cause).await,
            ClientEvent::Message(message) => self.on_message(message).await,
            ClientEvent::Error(error) => self.on_error(error).await,
        }
    }
}

#[async_trait]
impl EventTarget<ServerEvent> for Arc<dyn ServerHandler> {
    async fn deliver(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected(conn) => self.on_connect(conn).await,
            ServerEvent::Disconnected(conn, cause) => self.on_disconnect(conn, cause).await,
            ServerEvent::Message(conn, message) => self.on_message(conn, message).await,
            ServerEvent::Error(error) => self.on_error(error).await,
        }
    }
}

/// Producer side of a dispatch queue
pub(crate) struct Dispatcher<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer side of a dispatch queue, turned into a worker with [`DispatchQueue::run`]
pub(crate) struct DispatchQueue<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

/// Create a queue; no task is spawned until the consumer is run
pub(crate) fn channel<E>() -> (Dispatcher<E>, DispatchQueue<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Dispatcher { tx }, DispatchQueue { rx })
}

impl<E: Send + std::fmt::Debug + 'static> Dispatcher<E> {
    /// Enqueue without blocking; events sent after the worker is gone are dropped
    pub(crate) fn dispatch(&self, event: E) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            trace!(?event, "Dispatch worker gone, dropping event");
        }
    }
}

impl<E: Send + 'static> DispatchQueue<E> {
    /// Deliver events one at a time until every sender is dropped
    ///
    /// A panicking handler is logged and the worker moves on to the next event.
    pub(crate) async fn run<T: EventTarget<E>>(mut self, target: T) {
        while let Some(event) = self.rx.recv().await {
            let delivery = AssertUnwindSafe(target.deliver(event)).catch_unwind();
            if delivery.await.is_err() {
                error!("Event handler panicked; continuing with next event");
            }
        }
        trace!("Dispatch worker exiting");
    }
}
