//! Heartbeat for framed connections
//!
//! One task per connection sends a ping every interval. It never declares
//! the peer dead itself: pongs are seen by the read loop, which owns the read
//! deadline, and a missing pong surfaces there as a read timeout. A failed
//! ping write closes the connection through [`Connection::send`].

use crate::core::connection::Connection;
use crate::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Ping `connection` every `interval` until it closes
pub(crate) async fn heartbeat_task(connection: Arc<Connection>, interval: Duration) {
    let cancel = connection.cancel_token().clone();
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick - wait for the first interval
    ticker.tick().await;
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!(id = %connection.id(), ?interval, "Heartbeat started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if connection.is_closed() {
            break;
        }

        if let Err(e) = connection.send(Message::Ping(Vec::new())).await {
            debug!(id = %connection.id(), error = %e, "Heartbeat ping failed");
            break;
        }
    }

    debug!(id = %connection.id(), "Heartbeat exiting");
}

/// Spawn [`heartbeat_task`], tracked when a tracker is given
pub(crate) fn spawn_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    tracker: Option<&TaskTracker>,
) -> JoinHandle<()> {
    let task = heartbeat_task(connection, interval);
    match tracker {
        Some(tracker) => tracker.spawn(task),
        None => tokio::spawn(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::transport::{FrameReader, FrameWriter, TransportParts};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    struct IdleReader;

    #[async_trait]
    impl FrameReader for IdleReader {
        async fn next(&mut self) -> Option<Result<Message>> {
            None
        }
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<Message>>>);

    #[async_trait]
    impl FrameWriter for Recording {
        async fn send(&mut self, message: Message) -> Result<()> {
            self.0.lock().push(message);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_every_interval_until_closed() {
        let sent = Recording::default();
        let parts = TransportParts {
            reader: Box::new(IdleReader),
            writer: Box::new(sent.clone()),
            remote_addr: "test".into(),
            user_agent: None,
        };
        let (conn, _reader) =
            Connection::establish(parts, true, Duration::from_secs(1), CancellationToken::new());

        let handle = spawn_heartbeat(Arc::clone(&conn), Duration::from_secs(30), None);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(sent.0.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(sent.0.lock().len(), 3);
        assert!(sent.0.lock().iter().all(|m| matches!(m, Message::Ping(_))));

        conn.close().await;
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sent.0.lock().len(), 3);
    }
}
