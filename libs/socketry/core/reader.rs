//! Inbound read loop shared by client sessions and server connections

use crate::core::connection::Connection;
use crate::core::deadline::ReadDeadline;
use crate::error::{Result, SocketError};
use crate::message::Message;
use crate::transport::FrameReader;
use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Why a read loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadExit {
    /// The connection was closed locally; carries the recorded close cause
    Local(Option<SocketError>),
    /// The peer closed the stream or sent a close frame
    PeerClosed,
    /// Read error or deadline expiry
    Failed(SocketError),
}

async fn read_until(
    reader: &mut Box<dyn FrameReader>,
    deadline: Option<Instant>,
) -> std::result::Result<Option<Result<Message>>, Elapsed> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, reader.next()).await,
        None => Ok(reader.next().await),
    }
}

/// Consume inbound messages until the connection ends
///
/// Pongs extend the read deadline, pings are answered by the transport and
/// a close frame ends the loop. Every text or binary message is handed to
/// `on_message` in arrival order. The loop exits as soon as the connection's
/// cancellation token fires.
pub(crate) async fn read_pump<F>(
    connection: &Connection,
    mut reader: Box<dyn FrameReader>,
    mut deadline: ReadDeadline,
    mut on_message: F,
) -> ReadExit
where
    F: FnMut(Message),
{
    let cancel = connection.cancel_token().clone();

    loop {
        let at = deadline.next_read();
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadExit::Local(connection.close_cause()),
            next = read_until(&mut reader, at) => next,
        };

        let message = match next {
            Err(_) if deadline.is_heartbeat() => {
                debug!(
                    id = %connection.id(),
                    since_last_pong = ?deadline.time_since_last_pong(),
                    "No pong before deadline"
                );
                return ReadExit::Failed(SocketError::HeartbeatTimeout {
                    pong_wait_ms: deadline.limit_ms(),
                });
            }
            Err(_) => {
                return ReadExit::Failed(SocketError::TransportRead(format!(
                    "read timed out after {}ms",
                    deadline.limit_ms()
                )));
            }
            Ok(None) => return ReadExit::PeerClosed,
            Ok(Some(Err(e))) => return ReadExit::Failed(e),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Pong(_) => {
                trace!(id = %connection.id(), "Pong received");
                deadline.record_pong();
            }
            Message::Ping(_) => {}
            Message::Close(reason) => {
                trace!(id = %connection.id(), ?reason, "Close frame received");
                return ReadExit::PeerClosed;
            }
            data => on_message(data),
        }
    }
}
