//! WebSocket transport over tokio-tungstenite
//!
//! Frames map one to one onto [`Message`]. Incoming pings are answered by
//! tungstenite itself; they are still surfaced so the read loop can see them.

use crate::core::config::{ClientConfig, ServerConfig};
use crate::error::{Result, SocketError};
use crate::message::{CloseReason, Message};
use crate::transport::{FrameReader, FrameWriter, Transport, TransportParts};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{self, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct WsTransport {
    /// Upgrade path accepted by the server side; "/" accepts any path
    path: String,
    /// Extra headers for the client upgrade request
    headers: Vec<(String, String)>,
    read_buffer_size: usize,
    write_buffer_size: usize,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            headers: Vec::new(),
            read_buffer_size: 4096,
            write_buffer_size: 4096,
        }
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn from_client_config(config: &ClientConfig) -> Self {
        let mut transport = Self::new()
            .with_read_buffer_size(config.read_buffer_size)
            .with_write_buffer_size(config.write_buffer_size);
        for (key, value) in &config.headers {
            transport = transport.with_header(key, value);
        }
        transport
    }

    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self::new()
            .with_path(config.path.clone())
            .with_read_buffer_size(config.read_buffer_size)
            .with_write_buffer_size(config.write_buffer_size)
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.read_buffer_size = self.read_buffer_size;
        config.write_buffer_size = self.write_buffer_size;
        config
    }

    fn accepts_path(&self, path: &str) -> bool {
        self.path == "/" || self.path == path
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &'static str {
        "ws"
    }

    fn framed(&self) -> bool {
        true
    }

    async fn connect(&self, target: &str) -> Result<TransportParts> {
        let mut request = target
            .into_client_request()
            .map_err(|e| SocketError::InvalidAddress(format!("{}: {}", target, e)))?;

        // Apply headers to request
        for (key, value) in &self.headers {
            match (
                key.parse::<http::header::HeaderName>(),
                value.parse::<http::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                (Err(_), _) => warn!("Invalid header name: {}", key),
                (_, Err(_)) => warn!("Invalid header value for key '{}': {}", key, value),
            }
        }

        let (stream, _response) =
            tokio_tungstenite::connect_async_with_config(request, Some(self.ws_config()), true)
                .await
                .map_err(|e| SocketError::Handshake {
                    address: target.to_string(),
                    reason: e.to_string(),
                })?;

        let remote_addr = match stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| target.to_string()),
            _ => target.to_string(),
        };

        Ok(split(stream, remote_addr, None))
    }

    async fn accept(&self, stream: TcpStream, peer: SocketAddr) -> Result<TransportParts> {
        let mut user_agent = None;

        let callback = |request: &Request, response: Response| {
            let path = request.uri().path();
            if !self.accepts_path(path) {
                debug!(%peer, path, "Rejecting upgrade for unknown path");
                let mut rejection = ErrorResponse::new(Some("not found".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                return Err(rejection);
            }
            user_agent = request
                .headers()
                .get(http::header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            Ok(response)
        };

        let stream =
            tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(self.ws_config()))
                .await
                .map_err(|e| SocketError::Handshake {
                    address: peer.to_string(),
                    reason: e.to_string(),
                })?;

        Ok(split(stream, peer.to_string(), user_agent))
    }
}

fn split<S>(stream: WebSocketStream<S>, remote_addr: String, user_agent: Option<String>) -> TransportParts
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = stream.split();
    TransportParts {
        reader: Box::new(WsReader { stream }),
        writer: Box::new(WsWriter { sink }),
        remote_addr,
        user_agent,
    }
}

struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next(&mut self) -> Option<Result<Message>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(SocketError::TransportRead(e.to_string()))),
            };

            let message = match message {
                WsMessage::Text(text) => Message::Text(text.to_string()),
                WsMessage::Binary(data) => Message::Binary(data.to_vec()),
                WsMessage::Ping(data) => Message::Ping(data.to_vec()),
                WsMessage::Pong(data) => Message::Pong(data.to_vec()),
                WsMessage::Close(frame) => Message::Close(frame.map(|frame| CloseReason {
                    code: u16::from(frame.code),
                    reason: frame.reason.to_string(),
                })),
                // Raw frames only appear when writing, never when reading
                WsMessage::Frame(_) => continue,
            };
            return Some(Ok(message));
        }
    }
}

struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S> FrameWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: Message) -> Result<()> {
        let message = match message {
            Message::Text(text) => WsMessage::Text(text.into()),
            Message::Binary(data) => WsMessage::Binary(data.into()),
            Message::Ping(data) => WsMessage::Ping(data.into()),
            Message::Pong(data) => WsMessage::Pong(data.into()),
            Message::Close(reason) => WsMessage::Close(reason.map(|reason| CloseFrame {
                code: CloseCode::from(reason.code),
                reason: reason.reason.into(),
            })),
        };

        self.sink
            .send(message)
            .await
            .map_err(|e| SocketError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SocketError::TransportWrite(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_path_and_user_agent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = WsTransport::new().with_path("/feed");

        let server_task = tokio::spawn(async move {
            let mut results = Vec::new();
            for _ in 0..2 {
                let (stream, peer) = listener.accept().await.unwrap();
                results.push(server.accept(stream, peer).await.map(|parts| parts.user_agent));
            }
            results
        });

        let client = WsTransport::new().with_header("User-Agent", "socketry-test");
        assert!(client
            .connect(&format!("ws://{}/other", addr))
            .await
            .is_err());
        let mut parts = client.connect(&format!("ws://{}/feed", addr)).await.unwrap();
        parts.writer.close().await.unwrap();

        let results = server_task.await.unwrap();
        assert!(matches!(results[0], Err(SocketError::Handshake { .. })));
        assert_eq!(
            results[1].as_ref().ok().cloned().flatten().as_deref(),
            Some("socketry-test")
        );
    }

    #[test]
    fn test_buffer_sizes_follow_config() {
        let mut client = ClientConfig::new("ws://127.0.0.1:1");
        client.read_buffer_size = 16 * 1024;
        client.write_buffer_size = 8 * 1024;
        let ws = WsTransport::from_client_config(&client).ws_config();
        assert_eq!(ws.read_buffer_size, 16 * 1024);
        assert_eq!(ws.write_buffer_size, 8 * 1024);

        let server = ServerConfig {
            read_buffer_size: 32 * 1024,
            write_buffer_size: 2048,
            ..ServerConfig::default()
        };
        let ws = WsTransport::from_server_config(&server).ws_config();
        assert_eq!(ws.read_buffer_size, 32 * 1024);
        assert_eq!(ws.write_buffer_size, 2048);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = WsTransport::new().connect("not a url").await.err().unwrap();
        assert!(matches!(err, SocketError::InvalidAddress(_)));
    }
}
