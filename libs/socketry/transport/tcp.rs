//! Raw TCP byte stream
//!
//! Each read yields whatever bytes arrived, copied out of a reused buffer of
//! `read_buffer_size` bytes, as one `Binary` message. Callers that need
//! message boundaries must frame the stream themselves. Text and binary
//! messages are written as plain bytes; control frames do not exist on a raw
//! stream and are silently skipped.

use crate::core::config::{ClientConfig, ServerConfig};
use crate::error::{Result, SocketError};
use crate::message::Message;
use crate::transport::{FrameReader, FrameWriter, Transport, TransportParts};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

const DEFAULT_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct TcpTransport {
    read_buffer_size: usize,
    write_buffer_size: usize,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_SIZE)
    }
}

impl TcpTransport {
    pub fn new(read_buffer_size: usize, write_buffer_size: usize) -> Self {
        Self {
            read_buffer_size: read_buffer_size.max(1),
            write_buffer_size: write_buffer_size.max(1),
        }
    }

    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self::new(config.read_buffer_size, config.write_buffer_size)
    }

    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self::new(config.read_buffer_size, config.write_buffer_size)
    }

    fn split(&self, stream: TcpStream, remote_addr: String) -> TransportParts {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(remote = %remote_addr, error = %e, "Failed to set TCP_NODELAY");
        }
        let (read_half, write_half) = stream.into_split();

        TransportParts {
            reader: Box::new(TcpReader {
                half: read_half,
                buf: vec![0u8; self.read_buffer_size],
            }),
            writer: Box::new(TcpWriter {
                half: BufWriter::with_capacity(self.write_buffer_size, write_half),
            }),
            remote_addr,
            user_agent: None,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn framed(&self) -> bool {
        false
    }

    async fn connect(&self, target: &str) -> Result<TransportParts> {
        let stream = TcpStream::connect(target)
            .await
            .map_err(|e| SocketError::Handshake {
                address: target.to_string(),
                reason: e.to_string(),
            })?;
        let remote_addr = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| target.to_string());

        Ok(self.split(stream, remote_addr))
    }

    async fn accept(&self, stream: TcpStream, peer: SocketAddr) -> Result<TransportParts> {
        Ok(self.split(stream, peer.to_string()))
    }
}

struct TcpReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

#[async_trait]
impl FrameReader for TcpReader {
    async fn next(&mut self) -> Option<Result<Message>> {
        match self.half.read(&mut self.buf).await {
            Ok(0) => None,
            // Copy out: the buffer is reused by the next read
            Ok(n) => Some(Ok(Message::Binary(self.buf[..n].to_vec()))),
            Err(e) => Some(Err(SocketError::TransportRead(e.to_string()))),
        }
    }
}

struct TcpWriter {
    half: BufWriter<OwnedWriteHalf>,
}

#[async_trait]
impl FrameWriter for TcpWriter {
    async fn send(&mut self, message: Message) -> Result<()> {
        let bytes = match &message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data.as_slice(),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => return Ok(()),
        };

        self.half
            .write_all(bytes)
            .await
            .map_err(|e| SocketError::TransportWrite(e.to_string()))?;
        self.half
            .flush()
            .await
            .map_err(|e| SocketError::TransportWrite(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.half
            .shutdown()
            .await
            .map_err(|e| SocketError::TransportWrite(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reads_are_owned_copies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = TcpTransport::new(8, 8);

        let client = tokio::spawn({
            let transport = transport.clone();
            async move { transport.connect(&addr.to_string()).await.unwrap() }
        });
        let (stream, peer) = listener.accept().await.unwrap();
        let mut server = transport.accept(stream, peer).await.unwrap();
        let mut client = client.await.unwrap();

        client.writer.send(Message::Text("abcdefgh".into())).await.unwrap();
        let first = server.reader.next().await.unwrap().unwrap();

        client.writer.send(Message::Binary(b"12345678".to_vec())).await.unwrap();
        let second = server.reader.next().await.unwrap().unwrap();

        // The first payload must not observe the second read
        assert_eq!(first, Message::Binary(b"abcdefgh".to_vec()));
        assert_eq!(second, Message::Binary(b"12345678".to_vec()));

        // Control frames are skipped on a raw stream
        client.writer.send(Message::Ping(vec![1])).await.unwrap();
        client.writer.close().await.unwrap();
        assert!(server.reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_refused_is_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpTransport::default()
            .connect(&addr.to_string())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SocketError::Handshake { .. }));
    }
}
