//! Seams to the wire-level protocol layer.
//!
//! The game-protocol codec (framing, handshake, encryption) is not part of
//! this crate. The routing core talks to it through two narrow traits:
//! [`ProxyListener`] hands out accepted connections and [`ClientConnection`]
//! exposes the per-connection operations the core needs (identity, packet
//! I/O, disconnect with a user-visible message).
//!
//! `JsonLineListener` is the development transport used by the default
//! binary and the test suite: one JSON object per line, with the first line
//! acting as the handshake carrying the client's identity data.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ProxyError;

/// How long a freshly accepted connection gets to complete its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Packet id a client uses to ask for a transfer to a named server. The
/// packet data is `{"server": "<name>"}`.
pub const TRANSFER_REQUEST_ID: u32 = 1;

/// One protocol-level packet, opaque to the routing core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Packet {
    pub id: u32,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Packet {
    pub fn new(id: u32, data: serde_json::Value) -> Self {
        Self { id, data }
    }
}

/// Wraps a user-visible failure message in the protocol's legacy red
/// formatting code.
pub fn red(message: &str) -> String {
    format!("\u{a7}c{message}\u{a7}r")
}

/// One accepted client connection.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    /// Display name from the connection's claimed identity data.
    fn display_name(&self) -> &str;

    fn remote_addr(&self) -> SocketAddr;

    /// Next packet from the client. `Ok(None)` means the client closed the
    /// connection cleanly.
    async fn read_packet(&self) -> Result<Option<Packet>, ProxyError>;

    async fn send_packet(&self, packet: &Packet) -> Result<(), ProxyError>;

    /// Terminates the connection with a short status message shown to the
    /// user. Best effort; the connection is gone afterwards either way.
    async fn disconnect(&self, message: &str);
}

/// Accept side of the transport.
#[async_trait]
pub trait ProxyListener: Send + Sync {
    async fn accept(&self) -> Result<Arc<dyn ClientConnection>, ProxyError>;
}

#[derive(Debug, Deserialize)]
struct Handshake {
    display_name: String,
}

#[derive(Debug, Serialize)]
struct DisconnectNotice<'a> {
    disconnect: &'a str,
}

/// Development transport: newline-delimited JSON over TCP.
pub struct JsonLineListener {
    inner: TcpListener,
}

impl JsonLineListener {
    /// Binds the listener. A bind failure here is fatal for the proxy.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProxyError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Network(format!("failed to bind listener on {addr}: {e}")))?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.inner.local_addr()?)
    }
}

#[async_trait]
impl ProxyListener for JsonLineListener {
    /// Waits for the next connection that completes its handshake. A
    /// connection failing the handshake is dropped and logged; only a
    /// listener-level failure is returned as an error.
    async fn accept(&self) -> Result<Arc<dyn ClientConnection>, ProxyError> {
        loop {
            let (stream, addr) = self.inner.accept().await?;
            match JsonLineConnection::handshake(stream, addr).await {
                Ok(conn) => return Ok(Arc::new(conn)),
                Err(e) => debug!("Connection from {} dropped during handshake: {}", addr, e),
            }
        }
    }
}

/// A single client connection on the development transport.
pub struct JsonLineConnection {
    display_name: String,
    remote_addr: SocketAddr,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
}

impl JsonLineConnection {
    /// Reads the handshake line and produces a ready connection.
    async fn handshake(stream: TcpStream, remote_addr: SocketAddr) -> Result<Self, ProxyError> {
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut line = String::new();
        let read = timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| ProxyError::Network(format!("handshake timed out from {remote_addr}")))?;
        read.map_err(|e| ProxyError::Network(format!("handshake read failed from {remote_addr}: {e}")))?;

        let handshake: Handshake = serde_json::from_str(line.trim())
            .map_err(|e| ProxyError::Network(format!("malformed handshake from {remote_addr}: {e}")))?;

        Ok(Self {
            display_name: handshake.display_name,
            remote_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(write_half),
        })
    }

    async fn write_line(&self, line: String) -> Result<(), ProxyError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ClientConnection for JsonLineConnection {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    async fn read_packet(&self) -> Result<Option<Packet>, ProxyError> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let packet = serde_json::from_str(line.trim())
            .map_err(|e| ProxyError::Network(format!("malformed packet: {e}")))?;
        Ok(Some(packet))
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ProxyError> {
        let line = serde_json::to_string(packet)
            .map_err(|e| ProxyError::Internal(format!("packet serialization failed: {e}")))?;
        self.write_line(line).await
    }

    async fn disconnect(&self, message: &str) {
        let notice = DisconnectNotice { disconnect: message };
        if let Ok(line) = serde_json::to_string(&notice) {
            if let Err(e) = self.write_line(line).await {
                debug!("Disconnect notice to {} not delivered: {}", self.remote_addr, e);
            }
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn listener() -> (JsonLineListener, SocketAddr) {
        let listener = JsonLineListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_handshake_and_packet_roundtrip() {
        let (listener, addr) = listener().await;

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"{\"display_name\":\"Steve\"}\n")
                .await
                .unwrap();
            stream
                .write_all(b"{\"id\":7,\"data\":{\"x\":1}}\n")
                .await
                .unwrap();

            let mut reader = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line
        });

        let conn = listener.accept().await.unwrap();
        assert_eq!(conn.display_name(), "Steve");

        let packet = conn.read_packet().await.unwrap().unwrap();
        assert_eq!(packet.id, 7);
        assert_eq!(packet.data["x"], 1);

        conn.send_packet(&Packet::new(12, serde_json::json!({"pong": true})))
            .await
            .unwrap();

        let echoed: Packet = serde_json::from_str(client.await.unwrap().trim()).unwrap();
        assert_eq!(echoed.id, 12);
        assert_eq!(echoed.data["pong"], true);
        assert!(conn.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_handshake_is_skipped() {
        let (listener, addr) = listener().await;

        tokio::spawn(async move {
            let mut bad = TcpStream::connect(addr).await.unwrap();
            bad.write_all(b"not json\n").await.unwrap();
            drop(bad);

            let mut good = TcpStream::connect(addr).await.unwrap();
            good.write_all(b"{\"display_name\":\"Alex\"}\n")
                .await
                .unwrap();
            // Hold the good connection open until the listener has seen it.
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        // The malformed connection never surfaces; the next good one does.
        let conn = listener.accept().await.unwrap();
        assert_eq!(conn.display_name(), "Alex");
    }

    #[tokio::test]
    async fn test_disconnect_sends_notice() {
        let (listener, addr) = listener().await;

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"{\"display_name\":\"Steve\"}\n")
                .await
                .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).await.unwrap();
            response
        });

        let conn = listener.accept().await.unwrap();
        conn.disconnect(&red("Server is whitelisted")).await;

        let response = client.await.unwrap();
        assert!(response.contains("Server is whitelisted"));
        assert!(response.contains("\u{a7}c"));
    }
}
