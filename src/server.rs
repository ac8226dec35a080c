//! WebSocket board server: TCP accept loop and the `/health` HTTP branch.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── Room (room_id) ── strokes / cursors / members
//! Client B ──┘          │
//!                       └── broadcast → per-session outboxes
//! ```
//!
//! Each accepted connection is sniffed once: `GET /health` is answered with
//! a plain-text 200 and closed; anything else is handed to the WebSocket
//! session. One tokio task per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::protocol::constants;
use crate::registry::{RegistryConfig, RoomRegistry};
use crate::session::{self, SessionConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Outbox depth per session.
    pub outbox_capacity: usize,
    /// Session heartbeat timeout.
    pub heartbeat_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// How long empty rooms survive before deletion.
    pub grace_period: Duration,
    /// Escalate repeat cursor-rate offenders to a timed mute.
    pub mute_repeat_offenders: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            outbox_capacity: 256,
            heartbeat_timeout: Duration::from_millis(constants::HEARTBEAT_TIMEOUT_MS),
            max_message_size: constants::MAX_MESSAGE_SIZE,
            grace_period: Duration::from_millis(constants::ROOM_GRACE_PERIOD_MS),
            mute_repeat_offenders: false,
        }
    }
}

/// Server failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The board server.
pub struct BoardServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
}

impl BoardServer {
    /// Create a server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(RegistryConfig {
            grace_period: config.grace_period,
            mute_repeat_offenders: config.mute_repeat_offenders,
        }));
        Self { config, registry }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The shared room registry.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.registry.clone()
    }

    /// Bind and run the accept loop. Runs until the task is cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener =
            TcpListener::bind(&self.config.bind_addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: self.config.bind_addr.clone(),
                    source,
                })?;
        log::info!("board server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("accept failed: {e}");
                    continue;
                }
            };
            log::debug!("new tcp connection from {addr}");

            let registry = self.registry.clone();
            let session_config = SessionConfig {
                outbox_capacity: self.config.outbox_capacity,
                heartbeat_timeout: self.config.heartbeat_timeout,
                max_message_size: self.config.max_message_size,
            };
            tokio::spawn(async move {
                handle_connection(stream, addr, registry, session_config).await;
            });
        }
    }
}

/// Route one accepted connection: health probe or WebSocket session.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    config: SessionConfig,
) {
    // Sniff the request head without consuming it, so the WebSocket
    // handshake can still read the request itself.
    let mut head = [0u8; 1024];
    let sniffed = match stream.peek(&mut head).await {
        Ok(n) => &head[..n],
        Err(e) => {
            log::debug!("peek failed for {addr}: {e}");
            return;
        }
    };

    if sniffed.starts_with(b"GET /health ") {
        if let Err(e) = respond_health(&mut stream).await {
            log::debug!("health response failed for {addr}: {e}");
        }
        return;
    }

    if let Err(e) = session::run(stream, addr, registry, config).await {
        log::debug!("session error from {addr}: {e}");
    }
}

/// Consume the health request and answer `200 OK text/plain "OK"`.
async fn respond_health(stream: &mut TcpStream) -> std::io::Result<()> {
    // Body limit 1 KiB; a health probe fits in one read.
    let mut request = [0u8; 1024];
    let _ = stream.read(&mut request).await?;

    let response = "HTTP/1.1 200 OK\r\n\
                    Server: board-collab/0.1\r\n\
                    Content-Type: text/plain\r\n\
                    Content-Length: 2\r\n\
                    Connection: close\r\n\
                    \r\n\
                    OK";
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.outbox_capacity, 256);
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.max_message_size, 65536);
        assert_eq!(config.grace_period, Duration::from_secs(60));
        assert!(!config.mute_repeat_offenders);
    }

    #[test]
    fn test_server_creation() {
        let server = BoardServer::with_defaults();
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(server.registry().room_count(), 0);
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:9999".to_string(),
            grace_period: Duration::from_secs(5),
            ..ServerConfig::default()
        };
        let server = BoardServer::new(config);
        assert_eq!(server.bind_addr(), "127.0.0.1:9999");
    }
}
