//! One WebSocket connection: handshake, read loop, serialized writes,
//! heartbeat, and lifecycle cleanup.
//!
//! The session task owns both halves of the socket. All outbound traffic
//! (its own replies and broadcasts from peers) flows through the bounded
//! outbox created here, and the single `select!` loop drains it frame by
//! frame, so writes are totally ordered per session and at most one is in
//! flight. Sends into the outbox are non-blocking from any task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::dispatch::{MessageDispatcher, SessionCtx};
use crate::protocol::constants;
use crate::registry::RoomRegistry;
use crate::room::SessionHandle;

/// Per-session tuning, derived from the server configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Outbox depth before backpressure kicks in.
    pub outbox_capacity: usize,
    /// Close the session after this long without an inbound frame.
    pub heartbeat_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            heartbeat_timeout: Duration::from_millis(constants::HEARTBEAT_TIMEOUT_MS),
            max_message_size: constants::MAX_MESSAGE_SIZE,
        }
    }
}

/// How often the read loop checks the heartbeat deadline.
const HEARTBEAT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Accept the WebSocket handshake and drive the session until close.
///
/// Every exit path, including errors and the heartbeat timeout, releases
/// room membership before returning.
pub async fn run(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    config: SessionConfig,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(config.max_message_size))
        .max_frame_size(Some(config.max_message_size));
    let ws_stream =
        tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    log::debug!("websocket session established from {addr}");

    let (handle, mut outbox) = SessionHandle::channel(config.outbox_capacity);
    let kill = handle.clone();
    let dispatcher = MessageDispatcher::new(registry.clone());
    let mut ctx = SessionCtx::new(handle);

    let mut last_frame = Instant::now();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_CHECK_INTERVAL);

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_frame = Instant::now();
                        dispatcher.handle_frame(&mut ctx, text.as_str());
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_frame = Instant::now();
                        if ws_sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_frame = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::debug!("connection closed from {addr}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the protocol.
                        last_frame = Instant::now();
                    }
                    Some(Err(e)) => {
                        log::debug!("websocket error from {addr}: {e}");
                        break;
                    }
                }
            }

            outbound = outbox.recv() => {
                match outbound {
                    Some(frame) => {
                        if let Err(e) = ws_sender.send(Message::text(frame)).await {
                            log::debug!("write failed for {addr}: {e}");
                            break;
                        }
                    }
                    // Unreachable while ctx holds a sender clone.
                    None => break,
                }
            }

            _ = kill.killed() => {
                log::warn!("session {addr} disconnected for backpressure");
                break;
            }

            _ = heartbeat.tick() => {
                if last_frame.elapsed() >= config.heartbeat_timeout {
                    log::info!("heartbeat timeout for {addr}, closing session");
                    break;
                }
            }
        }
    }

    if let (Some(room_id), Some(user_id)) = (ctx.room_id.clone(), ctx.user_id.clone()) {
        registry.leave(&room_id, &user_id);
    }
    let _ = ws_sender.close().await;

    Ok(())
}
