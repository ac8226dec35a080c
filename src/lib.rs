//! # board-collab — real-time collaborative whiteboard server
//!
//! A WebSocket broker that owns authoritative per-room state (participants,
//! cursors, drawing strokes), validates client mutations, and fans them out
//! to peers with ordering and rate-limiting guarantees. Multiple independent
//! rooms coexist in one process.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   WebSocket (JSON)   ┌─────────────┐
//! │ Client A │ ◄──────────────────► │ WsSession A │──┐
//! └──────────┘                      └─────────────┘  │
//! ┌──────────┐                      ┌─────────────┐  │   ┌──────────────┐
//! │ Client B │ ◄──────────────────► │ WsSession B │──┼──►│ Dispatcher   │
//! └──────────┘                      └─────────────┘  │   └──────┬───────┘
//!                                                    │          │
//!                                                    │   ┌──────▼───────┐
//!                                                    │   │ RoomRegistry │
//!                                                    │   │  board /     │
//!                                                    │   │  presence    │
//!                                                    │   └──────┬───────┘
//!                                                    │          │
//!                                                    │   ┌──────▼───────┐
//!                                                    └───│ Room         │
//!                                      per-session       │  members     │
//!                                      outboxes ◄────────│  cursors     │
//!                                                        │  strokes     │
//!                                                        └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — message types, error codes, normative constants
//! - [`codec`] — JSON envelope parse/validate + outbound constructors
//! - [`ids`] — uuid / short-hex / prefixed id helpers
//! - [`limiter`] — token-bucket rate limiting with optional muting
//! - [`room`] — authoritative per-room state and broadcast primitive
//! - [`board`] — stroke lifecycle and snapshots
//! - [`presence`] — cursor updates, rate gating, ghost detection
//! - [`registry`] — room lookup, join/leave, grace-period deletion
//! - [`dispatch`] — per-frame routing and error policy
//! - [`session`] — one WebSocket connection
//! - [`server`] — TCP accept and the `/health` branch

pub mod board;
pub mod codec;
pub mod dispatch;
pub mod ids;
pub mod limiter;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;

// Re-exports for convenience
pub use board::BoardService;
pub use dispatch::{MessageDispatcher, SessionCtx};
pub use limiter::{MutingRateLimiter, RateLimiter};
pub use presence::PresenceService;
pub use protocol::{constants, ErrorCode, MessageType};
pub use registry::{JoinSuccess, RegistryConfig, RoomRegistry};
pub use room::{CursorState, FrameKind, Point, Room, SessionHandle, Stroke, UserInfo};
pub use server::{BoardServer, ServerConfig, ServerError};
pub use session::SessionConfig;
