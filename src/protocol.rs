//! Protocol vocabulary: message types, error codes, and normative constants.
//!
//! Messages are categorized as:
//! - Control: room management (join, welcome, user_joined, user_left)
//! - Presence: cursor position updates (loss-tolerant, high frequency)
//! - Drawing: stroke creation and updates (reliable, event-driven)
//! - State: board snapshots for late joiners
//! - Heartbeat: ping/pong connection health checks

use serde::{Deserialize, Serialize};

/// All WebSocket message types in the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Client → Server: request to join a room
    JoinRoom,
    /// Server → Client: successful join response
    Welcome,
    /// Server → All: new user joined
    UserJoined,
    /// Server → All: user disconnected
    UserLeft,
    /// Bidirectional: mouse position update
    CursorMove,
    /// Client → Server: begin new stroke
    StrokeStart,
    /// Client → Server: add points to stroke
    StrokeAdd,
    /// Client → Server: complete stroke
    StrokeEnd,
    /// Client → Server: move completed stroke by dx, dy
    StrokeMove,
    /// Server → Client: full board snapshot
    RoomState,
    /// Client → Server: keep-alive request
    Ping,
    /// Server → Client: keep-alive response
    Pong,
    /// Server → Client: error notification
    Error,
    /// Parsing failed or unrecognized type
    Unknown,
}

impl MessageType {
    /// Map a JSON `type` field value to a message type.
    ///
    /// Anything unrecognized becomes [`MessageType::Unknown`] rather than an
    /// error, so the dispatcher can apply its own policy.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "join_room" => Self::JoinRoom,
            "welcome" => Self::Welcome,
            "user_joined" => Self::UserJoined,
            "user_left" => Self::UserLeft,
            "cursor_move" => Self::CursorMove,
            "stroke_start" => Self::StrokeStart,
            "stroke_add" => Self::StrokeAdd,
            "stroke_end" => Self::StrokeEnd,
            "stroke_move" => Self::StrokeMove,
            "room_state" => Self::RoomState,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Wire string for this message type.
    ///
    /// Returns `None` for [`MessageType::Unknown`], which must never be
    /// serialized.
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            Self::JoinRoom => Some("join_room"),
            Self::Welcome => Some("welcome"),
            Self::UserJoined => Some("user_joined"),
            Self::UserLeft => Some("user_left"),
            Self::CursorMove => Some("cursor_move"),
            Self::StrokeStart => Some("stroke_start"),
            Self::StrokeAdd => Some("stroke_add"),
            Self::StrokeEnd => Some("stroke_end"),
            Self::StrokeMove => Some("stroke_move"),
            Self::RoomState => Some("room_state"),
            Self::Ping => Some("ping"),
            Self::Pong => Some("pong"),
            Self::Error => Some("error"),
            Self::Unknown => None,
        }
    }
}

/// Protocol-level error codes surfaced in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Requested room does not exist
    RoomNotFound,
    /// Room has reached max capacity
    RoomFull,
    /// Wrong room password
    InvalidPassword,
    /// JSON parsing failed
    MalformedMessage,
    /// Unknown message type
    InvalidMessageType,
    /// Required field not present
    MissingField,
    /// Field value out of range or wrong type
    InvalidField,
    /// Too many messages, temporarily muted
    RateLimited,
    /// Stroke ID not found or not owned by user
    InvalidStroke,
    /// Too many points in stroke
    StrokeTooLarge,
    /// Action requires being in a room first
    NotInRoom,
    /// Already joined a room
    AlreadyInRoom,
    /// Unexpected server error
    InternalError,
}

impl ErrorCode {
    /// Wire string for the `code` field of an error payload.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::RoomFull => "ROOM_FULL",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::MalformedMessage => "MALFORMED_MESSAGE",
            Self::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidField => "INVALID_FIELD",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidStroke => "INVALID_STROKE",
            Self::StrokeTooLarge => "STROKE_TOO_LARGE",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::AlreadyInRoom => "ALREADY_IN_ROOM",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Human-readable message for the `message` field of an error payload.
    pub fn message(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "The requested room does not exist",
            Self::RoomFull => "Room has reached maximum capacity (15 users)",
            Self::InvalidPassword => "Incorrect room password",
            Self::MalformedMessage => "Message format is invalid",
            Self::InvalidMessageType => "Unknown message type",
            Self::MissingField => "Required field is missing",
            Self::InvalidField => "Field value is invalid",
            Self::RateLimited => "Too many messages, please slow down",
            Self::InvalidStroke => "Stroke not found or not owned by you",
            Self::StrokeTooLarge => "Stroke contains too many points",
            Self::NotInRoom => "You must join a room first",
            Self::AlreadyInRoom => "You are already in a room",
            Self::InternalError => "An unexpected server error occurred",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Normative protocol constants.
pub mod constants {
    /// Maximum participants in one room.
    pub const MAX_USERS_PER_ROOM: usize = 15;
    /// Maximum strokes retained per room; oldest are evicted first.
    pub const MAX_STROKES_PER_ROOM: usize = 1000;
    /// Strokes included in a `room_state` snapshot.
    pub const SNAPSHOT_STROKE_LIMIT: usize = 500;

    /// Maximum inbound WebSocket message size in bytes.
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
    /// Maximum points a single stroke may accumulate.
    pub const MAX_POINTS_PER_STROKE: usize = 10_000;

    /// Expected client ping cadence.
    pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;
    /// Close the session after this long without an inbound frame.
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 30_000;
    /// A member inactive this long is considered a ghost.
    pub const GHOST_CURSOR_TIMEOUT_MS: u64 = 3_000;
    /// Mute duration applied to repeat rate-limit offenders.
    pub const RATE_LIMIT_MUTE_DURATION_MS: u64 = 10_000;
    /// Empty rooms are preserved this long before deletion.
    pub const ROOM_GRACE_PERIOD_MS: u64 = 60_000;

    /// Cursor token-bucket refill rate.
    pub const CURSOR_UPDATES_PER_SECOND: f64 = 20.0;
    /// Cursor token-bucket burst capacity.
    pub const RATE_LIMIT_BURST_SIZE: f64 = 5.0;
    /// Consecutive rate-limit violations before a mute kicks in.
    pub const VIOLATIONS_BEFORE_MUTE: u32 = 3;

    /// Fixed per-user color palette, assigned round-robin across the process.
    pub const COLOR_PALETTE: [&str; 15] = [
        "#FF5733", "#33FF57", "#3357FF", "#FF33F5", "#F5FF33",
        "#33FFF5", "#FF8C33", "#8C33FF", "#33FF8C", "#FF338C",
        "#338CFF", "#8CFF33", "#FF3333", "#33FF33", "#3333FF",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_wire_roundtrip() {
        let types = [
            MessageType::JoinRoom,
            MessageType::Welcome,
            MessageType::UserJoined,
            MessageType::UserLeft,
            MessageType::CursorMove,
            MessageType::StrokeStart,
            MessageType::StrokeAdd,
            MessageType::StrokeEnd,
            MessageType::StrokeMove,
            MessageType::RoomState,
            MessageType::Ping,
            MessageType::Pong,
            MessageType::Error,
        ];
        for ty in types {
            let wire = ty.as_wire().unwrap();
            assert_eq!(MessageType::from_wire(wire), ty);
        }
    }

    #[test]
    fn test_unknown_type_has_no_wire_form() {
        assert_eq!(MessageType::Unknown.as_wire(), None);
        assert_eq!(MessageType::from_wire("bogus"), MessageType::Unknown);
        assert_eq!(MessageType::from_wire(""), MessageType::Unknown);
    }

    #[test]
    fn test_error_code_wire_strings() {
        assert_eq!(ErrorCode::RoomFull.as_wire(), "ROOM_FULL");
        assert_eq!(ErrorCode::InvalidPassword.as_wire(), "INVALID_PASSWORD");
        assert_eq!(ErrorCode::MalformedMessage.as_wire(), "MALFORMED_MESSAGE");
        assert_eq!(ErrorCode::StrokeTooLarge.as_wire(), "STROKE_TOO_LARGE");
        assert_eq!(ErrorCode::AlreadyInRoom.as_wire(), "ALREADY_IN_ROOM");
    }

    #[test]
    fn test_error_messages_nonempty() {
        let codes = [
            ErrorCode::RoomNotFound,
            ErrorCode::RoomFull,
            ErrorCode::InvalidPassword,
            ErrorCode::MalformedMessage,
            ErrorCode::InvalidMessageType,
            ErrorCode::MissingField,
            ErrorCode::InvalidField,
            ErrorCode::RateLimited,
            ErrorCode::InvalidStroke,
            ErrorCode::StrokeTooLarge,
            ErrorCode::NotInRoom,
            ErrorCode::AlreadyInRoom,
            ErrorCode::InternalError,
        ];
        for code in codes {
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn test_palette_is_fifteen_unique_hex_colors() {
        let palette = constants::COLOR_PALETTE;
        assert_eq!(palette.len(), 15);
        for color in palette {
            assert!(color.starts_with('#'));
            assert_eq!(color.len(), 7);
        }
        let mut unique: Vec<&str> = palette.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 15);
    }
}
