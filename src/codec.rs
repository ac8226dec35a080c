//! JSON wire codec: envelope parsing, field validation, and constructors
//! for every outbound message variant.
//!
//! Envelope shape (text WebSocket frames):
//! ```text
//! {"type":"<string>","seq":<u64>,"timestamp":<i64 ms>,"data":{…}}
//! ```
//!
//! Inbound frames are parsed into `serde_json::Value` and inspected through
//! the accessors below; unknown or missing fields degrade to defaults so the
//! dispatcher owns the error policy. Outbound frames are built fully formed,
//! with `points` serialized as `[[x,y], …]` arrays.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::protocol::{ErrorCode, MessageType};
use crate::room::{Point, Stroke, UserInfo};

/// Codec-level failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Invalid JSON or a non-object envelope root.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Parse a raw frame into a JSON envelope.
///
/// Fails on invalid JSON and on any root that is not an object.
pub fn parse(raw: &str) -> Result<Value, CodecError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(CodecError::Malformed("envelope root must be an object".into()));
    }
    Ok(value)
}

/// Message type of an envelope; `Unknown` when missing or unrecognized.
pub fn message_type(msg: &Value) -> MessageType {
    msg.get("type")
        .and_then(Value::as_str)
        .map(MessageType::from_wire)
        .unwrap_or(MessageType::Unknown)
}

/// Client sequence number; defaults to 0 when absent or non-numeric.
pub fn seq(msg: &Value) -> u64 {
    msg.get("seq").and_then(Value::as_u64).unwrap_or(0)
}

/// Envelope timestamp in milliseconds; defaults to 0.
pub fn timestamp(msg: &Value) -> i64 {
    msg.get("timestamp").and_then(Value::as_i64).unwrap_or(0)
}

/// The `data` payload; an empty object when absent or not an object.
pub fn data(msg: &Value) -> Value {
    match msg.get("data") {
        Some(d) if d.is_object() => d.clone(),
        _ => Value::Object(Map::new()),
    }
}

// ── Validation ───────────────────────────────────────────────────

fn has_string(data: &Value, field: &str) -> bool {
    data.get(field).map(Value::is_string).unwrap_or(false)
}

fn has_number(data: &Value, field: &str) -> bool {
    data.get(field).map(Value::is_number).unwrap_or(false)
}

/// `join_room` requires `roomId` and `userName`; `password` is optional.
pub fn validate_join_room(data: &Value) -> bool {
    has_string(data, "roomId") && has_string(data, "userName")
}

pub fn validate_cursor_move(data: &Value) -> bool {
    has_number(data, "x") && has_number(data, "y")
}

pub fn validate_stroke_start(data: &Value) -> bool {
    has_string(data, "strokeId") && has_string(data, "color") && has_number(data, "width")
}

pub fn validate_stroke_add(data: &Value) -> bool {
    has_string(data, "strokeId") && data.get("points").map(Value::is_array).unwrap_or(false)
}

pub fn validate_stroke_end(data: &Value) -> bool {
    has_string(data, "strokeId")
}

pub fn validate_stroke_move(data: &Value) -> bool {
    has_string(data, "strokeId") && has_number(data, "dx") && has_number(data, "dy")
}

/// Extract `[[x,y], …]` points, skipping malformed entries.
pub fn extract_points(data: &Value) -> Vec<Point> {
    let Some(entries) = data.get("points").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let pair = entry.as_array()?;
            if pair.len() < 2 {
                return None;
            }
            let x = pair[0].as_f64()? as f32;
            let y = pair[1].as_f64()? as f32;
            Some(Point::new(x, y))
        })
        .collect()
}

// ── Outbound construction ────────────────────────────────────────

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn envelope(ty: MessageType, seq: u64, data: Value) -> String {
    json!({
        "type": ty.as_wire().expect("outbound type has a wire form"),
        "seq": seq,
        "timestamp": now_ms(),
        "data": data,
    })
    .to_string()
}

fn points_array(points: &[Point]) -> Value {
    Value::Array(points.iter().map(|p| json!([p.x, p.y])).collect())
}

/// `welcome` sent to a user on successful join. `users` is the peer list as
/// provided; the caller excludes the joiner.
pub fn welcome(user_id: &str, color: &str, users: &[UserInfo], seq: u64) -> String {
    let user_array: Vec<Value> = users
        .iter()
        .map(|u| {
            json!({
                "userId": u.user_id,
                "name": u.user_name,
                "color": u.color,
            })
        })
        .collect();
    envelope(
        MessageType::Welcome,
        seq,
        json!({
            "userId": user_id,
            "color": color,
            "users": user_array,
        }),
    )
}

pub fn user_joined(user_id: &str, user_name: &str, color: &str, seq: u64) -> String {
    envelope(
        MessageType::UserJoined,
        seq,
        json!({
            "userId": user_id,
            "name": user_name,
            "color": color,
        }),
    )
}

pub fn user_left(user_id: &str, seq: u64) -> String {
    envelope(MessageType::UserLeft, seq, json!({ "userId": user_id }))
}

pub fn cursor_move(user_id: &str, x: f32, y: f32, seq: u64) -> String {
    envelope(
        MessageType::CursorMove,
        seq,
        json!({
            "userId": user_id,
            "x": x,
            "y": y,
        }),
    )
}

pub fn stroke_start(stroke_id: &str, user_id: &str, color: &str, width: f32, seq: u64) -> String {
    envelope(
        MessageType::StrokeStart,
        seq,
        json!({
            "strokeId": stroke_id,
            "userId": user_id,
            "color": color,
            "width": width,
        }),
    )
}

pub fn stroke_add(stroke_id: &str, user_id: &str, points: &[Point], seq: u64) -> String {
    envelope(
        MessageType::StrokeAdd,
        seq,
        json!({
            "strokeId": stroke_id,
            "userId": user_id,
            "points": points_array(points),
        }),
    )
}

pub fn stroke_end(stroke_id: &str, user_id: &str, seq: u64) -> String {
    envelope(
        MessageType::StrokeEnd,
        seq,
        json!({
            "strokeId": stroke_id,
            "userId": user_id,
        }),
    )
}

pub fn stroke_move(stroke_id: &str, user_id: &str, dx: f32, dy: f32, seq: u64) -> String {
    envelope(
        MessageType::StrokeMove,
        seq,
        json!({
            "strokeId": stroke_id,
            "userId": user_id,
            "dx": dx,
            "dy": dy,
        }),
    )
}

/// `room_state` snapshot for late joiners. The envelope `seq` carries the
/// same value as `snapshotSeq`.
pub fn room_state(strokes: &[Stroke], snapshot_seq: u64) -> String {
    let stroke_array: Vec<Value> = strokes
        .iter()
        .map(|s| {
            json!({
                "strokeId": s.stroke_id,
                "userId": s.user_id,
                "points": points_array(&s.points),
                "color": s.color,
                "width": s.width,
                "complete": s.complete,
            })
        })
        .collect();
    envelope(
        MessageType::RoomState,
        snapshot_seq,
        json!({
            "strokes": stroke_array,
            "snapshotSeq": snapshot_seq,
        }),
    )
}

/// `pong` echoing the sequence the client sent in its `ping`.
pub fn pong(seq: u64) -> String {
    envelope(MessageType::Pong, seq, Value::Object(Map::new()))
}

/// `error` frame with the code's canonical message text.
pub fn error(code: ErrorCode, seq: u64) -> String {
    error_with_message(code, code.message(), seq)
}

/// `error` frame with custom message text.
pub fn error_with_message(code: ErrorCode, message: &str, seq: u64) -> String {
    envelope(
        MessageType::Error,
        seq,
        json!({
            "code": code.as_wire(),
            "message": message,
        }),
    )
}
