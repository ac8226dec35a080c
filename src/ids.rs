//! Identifier helpers: UUIDv4, short hex ids, and prefixed id generators.

use uuid::Uuid;

/// Generate a full UUIDv4 string (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`).
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a short 8-character hex id for less critical uses.
pub fn new_short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Generate a room id: `room-xxxxxxxx`.
pub fn new_room_id() -> String {
    format!("room-{}", new_short_id())
}

/// Generate a user id: `user-<uuid>`.
pub fn new_user_id() -> String {
    format!("user-{}", new_uuid())
}

/// Generate a stroke id: `stroke-xxxxxxxx`.
pub fn new_stroke_id() -> String {
    format!("stroke-{}", new_short_id())
}

/// Check whether a string is a hyphenated UUIDv4.
pub fn is_valid_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    match Uuid::parse_str(s) {
        Ok(u) => u.get_version() == Some(uuid::Version::Random),
        Err(_) => false,
    }
}
