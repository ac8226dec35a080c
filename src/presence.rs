//! Presence subsystem: cursor updates, rate gating, ghost detection.
//!
//! Cursor traffic is high-frequency and loss-tolerant: updates that exceed
//! the per-user token bucket are silently dropped, never answered with an
//! error frame. Drawing activity flows through [`PresenceService::update_last_seen`]
//! so ghost detection sees every kind of mutation.

use std::time::Duration;

use crate::codec;
use crate::limiter::{MutingRateLimiter, RateLimiter};
use crate::protocol::constants;
use crate::protocol::ErrorCode;
use crate::room::{FrameKind, Room};

/// Cursor admission gate: a plain bucket, or one that escalates repeat
/// offenders to a timed mute.
#[derive(Debug)]
enum CursorGate {
    Plain(RateLimiter),
    Muting(MutingRateLimiter),
}

impl CursorGate {
    fn try_consume(&self, user_id: &str) -> bool {
        match self {
            Self::Plain(limiter) => limiter.try_consume(user_id),
            Self::Muting(limiter) => limiter.try_consume(user_id),
        }
    }

    fn can_consume(&self, user_id: &str) -> bool {
        match self {
            Self::Plain(limiter) => limiter.can_consume(user_id),
            Self::Muting(limiter) => !limiter.is_muted(user_id),
        }
    }

    fn remove(&self, user_id: &str) {
        match self {
            Self::Plain(limiter) => limiter.remove(user_id),
            Self::Muting(limiter) => limiter.remove(user_id),
        }
    }
}

/// Handles cursor position updates, rate limiting, and ghost detection.
#[derive(Debug)]
pub struct PresenceService {
    gate: CursorGate,
}

impl Default for PresenceService {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceService {
    /// Cursor-tuned limiter: 20 updates/s with a burst of 5.
    pub fn new() -> Self {
        Self {
            gate: CursorGate::Plain(RateLimiter::new(
                constants::CURSOR_UPDATES_PER_SECOND,
                constants::RATE_LIMIT_BURST_SIZE,
            )),
        }
    }

    /// Variant that mutes repeat offenders for 10 s after 3 consecutive
    /// rejected updates.
    pub fn with_muting() -> Self {
        Self {
            gate: CursorGate::Muting(MutingRateLimiter::new(
                constants::CURSOR_UPDATES_PER_SECOND,
                constants::RATE_LIMIT_BURST_SIZE,
                Duration::from_millis(constants::RATE_LIMIT_MUTE_DURATION_MS),
                constants::VIOLATIONS_BEFORE_MUTE,
            )),
        }
    }

    /// Process a cursor move: gate it, update room state, broadcast to peers.
    ///
    /// Returns `RateLimited` when the update was shed; the dispatcher
    /// discards it without replying.
    pub fn cursor_move(
        &self,
        room: &Room,
        user_id: &str,
        x: f32,
        y: f32,
    ) -> Result<(), ErrorCode> {
        if !self.gate.try_consume(user_id) {
            return Err(ErrorCode::RateLimited);
        }

        room.update_cursor(user_id, x, y);
        if room.participant(user_id).is_none() {
            return Err(ErrorCode::NotInRoom);
        }

        let seq = room.next_sequence();
        let message = codec::cursor_move(user_id, x, y, seq);
        room.broadcast(&message, Some(user_id), FrameKind::Presence);
        Ok(())
    }

    /// Touch a user's activity timestamp. Called for every non-presence
    /// mutation from that user.
    pub fn update_last_seen(&self, room: &Room, user_id: &str) {
        room.touch_participant(user_id);
    }

    /// Users whose last activity is older than `timeout`.
    pub fn ghost_users(&self, room: &Room, timeout: Duration) -> Vec<String> {
        room.participants()
            .into_iter()
            .filter(|u| u.is_ghost(timeout))
            .map(|u| u.user_id)
            .collect()
    }

    /// Flag ghosts as inactive without removing them; they still count
    /// toward room capacity until they leave.
    pub fn mark_ghosts_inactive(&self, room: &Room, timeout: Duration) {
        for user_id in room.participant_ids() {
            room.with_participant_mut(&user_id, |user| {
                if user.is_ghost(timeout) {
                    user.is_active = false;
                }
            });
        }
    }

    /// Drop rate-limit state for a user on disconnect.
    pub fn remove_user(&self, user_id: &str) {
        self.gate.remove(user_id);
    }

    /// Whether the user would currently be rejected.
    pub fn is_rate_limited(&self, user_id: &str) -> bool {
        !self.gate.can_consume(user_id)
    }
}
