//! Process-wide room registry: lookup, join/leave, color allocation, and
//! grace-period deletion of empty rooms.
//!
//! The registry lock protects only the `room_id → Room` map and the
//! pending-deletion deadlines; it is never held while a room's own lock is
//! taken. An empty room is not deleted immediately; it is preserved for a
//! grace period so a page refresh can rejoin and find its strokes intact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::board::BoardService;
use crate::codec;
use crate::ids;
use crate::presence::PresenceService;
use crate::protocol::constants;
use crate::protocol::ErrorCode;
use crate::room::{FrameKind, Room, SessionHandle, UserInfo};

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinSuccess {
    pub user_id: String,
    pub color: String,
}

/// Registry tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long an empty room survives before deletion.
    pub grace_period: Duration,
    /// Escalate repeat cursor-rate offenders to a timed mute.
    pub mute_repeat_offenders: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(constants::ROOM_GRACE_PERIOD_MS),
            mute_repeat_offenders: false,
        }
    }
}

/// Central registry managing all rooms and routing joins/leaves.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    /// Deletion deadlines for rooms that have gone empty.
    pending_delete: Mutex<HashMap<String, Instant>>,
    presence: PresenceService,
    board: BoardService,
    next_color: AtomicUsize,
    grace_period: Duration,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let presence = if config.mute_repeat_offenders {
            PresenceService::with_muting()
        } else {
            PresenceService::new()
        };
        Self {
            rooms: Mutex::new(HashMap::new()),
            pending_delete: Mutex::new(HashMap::new()),
            presence,
            board: BoardService::new(),
            next_color: AtomicUsize::new(0),
            grace_period: config.grace_period,
        }
    }

    pub fn presence(&self) -> &PresenceService {
        &self.presence
    }

    pub fn board(&self) -> &BoardService {
        &self.board
    }

    // ── Room management ──────────────────────────────────────────

    /// Return the existing room or create it with the given password.
    ///
    /// The password supplied at creation is the room's password forever;
    /// later callers are validated against it, never replacing it. A room
    /// awaiting grace-period deletion is revived by cancelling its deadline.
    pub fn get_or_create(&self, room_id: &str, password: &str) -> Arc<Room> {
        self.sweep_expired();

        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get(room_id) {
            self.pending_delete.lock().unwrap().remove(room_id);
            return room.clone();
        }
        let room = Arc::new(Room::new(room_id, password));
        rooms.insert(room_id.to_string(), room.clone());
        room
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.lock().unwrap().get(room_id).cloned()
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.lock().unwrap().contains_key(room_id)
    }

    pub fn delete_room(&self, room_id: &str) {
        self.rooms.lock().unwrap().remove(room_id);
        self.pending_delete.lock().unwrap().remove(room_id);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Whether a room currently has a deletion deadline armed.
    pub fn deletion_pending(&self, room_id: &str) -> bool {
        self.pending_delete.lock().unwrap().contains_key(room_id)
    }

    // ── Join / leave ─────────────────────────────────────────────

    /// Join a user to a room.
    ///
    /// On success the joiner receives `welcome` (peer list excludes them)
    /// followed by the `room_state` snapshot, and existing peers receive
    /// `user_joined`.
    pub fn join(
        &self,
        room_id: &str,
        user_name: &str,
        password: &str,
        handle: SessionHandle,
    ) -> Result<JoinSuccess, ErrorCode> {
        let room = self.get_or_create(room_id, password);

        if !room.validate_password(password) {
            return Err(ErrorCode::InvalidPassword);
        }
        if room.is_full() {
            return Err(ErrorCode::RoomFull);
        }

        let user_id = ids::new_user_id();
        let color = self.next_color();
        let user = UserInfo::new(&user_id, user_name, color, handle.clone());
        if !room.add_participant(user) {
            return Err(ErrorCode::RoomFull);
        }

        let peers: Vec<UserInfo> = room
            .participants()
            .into_iter()
            .filter(|u| u.user_id != user_id)
            .collect();

        let welcome_seq = room.next_sequence();
        let welcome = codec::welcome(&user_id, color, &peers, welcome_seq);
        handle.try_send(&welcome, FrameKind::Control);

        let snapshot = self.board.snapshot(&room);
        handle.try_send(&snapshot, FrameKind::Control);

        let join_seq = room.next_sequence();
        let joined = codec::user_joined(&user_id, user_name, color, join_seq);
        room.broadcast(&joined, Some(&user_id), FrameKind::Control);

        log::info!("user {user_id} ({user_name}) joined room {room_id}");
        Ok(JoinSuccess { user_id, color: color.to_string() })
    }

    /// Remove a user from a room and notify the remaining peers.
    ///
    /// When the room empties, deletion is scheduled after the grace period
    /// rather than performed immediately.
    pub fn leave(self: &Arc<Self>, room_id: &str, user_id: &str) {
        let Some(room) = self.room(room_id) else {
            return;
        };

        room.remove_participant(user_id);
        self.presence.remove_user(user_id);

        let seq = room.next_sequence();
        let left = codec::user_left(user_id, seq);
        room.broadcast(&left, None, FrameKind::Control);

        log::info!("user {user_id} left room {room_id}");

        if room.is_empty() {
            self.schedule_delete(room_id);
        }
    }

    // ── Grace-period deletion ────────────────────────────────────

    /// Arm a deletion deadline for an empty room and spawn a timer to fire
    /// it. The deadline is re-checked when the timer fires, so a rejoin in
    /// the meantime (which clears the entry) cancels the deletion.
    fn schedule_delete(self: &Arc<Self>, room_id: &str) {
        let deadline = Instant::now() + self.grace_period;
        self.pending_delete
            .lock()
            .unwrap()
            .insert(room_id.to_string(), deadline);
        log::debug!(
            "room {room_id} empty, deletion in {} ms",
            self.grace_period.as_millis()
        );

        // Outside a runtime (unit tests, teardown) the sweep on the next
        // registry mutation still collects the room.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let registry = Arc::clone(self);
            let grace = self.grace_period;
            runtime.spawn(async move {
                tokio::time::sleep(grace).await;
                registry.sweep_expired();
            });
        }
    }

    /// Delete rooms whose grace deadline has elapsed and that are still
    /// empty. Called from the deletion timers and on registry mutations.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let pending = self.pending_delete.lock().unwrap();
            pending
                .iter()
                .filter(|(_, deadline)| now >= **deadline)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for room_id in expired {
            // Room lock is taken only after releasing the registry lock.
            let still_empty = self.room(&room_id).map(|r| r.is_empty()).unwrap_or(true);
            if still_empty {
                self.delete_room(&room_id);
                log::info!("room {room_id} deleted after grace period");
            } else {
                self.pending_delete.lock().unwrap().remove(&room_id);
            }
        }
    }

    // ── Color palette ────────────────────────────────────────────

    /// Next palette color; the index advances monotonically modulo the
    /// palette size across the whole process, so colors cycle rather than
    /// being reused-on-free.
    fn next_color(&self) -> &'static str {
        let idx = self.next_color.fetch_add(1, Ordering::Relaxed);
        constants::COLOR_PALETTE[idx % constants::COLOR_PALETTE.len()]
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
