//! Authoritative per-room state: members, cursors, strokes, sequencing.
//!
//! A [`Room`] is shared between the registry and every session using it.
//! All member/cursor/stroke operations take the single room lock; the
//! sequence counter is an atomic outside the lock so message construction
//! never contends with state mutation. Broadcast enqueues onto per-session
//! outboxes and never blocks on a slow peer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;

use crate::protocol::constants;

/// A single point of a stroke, in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A drawing stroke on the whiteboard.
///
/// `user_id` is immutable after creation; points may only grow while the
/// stroke is incomplete; a complete stroke can only be translated whole.
#[derive(Debug, Clone)]
pub struct Stroke {
    pub stroke_id: String,
    pub user_id: String,
    pub points: Vec<Point>,
    pub color: String,
    pub width: f32,
    pub complete: bool,
    /// Room sequence sampled once at stroke start.
    pub seq: u64,
}

impl Stroke {
    pub fn new(
        stroke_id: impl Into<String>,
        user_id: impl Into<String>,
        color: impl Into<String>,
        width: f32,
    ) -> Self {
        Self {
            stroke_id: stroke_id.into(),
            user_id: user_id.into(),
            points: Vec::new(),
            color: color.into(),
            width,
            complete: false,
            seq: 0,
        }
    }

    pub fn add_point(&mut self, x: f32, y: f32) {
        self.points.push(Point::new(x, y));
    }

    pub fn add_points(&mut self, new_points: &[Point]) {
        self.points.extend_from_slice(new_points);
    }

    /// Mark the stroke as complete.
    pub fn finish(&mut self) {
        self.complete = true;
    }

    /// Translate every point by (dx, dy).
    pub fn translate(&mut self, dx: f32, dy: f32) {
        for pt in &mut self.points {
            pt.x += dx;
            pt.y += dy;
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Whether an outbound frame may be shed under backpressure.
///
/// Presence traffic is loss-tolerant by design; dropping a cursor update on
/// a saturated peer is invisible. Control and drawing traffic must not be
/// dropped once accepted, so a peer that cannot keep up with it is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Control,
    Presence,
}

/// Non-owning handle to a session's outbox.
///
/// The session owns the receiving half; once the session is gone, sends
/// become silent no-ops and broadcast loops skip the dead handle.
/// Cloning is cheap.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<String>,
    kill: Arc<Notify>,
}

impl SessionHandle {
    /// Create a handle and the receiver the owning session reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self { tx, kill: Arc::new(Notify::new()) };
        (handle, rx)
    }

    /// Enqueue a frame without blocking.
    ///
    /// Returns false when the frame was not queued: the session is gone, or
    /// the outbox is saturated. Saturation sheds presence frames and kills
    /// the session for control frames, so one slow peer never stalls a
    /// room's broadcast.
    pub fn try_send(&self, message: &str, kind: FrameKind) -> bool {
        match self.tx.try_send(message.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(_)) => {
                if kind == FrameKind::Control {
                    log::warn!("session outbox saturated on control traffic, disconnecting peer");
                    self.kill.notify_one();
                }
                false
            }
        }
    }

    /// Whether the owning session is still alive.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Resolves when the handle has flagged the session for disconnect.
    pub async fn killed(&self) {
        self.kill.notified().await;
    }
}

/// A user's identity and liveness within a room.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub user_id: String,
    pub user_name: String,
    /// Hex color assigned from the palette at join.
    pub color: String,
    pub handle: SessionHandle,
    pub last_activity: Instant,
    pub is_active: bool,
}

impl UserInfo {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        color: impl Into<String>,
        handle: SessionHandle,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            color: color.into(),
            handle,
            last_activity: Instant::now(),
            is_active: true,
        }
    }

    /// Record activity from this user.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.is_active = true;
    }

    /// Whether the user has been inactive longer than `timeout`.
    pub fn is_ghost(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Latest cursor position for one user. At most one entry per user per room.
#[derive(Debug, Clone)]
pub struct CursorState {
    pub user_id: String,
    pub x: f32,
    pub y: f32,
    pub last_update: Instant,
    pub visible: bool,
}

impl CursorState {
    pub fn new(user_id: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            user_id: user_id.into(),
            x,
            y,
            last_update: Instant::now(),
            visible: true,
        }
    }

    pub fn update(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.last_update = Instant::now();
        self.visible = true;
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_update.elapsed() > timeout
    }
}

#[derive(Debug, Default)]
struct RoomInner {
    participants: HashMap<String, UserInfo>,
    cursors: HashMap<String, CursorState>,
    strokes: VecDeque<Stroke>,
}

/// A collaborative room: participants, cursors, stroke history, sequencing.
#[derive(Debug)]
pub struct Room {
    room_id: String,
    password: String,
    next_seq: AtomicU64,
    inner: Mutex<RoomInner>,
    max_users: usize,
    max_strokes: usize,
}

impl Room {
    pub fn new(room_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            password: password.into(),
            next_seq: AtomicU64::new(1),
            inner: Mutex::new(RoomInner::default()),
            max_users: constants::MAX_USERS_PER_ROOM,
            max_strokes: constants::MAX_STROKES_PER_ROOM,
        }
    }

    pub fn id(&self) -> &str {
        &self.room_id
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// A room without a password accepts anything; otherwise string equality.
    pub fn validate_password(&self, password: &str) -> bool {
        self.password.is_empty() || self.password == password
    }

    // ── Participants ─────────────────────────────────────────────

    /// Insert a participant and their origin cursor.
    ///
    /// Fails (no mutation) when the room is at capacity.
    pub fn add_participant(&self, user: UserInfo) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.participants.len() >= self.max_users {
            return false;
        }
        let user_id = user.user_id.clone();
        inner
            .cursors
            .insert(user_id.clone(), CursorState::new(user_id.clone(), 0.0, 0.0));
        inner.participants.insert(user_id, user);
        true
    }

    /// Remove a participant and their cursor. Idempotent.
    pub fn remove_participant(&self, user_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.participants.remove(user_id);
        inner.cursors.remove(user_id);
    }

    pub fn participant(&self, user_id: &str) -> Option<UserInfo> {
        self.inner.lock().unwrap().participants.get(user_id).cloned()
    }

    pub fn participants(&self) -> Vec<UserInfo> {
        self.inner.lock().unwrap().participants.values().cloned().collect()
    }

    pub fn participant_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().participants.keys().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.inner.lock().unwrap().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().participants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().unwrap().participants.len() >= self.max_users
    }

    /// Touch a participant's activity timestamp.
    pub fn touch_participant(&self, user_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.participants.get_mut(user_id) {
            user.touch();
        }
    }

    /// Run `f` against a participant, if present.
    pub fn with_participant_mut<R>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut UserInfo) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.participants.get_mut(user_id).map(f)
    }

    // ── Cursors ──────────────────────────────────────────────────

    /// Update a user's cursor and touch their activity. No-op for unknown
    /// users; cursor entries exist iff the member exists.
    pub fn update_cursor(&self, user_id: &str, x: f32, y: f32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cursor) = inner.cursors.get_mut(user_id) {
            cursor.update(x, y);
        }
        if let Some(user) = inner.participants.get_mut(user_id) {
            user.touch();
        }
    }

    pub fn cursor(&self, user_id: &str) -> Option<CursorState> {
        self.inner.lock().unwrap().cursors.get(user_id).cloned()
    }

    pub fn cursors(&self) -> HashMap<String, CursorState> {
        self.inner.lock().unwrap().cursors.clone()
    }

    // ── Strokes ──────────────────────────────────────────────────

    /// Append a stroke, evicting from the front past the per-room limit.
    pub fn add_stroke(&self, stroke: Stroke) {
        let mut inner = self.inner.lock().unwrap();
        inner.strokes.push_back(stroke);
        while inner.strokes.len() > self.max_strokes {
            inner.strokes.pop_front();
        }
    }

    /// Run `f` against the first stroke matching `stroke_id`.
    ///
    /// Linear scan from the front, so the earliest stroke with a colliding id
    /// stays authoritative for ownership checks.
    pub fn mutate_stroke<R>(
        &self,
        stroke_id: &str,
        f: impl FnOnce(&mut Stroke) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .strokes
            .iter_mut()
            .find(|s| s.stroke_id == stroke_id)
            .map(f)
    }

    pub fn stroke(&self, stroke_id: &str) -> Option<Stroke> {
        let inner = self.inner.lock().unwrap();
        inner.strokes.iter().find(|s| s.stroke_id == stroke_id).cloned()
    }

    /// The last `limit` strokes in insertion order.
    pub fn strokes_snapshot(&self, limit: usize) -> Vec<Stroke> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.strokes.len().saturating_sub(limit);
        inner.strokes.iter().skip(skip).cloned().collect()
    }

    pub fn stroke_count(&self) -> usize {
        self.inner.lock().unwrap().strokes.len()
    }

    // ── Sequencing ───────────────────────────────────────────────

    /// Fetch-and-increment the room sequence.
    ///
    /// Atomic and independent of the room lock, so message construction
    /// sites never contend with state mutation.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Current sequence value without incrementing.
    pub fn current_sequence(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed)
    }

    // ── Broadcasting ─────────────────────────────────────────────

    /// Enqueue a prebuilt frame onto every live peer outbox, skipping
    /// `exclude` and dead handles. Never blocks.
    pub fn broadcast(&self, message: &str, exclude: Option<&str>, kind: FrameKind) {
        let inner = self.inner.lock().unwrap();
        for (user_id, user) in &inner.participants {
            if Some(user_id.as_str()) == exclude {
                continue;
            }
            user.handle.try_send(message, kind);
        }
    }

    /// Enqueue a frame to one specific participant.
    pub fn send_to(&self, user_id: &str, message: &str, kind: FrameKind) {
        let inner = self.inner.lock().unwrap();
        if let Some(user) = inner.participants.get(user_id) {
            user.handle.try_send(message, kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str) -> (UserInfo, mpsc::Receiver<String>) {
        let (handle, rx) = SessionHandle::channel(16);
        (UserInfo::new(id, format!("name-{id}"), "#FF5733", handle), rx)
    }

    #[test]
    fn test_password_validation() {
        let open = Room::new("room-1", "");
        assert!(!open.has_password());
        assert!(open.validate_password(""));
        assert!(open.validate_password("anything"));

        let locked = Room::new("room-2", "secret");
        assert!(locked.has_password());
        assert!(locked.validate_password("secret"));
        assert!(!locked.validate_password(""));
        assert!(!locked.validate_password("wrong"));
    }

    #[test]
    fn test_capacity_limit() {
        let room = Room::new("room-1", "");
        let mut rxs = Vec::new();
        for i in 0..15 {
            let (user, rx) = member(&format!("user-{i}"));
            assert!(room.add_participant(user));
            rxs.push(rx);
        }
        assert!(room.is_full());

        let (extra, _rx) = member("user-overflow");
        assert!(!room.add_participant(extra));
        assert_eq!(room.participant_count(), 15);
    }

    #[test]
    fn test_cursor_exists_iff_member_exists() {
        let room = Room::new("room-1", "");
        let (user, _rx) = member("u1");
        room.add_participant(user);
        assert!(room.cursor("u1").is_some());
        // Origin cursor on join.
        let cursor = room.cursor("u1").unwrap();
        assert_eq!(cursor.x, 0.0);
        assert_eq!(cursor.y, 0.0);

        room.remove_participant("u1");
        assert!(room.cursor("u1").is_none());
        assert!(room.participant("u1").is_none());

        // Idempotent removal.
        room.remove_participant("u1");
        assert!(room.is_empty());
    }

    #[test]
    fn test_update_cursor_unknown_user_is_noop() {
        let room = Room::new("room-1", "");
        room.update_cursor("ghost", 10.0, 20.0);
        assert!(room.cursor("ghost").is_none());
    }

    #[test]
    fn test_update_cursor_touches_activity() {
        let room = Room::new("room-1", "");
        let (user, _rx) = member("u1");
        room.add_participant(user);

        room.update_cursor("u1", 5.0, 7.0);
        let cursor = room.cursor("u1").unwrap();
        assert_eq!(cursor.x, 5.0);
        assert_eq!(cursor.y, 7.0);
        assert!(!room.participant("u1").unwrap().is_ghost(Duration::from_secs(1)));
    }

    #[test]
    fn test_stroke_fifo_eviction() {
        let room = Room::new("room-1", "");
        for i in 0..1005 {
            room.add_stroke(Stroke::new(format!("s{i}"), "u1", "#000", 2.0));
        }
        assert_eq!(room.stroke_count(), 1000);
        // The five oldest are gone; the newest survive.
        assert!(room.stroke("s0").is_none());
        assert!(room.stroke("s4").is_none());
        assert!(room.stroke("s5").is_some());
        assert!(room.stroke("s1004").is_some());
    }

    #[test]
    fn test_snapshot_returns_most_recent_in_order() {
        let room = Room::new("room-1", "");
        for i in 0..10 {
            room.add_stroke(Stroke::new(format!("s{i}"), "u1", "#000", 2.0));
        }
        let snapshot = room.strokes_snapshot(3);
        let ids: Vec<&str> = snapshot.iter().map(|s| s.stroke_id.as_str()).collect();
        assert_eq!(ids, ["s7", "s8", "s9"]);

        // Limit above length returns everything.
        assert_eq!(room.strokes_snapshot(100).len(), 10);
    }

    #[test]
    fn test_sequence_monotonic() {
        let room = Room::new("room-1", "");
        let a = room.next_sequence();
        let b = room.next_sequence();
        let c = room.next_sequence();
        assert!(a < b && b < c);
        assert_eq!(room.current_sequence(), c + 1);
    }

    #[test]
    fn test_mutate_stroke_finds_first_match() {
        let room = Room::new("room-1", "");
        let mut first = Stroke::new("dup", "alice", "#000", 2.0);
        first.finish();
        room.add_stroke(first);
        room.add_stroke(Stroke::new("dup", "bob", "#fff", 1.0));

        // The earliest insertion wins the scan.
        let owner = room.mutate_stroke("dup", |s| s.user_id.clone());
        assert_eq!(owner.as_deref(), Some("alice"));
        assert!(room.mutate_stroke("missing", |_| ()).is_none());
    }

    #[test]
    fn test_stroke_translate_and_finish() {
        let mut stroke = Stroke::new("s1", "u1", "#000", 2.0);
        stroke.add_point(1.0, 2.0);
        stroke.add_points(&[Point::new(3.0, 4.0)]);
        assert_eq!(stroke.point_count(), 2);
        assert!(!stroke.is_empty());

        stroke.translate(10.0, -1.0);
        assert_eq!(stroke.points[0], Point::new(11.0, 1.0));
        assert_eq!(stroke.points[1], Point::new(13.0, 3.0));

        assert!(!stroke.complete);
        stroke.finish();
        assert!(stroke.complete);
    }

    #[test]
    fn test_broadcast_excludes_sender_and_skips_dead() {
        let room = Room::new("room-1", "");
        let (alice, mut alice_rx) = member("alice");
        let (bob, mut bob_rx) = member("bob");
        let (carol, carol_rx) = member("carol");
        room.add_participant(alice);
        room.add_participant(bob);
        room.add_participant(carol);
        drop(carol_rx); // Carol's session died.

        room.broadcast("hello", Some("alice"), FrameKind::Control);

        assert!(alice_rx.try_recv().is_err());
        assert_eq!(bob_rx.try_recv().unwrap(), "hello");
        // Dead handle skipped without disturbing the others.
        assert_eq!(room.participant_count(), 3);
    }

    #[test]
    fn test_send_to_single_user() {
        let room = Room::new("room-1", "");
        let (alice, mut alice_rx) = member("alice");
        let (bob, mut bob_rx) = member("bob");
        room.add_participant(alice);
        room.add_participant(bob);

        room.send_to("alice", "direct", FrameKind::Control);
        assert_eq!(alice_rx.try_recv().unwrap(), "direct");
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_presence_overflow_drops_silently() {
        let (handle, mut rx) = SessionHandle::channel(1);
        assert!(handle.try_send("a", FrameKind::Presence));
        // Outbox full: presence frame is shed, nothing else happens.
        assert!(!handle.try_send("b", FrameKind::Presence));
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ghost_detection() {
        let (handle, _rx) = SessionHandle::channel(4);
        let user = UserInfo::new("u1", "Alice", "#FF5733", handle);
        assert!(!user.is_ghost(Duration::from_secs(3)));
        assert!(user.is_ghost(Duration::from_nanos(1)));
        assert!(user.idle_time() < Duration::from_secs(1));
    }
}
