//! Drawing subsystem: stroke lifecycle and board snapshots.
//!
//! Stroke FSM: `Drawing → Complete → (Moved)*`. Only the owner may
//! transition a stroke, and ownership never transfers. Violations are
//! reported to the dispatcher as error codes; per protocol policy they are
//! logged server-side and never surfaced to the offending client.

use crate::codec;
use crate::protocol::constants;
use crate::protocol::ErrorCode;
use crate::room::{FrameKind, Point, Room, Stroke};

/// Handles stroke events and generates board snapshots.
#[derive(Debug)]
pub struct BoardService {
    snapshot_limit: usize,
    max_points_per_stroke: usize,
}

impl Default for BoardService {
    fn default() -> Self {
        Self {
            snapshot_limit: constants::SNAPSHOT_STROKE_LIMIT,
            max_points_per_stroke: constants::MAX_POINTS_PER_STROKE,
        }
    }
}

impl BoardService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new stroke owned by `user_id` and broadcast it to peers.
    ///
    /// Always succeeds; any stroke id is accepted. The stroke samples its
    /// sequence from the room counter once, here.
    pub fn stroke_start(
        &self,
        room: &Room,
        user_id: &str,
        stroke_id: &str,
        color: &str,
        width: f32,
    ) -> Result<(), ErrorCode> {
        let mut stroke = Stroke::new(stroke_id, user_id, color, width);
        stroke.seq = room.next_sequence();
        let seq = stroke.seq;
        room.add_stroke(stroke);

        let message = codec::stroke_start(stroke_id, user_id, color, width, seq);
        room.broadcast(&message, Some(user_id), FrameKind::Control);
        Ok(())
    }

    /// Append points to an in-progress stroke and broadcast the addition.
    pub fn stroke_add(
        &self,
        room: &Room,
        user_id: &str,
        stroke_id: &str,
        points: &[Point],
    ) -> Result<(), ErrorCode> {
        let max_points = self.max_points_per_stroke;
        let outcome = room.mutate_stroke(stroke_id, |stroke| {
            if stroke.user_id != user_id {
                return Err(ErrorCode::InvalidStroke);
            }
            if stroke.complete {
                return Err(ErrorCode::InvalidStroke);
            }
            if stroke.point_count() + points.len() > max_points {
                return Err(ErrorCode::StrokeTooLarge);
            }
            stroke.add_points(points);
            Ok(())
        });

        match outcome {
            None => Err(ErrorCode::InvalidStroke),
            Some(Err(code)) => Err(code),
            Some(Ok(())) => {
                let seq = room.next_sequence();
                let message = codec::stroke_add(stroke_id, user_id, points, seq);
                room.broadcast(&message, Some(user_id), FrameKind::Control);
                Ok(())
            }
        }
    }

    /// Mark a stroke complete and broadcast the transition.
    ///
    /// A repeated end for an already-complete stroke is a no-op: no state
    /// change, no broadcast, no error.
    pub fn stroke_end(
        &self,
        room: &Room,
        user_id: &str,
        stroke_id: &str,
    ) -> Result<(), ErrorCode> {
        let outcome = room.mutate_stroke(stroke_id, |stroke| {
            if stroke.user_id != user_id {
                return Err(ErrorCode::InvalidStroke);
            }
            if stroke.complete {
                return Ok(false);
            }
            stroke.finish();
            Ok(true)
        });

        match outcome {
            None => Err(ErrorCode::InvalidStroke),
            Some(Err(code)) => Err(code),
            Some(Ok(false)) => Ok(()),
            Some(Ok(true)) => {
                let seq = room.next_sequence();
                let message = codec::stroke_end(stroke_id, user_id, seq);
                room.broadcast(&message, Some(user_id), FrameKind::Control);
                Ok(())
            }
        }
    }

    /// Translate a completed stroke by (dx, dy) and broadcast the move.
    pub fn stroke_move(
        &self,
        room: &Room,
        user_id: &str,
        stroke_id: &str,
        dx: f32,
        dy: f32,
    ) -> Result<(), ErrorCode> {
        let outcome = room.mutate_stroke(stroke_id, |stroke| {
            if stroke.user_id != user_id {
                return Err(ErrorCode::InvalidStroke);
            }
            if !stroke.complete {
                return Err(ErrorCode::InvalidStroke);
            }
            stroke.translate(dx, dy);
            Ok(())
        });

        match outcome {
            None => Err(ErrorCode::InvalidStroke),
            Some(Err(code)) => Err(code),
            Some(Ok(())) => {
                let seq = room.next_sequence();
                let message = codec::stroke_move(stroke_id, user_id, dx, dy, seq);
                room.broadcast(&message, Some(user_id), FrameKind::Control);
                Ok(())
            }
        }
    }

    /// Build the `room_state` snapshot: the most recent strokes plus the
    /// current room sequence as `snapshotSeq`.
    pub fn snapshot(&self, room: &Room) -> String {
        let strokes = room.strokes_snapshot(self.snapshot_limit);
        codec::room_state(&strokes, room.current_sequence())
    }
}
