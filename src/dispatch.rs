//! Message dispatcher: one entry point per inbound frame.
//!
//! Error policy:
//! - parse failures and unknown types are answered with `error` frames
//! - join failures are answered with `error` frames
//! - invalid or rejected drawing/cursor traffic from a joined client is
//!   silently dropped and logged, so buggy or malicious clients are not
//!   chatty-responded to on every tick
//! - any non-join message from a session that has not joined is ignored
//!   (`ping` excepted, which is always answered)

use std::sync::Arc;

use serde_json::Value;

use crate::codec;
use crate::protocol::{ErrorCode, MessageType};
use crate::registry::RoomRegistry;
use crate::room::{FrameKind, SessionHandle};

/// Per-connection identity, owned by the session and updated on join.
#[derive(Debug)]
pub struct SessionCtx {
    pub handle: SessionHandle,
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl SessionCtx {
    pub fn new(handle: SessionHandle) -> Self {
        Self { handle, room_id: None, user_id: None, user_name: None }
    }

    pub fn is_joined(&self) -> bool {
        self.user_id.is_some() && self.room_id.is_some()
    }
}

/// Routes parsed frames to the room/board/presence services.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    registry: Arc<RoomRegistry>,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Handle one raw inbound frame from a session.
    pub fn handle_frame(&self, ctx: &mut SessionCtx, raw: &str) {
        let msg = match codec::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("malformed frame: {e}");
                self.send_error(ctx, ErrorCode::MalformedMessage);
                return;
            }
        };

        let ty = codec::message_type(&msg);
        let data = codec::data(&msg);

        match ty {
            MessageType::JoinRoom => self.handle_join(ctx, &data),
            MessageType::Ping => {
                let pong = codec::pong(codec::seq(&msg));
                ctx.handle.try_send(&pong, FrameKind::Control);
            }
            MessageType::CursorMove => self.handle_cursor_move(ctx, &data),
            MessageType::StrokeStart => self.handle_stroke_start(ctx, &data),
            MessageType::StrokeAdd => self.handle_stroke_add(ctx, &data),
            MessageType::StrokeEnd => self.handle_stroke_end(ctx, &data),
            MessageType::StrokeMove => self.handle_stroke_move(ctx, &data),
            // Unrecognized strings and server-only types a client has no
            // business sending.
            _ => self.send_error(ctx, ErrorCode::InvalidMessageType),
        }
    }

    fn handle_join(&self, ctx: &mut SessionCtx, data: &Value) {
        if ctx.is_joined() {
            self.send_error(ctx, ErrorCode::AlreadyInRoom);
            return;
        }
        if !codec::validate_join_room(data) {
            self.send_error(ctx, ErrorCode::MissingField);
            return;
        }

        let room_id = data["roomId"].as_str().unwrap_or_default().to_string();
        let user_name = data["userName"].as_str().unwrap_or_default().to_string();
        let password = data
            .get("password")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match self
            .registry
            .join(&room_id, &user_name, &password, ctx.handle.clone())
        {
            Ok(result) => {
                ctx.room_id = Some(room_id);
                ctx.user_id = Some(result.user_id);
                ctx.user_name = Some(user_name);
            }
            Err(code) => self.send_error(ctx, code),
        }
    }

    fn handle_cursor_move(&self, ctx: &SessionCtx, data: &Value) {
        let Some((room, user_id)) = self.joined_room(ctx) else {
            return;
        };
        if !codec::validate_cursor_move(data) {
            return;
        }
        let x = data["x"].as_f64().unwrap_or(0.0) as f32;
        let y = data["y"].as_f64().unwrap_or(0.0) as f32;

        // Rejected updates are shed without a reply; presence is
        // loss-tolerant.
        if let Err(code) = self.registry.presence().cursor_move(&room, &user_id, x, y) {
            log::trace!("cursor_move dropped for {user_id}: {code}");
        }
    }

    fn handle_stroke_start(&self, ctx: &SessionCtx, data: &Value) {
        let Some((room, user_id)) = self.joined_room(ctx) else {
            return;
        };
        if !codec::validate_stroke_start(data) {
            return;
        }
        let stroke_id = data["strokeId"].as_str().unwrap_or_default();
        let color = data["color"].as_str().unwrap_or_default();
        let width = data["width"].as_f64().unwrap_or(1.0) as f32;

        self.registry.presence().update_last_seen(&room, &user_id);
        if let Err(code) = self
            .registry
            .board()
            .stroke_start(&room, &user_id, stroke_id, color, width)
        {
            log::debug!("stroke_start rejected for {user_id}: {code}");
        }
    }

    fn handle_stroke_add(&self, ctx: &SessionCtx, data: &Value) {
        let Some((room, user_id)) = self.joined_room(ctx) else {
            return;
        };
        if !codec::validate_stroke_add(data) {
            return;
        }
        let stroke_id = data["strokeId"].as_str().unwrap_or_default();
        let points = codec::extract_points(data);

        self.registry.presence().update_last_seen(&room, &user_id);
        if let Err(code) = self
            .registry
            .board()
            .stroke_add(&room, &user_id, stroke_id, &points)
        {
            log::debug!("stroke_add rejected for {user_id}: {code}");
        }
    }

    fn handle_stroke_end(&self, ctx: &SessionCtx, data: &Value) {
        let Some((room, user_id)) = self.joined_room(ctx) else {
            return;
        };
        if !codec::validate_stroke_end(data) {
            return;
        }
        let stroke_id = data["strokeId"].as_str().unwrap_or_default();

        self.registry.presence().update_last_seen(&room, &user_id);
        if let Err(code) = self.registry.board().stroke_end(&room, &user_id, stroke_id) {
            log::debug!("stroke_end rejected for {user_id}: {code}");
        }
    }

    fn handle_stroke_move(&self, ctx: &SessionCtx, data: &Value) {
        let Some((room, user_id)) = self.joined_room(ctx) else {
            return;
        };
        if !codec::validate_stroke_move(data) {
            return;
        }
        let stroke_id = data["strokeId"].as_str().unwrap_or_default();
        let dx = data["dx"].as_f64().unwrap_or(0.0) as f32;
        let dy = data["dy"].as_f64().unwrap_or(0.0) as f32;

        self.registry.presence().update_last_seen(&room, &user_id);
        if let Err(code) = self
            .registry
            .board()
            .stroke_move(&room, &user_id, stroke_id, dx, dy)
        {
            log::debug!("stroke_move rejected for {user_id}: {code}");
        }
    }

    /// Resolve the session's room; `None` (silently) when not joined or the
    /// room has since been deleted.
    fn joined_room(&self, ctx: &SessionCtx) -> Option<(Arc<crate::room::Room>, String)> {
        let room_id = ctx.room_id.as_deref()?;
        let user_id = ctx.user_id.clone()?;
        let room = self.registry.room(room_id)?;
        Some((room, user_id))
    }

    fn send_error(&self, ctx: &SessionCtx, code: ErrorCode) {
        let frame = codec::error(code, 0);
        ctx.handle.try_send(&frame, FrameKind::Control);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn setup() -> (MessageDispatcher, SessionCtx, mpsc::Receiver<String>) {
        let registry = Arc::new(RoomRegistry::new());
        let dispatcher = MessageDispatcher::new(registry);
        let (handle, rx) = SessionHandle::channel(64);
        (dispatcher, SessionCtx::new(handle), rx)
    }

    fn recv_error_code(rx: &mut mpsc::Receiver<String>) -> String {
        let raw = rx.try_recv().expect("expected an error frame");
        let msg = codec::parse(&raw).unwrap();
        assert_eq!(codec::message_type(&msg), MessageType::Error);
        codec::data(&msg)["code"].as_str().unwrap().to_string()
    }

    fn join(dispatcher: &MessageDispatcher, ctx: &mut SessionCtx, rx: &mut mpsc::Receiver<String>) {
        dispatcher.handle_frame(
            ctx,
            r#"{"type":"join_room","seq":1,"data":{"roomId":"room-1","userName":"Alice"}}"#,
        );
        rx.try_recv().unwrap(); // welcome
        rx.try_recv().unwrap(); // room_state
    }

    #[test]
    fn test_malformed_json_gets_error() {
        let (dispatcher, mut ctx, mut rx) = setup();
        dispatcher.handle_frame(&mut ctx, "{broken");
        assert_eq!(recv_error_code(&mut rx), "MALFORMED_MESSAGE");
    }

    #[test]
    fn test_unknown_type_gets_error() {
        let (dispatcher, mut ctx, mut rx) = setup();
        dispatcher.handle_frame(&mut ctx, r#"{"type":"frobnicate","seq":1,"data":{}}"#);
        assert_eq!(recv_error_code(&mut rx), "INVALID_MESSAGE_TYPE");
    }

    #[test]
    fn test_ping_answered_before_join() {
        let (dispatcher, mut ctx, mut rx) = setup();
        dispatcher.handle_frame(&mut ctx, r#"{"type":"ping","seq":42}"#);
        let raw = rx.try_recv().unwrap();
        let msg = codec::parse(&raw).unwrap();
        assert_eq!(codec::message_type(&msg), MessageType::Pong);
        assert_eq!(codec::seq(&msg), 42);
    }

    #[test]
    fn test_join_updates_session_identity() {
        let (dispatcher, mut ctx, mut rx) = setup();
        join(&dispatcher, &mut ctx, &mut rx);

        assert!(ctx.is_joined());
        assert_eq!(ctx.room_id.as_deref(), Some("room-1"));
        assert_eq!(ctx.user_name.as_deref(), Some("Alice"));
        assert!(ctx.user_id.as_deref().unwrap().starts_with("user-"));
    }

    #[test]
    fn test_join_missing_field_gets_error() {
        let (dispatcher, mut ctx, mut rx) = setup();
        dispatcher.handle_frame(&mut ctx, r#"{"type":"join_room","seq":1,"data":{"roomId":"r"}}"#);
        assert_eq!(recv_error_code(&mut rx), "MISSING_FIELD");
        assert!(!ctx.is_joined());
    }

    #[test]
    fn test_double_join_rejected() {
        let (dispatcher, mut ctx, mut rx) = setup();
        join(&dispatcher, &mut ctx, &mut rx);

        dispatcher.handle_frame(
            &mut ctx,
            r#"{"type":"join_room","seq":2,"data":{"roomId":"room-2","userName":"Alice"}}"#,
        );
        assert_eq!(recv_error_code(&mut rx), "ALREADY_IN_ROOM");
        assert_eq!(ctx.room_id.as_deref(), Some("room-1"));
    }

    #[test]
    fn test_drawing_before_join_is_ignored() {
        let (dispatcher, mut ctx, mut rx) = setup();
        dispatcher.handle_frame(
            &mut ctx,
            r##"{"type":"stroke_start","seq":1,"data":{"strokeId":"s1","color":"#000","width":2}}"##,
        );
        dispatcher.handle_frame(&mut ctx, r#"{"type":"cursor_move","seq":2,"data":{"x":1,"y":2}}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_stroke_fields_silently_dropped() {
        let (dispatcher, mut ctx, mut rx) = setup();
        join(&dispatcher, &mut ctx, &mut rx);

        // Missing width: dropped without a reply.
        dispatcher.handle_frame(
            &mut ctx,
            r##"{"type":"stroke_start","seq":3,"data":{"strokeId":"s1","color":"#000"}}"##,
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stroke_flow_through_dispatcher() {
        let (dispatcher, mut ctx, mut rx) = setup();
        join(&dispatcher, &mut ctx, &mut rx);

        dispatcher.handle_frame(
            &mut ctx,
            r##"{"type":"stroke_start","seq":3,"data":{"strokeId":"s1","color":"#000000","width":2}}"##,
        );
        dispatcher.handle_frame(
            &mut ctx,
            r#"{"type":"stroke_add","seq":4,"data":{"strokeId":"s1","points":[[10,10],[20,20]]}}"#,
        );
        dispatcher.handle_frame(
            &mut ctx,
            r#"{"type":"stroke_end","seq":5,"data":{"strokeId":"s1"}}"#,
        );

        let registry = dispatcher.registry.clone();
        let room = registry.room("room-1").unwrap();
        let stroke = room.stroke("s1").unwrap();
        assert_eq!(stroke.point_count(), 2);
        assert!(stroke.complete);
        // Sender receives none of its own broadcasts.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cursor_move_updates_room_state() {
        let (dispatcher, mut ctx, mut rx) = setup();
        join(&dispatcher, &mut ctx, &mut rx);

        dispatcher.handle_frame(
            &mut ctx,
            r#"{"type":"cursor_move","seq":6,"data":{"x":50.5,"y":60.5}}"#,
        );

        let registry = dispatcher.registry.clone();
        let room = registry.room("room-1").unwrap();
        let cursor = room.cursor(ctx.user_id.as_deref().unwrap()).unwrap();
        assert_eq!(cursor.x, 50.5);
        assert_eq!(cursor.y, 60.5);
    }

    #[test]
    fn test_room_full_error_through_dispatcher() {
        let registry = Arc::new(RoomRegistry::new());
        let dispatcher = MessageDispatcher::new(registry);

        let mut ctxs = Vec::new();
        for i in 0..15 {
            let (handle, rx) = SessionHandle::channel(64);
            let mut ctx = SessionCtx::new(handle);
            dispatcher.handle_frame(
                &mut ctx,
                &format!(
                    r#"{{"type":"join_room","seq":1,"data":{{"roomId":"room-9","userName":"u{i}"}}}}"#
                ),
            );
            ctxs.push((ctx, rx));
        }

        let (handle, mut rx) = SessionHandle::channel(64);
        let mut ctx = SessionCtx::new(handle);
        dispatcher.handle_frame(
            &mut ctx,
            r#"{"type":"join_room","seq":1,"data":{"roomId":"room-9","userName":"overflow"}}"#,
        );
        assert_eq!(recv_error_code(&mut rx), "ROOM_FULL");
        assert!(!ctx.is_joined());
    }
}
