//! Per-connection state machine.
//!
//! A session moves Accepted -> Joined -> Closed. The handler is driven
//! by the single connection task, so events for one session are observed
//! strictly in receive order; no two handlers for the same session ever
//! run concurrently.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{ClientId, RoomId};
use crate::ports::Transport;

use super::messages::{self, ServerMessage, StateSnapshot, EVENT_DRAW, EVENT_JOIN};
use super::RelayHub;

/// Consumes one connection's transport events and drives the hub.
pub struct ConnectionHandler {
    hub: Arc<RelayHub>,
    session: Arc<super::sessions::ClientSession>,
}

impl ConnectionHandler {
    /// Admits the connection (applying the session resumption rule) and
    /// sends the welcome frame.
    pub async fn accept(
        hub: Arc<RelayHub>,
        client_id: ClientId,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (session, prior_room) = hub.admit(client_id, transport).await;
        debug!(
            client_id = %session.client_id(),
            resumed_room = prior_room.as_ref().map(|r| r.as_str()),
            "connection accepted"
        );

        let welcome = ServerMessage::Welcome {
            client_id: session.client_id().to_string(),
            state: StateSnapshot::capture(&session.state_snapshot()),
        };
        if let Err(error) = session.transport().send_text(&welcome.to_json()).await {
            warn!(client_id = %session.client_id(), %error, "failed to send welcome");
        }

        Self { hub, session }
    }

    pub fn session(&self) -> &Arc<super::sessions::ClientSession> {
        &self.session
    }

    /// Processes one inbound text frame.
    pub async fn handle_frame(&self, text: &str) {
        let event: Value = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(error) => {
                warn!(client_id = %self.session.client_id(), %error, "invalid JSON frame");
                self.reply_error("Invalid JSON").await;
                return;
            }
        };

        let kind = messages::event_type(&event);

        if kind == Some(EVENT_JOIN) {
            self.handle_join(&event).await;
            return;
        }

        // Anything but a join is dropped until the session is in a room.
        let rooms = self.hub.registry().rooms_of(self.session.client_id()).await;
        if rooms.is_empty() {
            debug!(
                client_id = %self.session.client_id(),
                kind = kind.unwrap_or("<untyped>"),
                "dropping event from roomless session"
            );
            return;
        }

        if kind == Some(EVENT_DRAW) {
            self.session.apply_draw(&event);
        }

        self.session.touch();
        for room_id in &rooms {
            self.hub.registry().append_history(room_id, event.clone()).await;
        }
        self.hub
            .broadcaster()
            .broadcast(self.session.client_id(), &event)
            .await;
    }

    /// Applies a join: leave the prior room, enter the named one, then
    /// resend history to the joiner and the population count to the room.
    async fn handle_join(&self, event: &Value) {
        let Some(room_id) = messages::join_room_id(event) else {
            warn!(client_id = %self.session.client_id(), "join without roomId dropped");
            return;
        };
        let room_id = match RoomId::new(room_id) {
            Ok(room_id) => room_id,
            Err(error) => {
                warn!(client_id = %self.session.client_id(), %error, "join with invalid roomId dropped");
                return;
            }
        };

        let prior = self.session.set_room(Some(room_id.clone()));
        // Re-joining the current room keeps its history intact; moving
        // rooms releases the old membership first.
        if let Some(prior_room) = prior.filter(|prior_room| *prior_room != room_id) {
            if self
                .hub
                .registry()
                .remove_member(&prior_room, self.session.client_id())
                .await
            {
                self.hub.broadcaster().send_room_user_count(&prior_room).await;
            }
        }
        self.hub
            .registry()
            .add_member(&room_id, self.session.client_id())
            .await;

        debug!(client_id = %self.session.client_id(), room_id = %room_id, "joined room");

        self.hub
            .broadcaster()
            .send_room_history(self.session.client_id(), &room_id)
            .await;
        self.hub.broadcaster().send_room_user_count(&room_id).await;
    }

    /// A transport-level pong refreshes the liveness timestamp.
    pub fn handle_pong(&self) {
        self.session.touch();
    }

    /// Releases the session on close or error. Idempotent, and harmless
    /// when the session was already displaced by a reconnect.
    pub async fn handle_close(&self) {
        self.hub.drop_session(&self.session).await;
    }

    async fn reply_error(&self, message: &str) {
        if !self.session.transport().is_open() {
            return;
        }
        let reply = ServerMessage::Error {
            message: message.to_string(),
        };
        if let Err(error) = self.session.transport().send_text(&reply.to_json()).await {
            debug!(client_id = %self.session.client_id(), %error, "failed to send error reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockTransport;
    use crate::config::RelayConfig;
    use serde_json::json;

    async fn connect(hub: &Arc<RelayHub>, id: &str) -> (ConnectionHandler, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let handler = ConnectionHandler::accept(
            hub.clone(),
            ClientId::new(id).unwrap(),
            transport.clone(),
        )
        .await;
        transport.clear_sent();
        (handler, transport)
    }

    async fn join(handler: &ConnectionHandler, room: &str) {
        handler
            .handle_frame(&json!({"type": "join", "roomId": room}).to_string())
            .await;
    }

    fn hub() -> Arc<RelayHub> {
        RelayHub::new(RelayConfig::default())
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[tokio::test]
    async fn accept_sends_welcome_first() {
        let hub = hub();
        let transport = Arc::new(MockTransport::new());
        let handler = ConnectionHandler::accept(
            hub.clone(),
            ClientId::new("a").unwrap(),
            transport.clone(),
        )
        .await;

        let welcome = transport.sent_values().remove(0);
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["clientId"], "a");
        assert!(welcome["state"]["color"].as_str().unwrap().starts_with('#'));
        drop(handler);
    }

    #[tokio::test]
    async fn join_sends_history_then_user_count() {
        let hub = hub();
        let (handler, transport) = connect(&hub, "a").await;

        join(&handler, "r1").await;

        let frames = transport.sent_values();
        assert_eq!(frames[0]["type"], "roomHistory");
        assert_eq!(frames[0]["roomId"], "r1");
        assert_eq!(frames[1]["type"], "roomUserCount");
        assert_eq!(frames[1]["count"], 1);
    }

    #[tokio::test]
    async fn join_switches_rooms_and_updates_both_counts() {
        let hub = hub();
        let (a, _a_t) = connect(&hub, "a").await;
        let (b, b_t) = connect(&hub, "b").await;
        join(&a, "r1").await;
        join(&b, "r1").await;
        b_t.clear_sent();

        join(&a, "r2").await;

        assert_eq!(hub.registry().user_count(&room("r1")).await, 1);
        assert_eq!(hub.registry().user_count(&room("r2")).await, 1);
        // b saw r1 shrink.
        let counts = b_t.frames_of_type("roomUserCount");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0]["roomId"], "r1");
        assert_eq!(counts[0]["count"], 1);
    }

    #[tokio::test]
    async fn rejoining_same_room_keeps_history_and_resends_it() {
        let hub = hub();
        let (a, a_t) = connect(&hub, "a").await;
        join(&a, "r1").await;
        a.handle_frame(&json!({"type": "note", "seq": 1}).to_string())
            .await;
        a_t.clear_sent();

        join(&a, "r1").await;

        assert_eq!(hub.registry().user_count(&room("r1")).await, 1);
        let history = a_t.frames_of_type("roomHistory");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["history"][0]["seq"], 1);
    }

    #[tokio::test]
    async fn join_without_room_id_is_dropped() {
        let hub = hub();
        let (a, a_t) = connect(&hub, "a").await;

        a.handle_frame(&json!({"type": "join"}).to_string()).await;

        assert_eq!(a_t.sent_count(), 0);
        assert!(hub.registry().rooms_of(a.session().client_id()).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_gets_error_reply_and_keeps_connection() {
        let hub = hub();
        let (a, a_t) = connect(&hub, "a").await;

        a.handle_frame("not json").await;

        assert_eq!(
            a_t.last_value().unwrap(),
            json!({"type": "error", "message": "Invalid JSON"})
        );
        assert!(a_t.is_open());
        assert_eq!(hub.session_count().await, 1);
    }

    #[tokio::test]
    async fn events_before_join_are_silently_dropped() {
        let hub = hub();
        let (a, a_t) = connect(&hub, "a").await;
        let (b, b_t) = connect(&hub, "b").await;
        join(&b, "r1").await;
        b_t.clear_sent();

        a.handle_frame(&json!({"type": "draw", "x": 1, "y": 1}).to_string())
            .await;

        assert_eq!(a_t.sent_count(), 0);
        assert_eq!(b_t.sent_count(), 0);
    }

    #[tokio::test]
    async fn draw_updates_state_and_is_relayed_and_archived() {
        let hub = hub();
        let (a, _a_t) = connect(&hub, "a").await;
        let (b, b_t) = connect(&hub, "b").await;
        join(&a, "r1").await;
        join(&b, "r1").await;
        b_t.clear_sent();

        let draw = json!({"type": "draw", "x": 100, "y": 200, "color": "#ff0000"});
        a.handle_frame(&draw.to_string()).await;

        let state = a.session().state_snapshot();
        assert_eq!(state.x, 100);
        assert_eq!(state.y, 200);
        assert_eq!(state.color, "#ff0000");

        assert_eq!(b_t.sent_values(), vec![draw.clone()]);
        assert_eq!(hub.registry().history_of(&room("r1")).await, vec![draw]);
    }

    #[tokio::test]
    async fn untyped_and_unknown_events_are_relayed_verbatim() {
        let hub = hub();
        let (a, _a_t) = connect(&hub, "a").await;
        let (b, b_t) = connect(&hub, "b").await;
        join(&a, "r1").await;
        join(&b, "r1").await;
        b_t.clear_sent();

        let custom = json!({"type": "chat", "body": "hello"});
        a.handle_frame(&custom.to_string()).await;
        let untyped = json!({"payload": [1, 2, 3]});
        a.handle_frame(&untyped.to_string()).await;

        assert_eq!(b_t.sent_values(), vec![custom, untyped]);
    }

    #[tokio::test]
    async fn close_releases_membership_and_notifies_room() {
        let hub = hub();
        let (a, _a_t) = connect(&hub, "a").await;
        let (b, b_t) = connect(&hub, "b").await;
        join(&a, "r1").await;
        join(&b, "r1").await;
        b_t.clear_sent();

        a.handle_close().await;

        assert_eq!(hub.session_count().await, 1);
        assert_eq!(hub.registry().user_count(&room("r1")).await, 1);
        let counts = b_t.frames_of_type("roomUserCount");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0]["count"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pong_refreshes_liveness() {
        let hub = hub();
        let (a, _a_t) = connect(&hub, "a").await;

        tokio::time::advance(std::time::Duration::from_secs(50)).await;
        assert!(!a.session().is_alive(hub.config().liveness_threshold()));

        a.handle_pong();
        assert!(a.session().is_alive(hub.config().liveness_threshold()));
    }
}
