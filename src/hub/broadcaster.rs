//! Fan-out engine: relays one serialized event to room members.
//!
//! Snapshots are taken under the registry/directory locks and every send
//! happens strictly after the locks are released, so a slow client can
//! never block room mutation. Each recipient gets an independent
//! timeout-and-retry budget; one recipient failing never aborts the
//! fan-out to the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::domain::{ClientId, RoomId};
use crate::ports::Transport;

use super::messages::ServerMessage;
use super::registry::RoomRegistry;
use super::sessions::SessionDirectory;

/// Relays serialized events to room members over their transports.
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
    sessions: Arc<SessionDirectory>,
    send_timeout: Duration,
    retry_delay: Duration,
    max_retries: u32,
    stamp_sender: bool,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<RoomRegistry>,
        sessions: Arc<SessionDirectory>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            registry,
            sessions,
            send_timeout: config.send_timeout(),
            retry_delay: config.send_retry_delay(),
            max_retries: config.send_max_retries,
            stamp_sender: config.stamp_sender,
        }
    }

    /// Relays an event from `sender_id` to every other member of every
    /// room the sender occupies.
    pub async fn broadcast(&self, sender_id: &ClientId, event: &Value) {
        if self.sessions.get(sender_id).await.is_none() {
            debug!(client_id = %sender_id, "broadcast from unknown session dropped");
            return;
        }

        let rooms = self.registry.rooms_of(sender_id).await;
        if rooms.is_empty() {
            debug!(client_id = %sender_id, "broadcast from roomless session dropped");
            return;
        }

        let payload = match self.serialize_relay(sender_id, event) {
            Some(payload) => payload,
            None => return,
        };

        for room_id in &rooms {
            let members = self.registry.members_of(room_id).await;
            let recipients: Vec<_> = {
                let lookups = members
                    .iter()
                    .filter(|member| *member != sender_id)
                    .map(|member| self.sessions.get(member));
                join_all(lookups).await.into_iter().flatten().collect()
            };

            let sends = recipients.iter().filter_map(|session| {
                if !session.transport().is_open() {
                    debug!(
                        client_id = %session.client_id(),
                        room_id = %room_id,
                        "skipping recipient with closed transport"
                    );
                    return None;
                }
                let payload = Arc::clone(&payload);
                Some(async move {
                    self.send_with_retry(session.transport(), &payload, session.client_id())
                        .await
                })
            });
            join_all(sends).await;
        }
    }

    /// Delivers the current population of a room to every member.
    pub async fn send_room_user_count(&self, room_id: &RoomId) {
        let members = self.registry.members_of(room_id).await;
        let payload: Arc<str> = ServerMessage::RoomUserCount {
            room_id: room_id.to_string(),
            count: members.len(),
        }
        .to_json()
        .into();

        let recipients = join_all(members.iter().map(|member| self.sessions.get(member)))
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        join_all(recipients.iter().map(|session| {
            let payload = Arc::clone(&payload);
            async move {
                self.send_with_retry(session.transport(), &payload, session.client_id())
                    .await
            }
        }))
        .await;
    }

    /// Delivers a room's history snapshot to one client.
    pub async fn send_room_history(&self, client_id: &ClientId, room_id: &RoomId) {
        let Some(session) = self.sessions.get(client_id).await else {
            debug!(client_id = %client_id, "history requested for unknown session");
            return;
        };

        let payload = ServerMessage::RoomHistory {
            room_id: room_id.to_string(),
            history: self.registry.history_of(room_id).await,
        }
        .to_json();

        self.send_with_retry(session.transport(), &payload, client_id)
            .await;
    }

    /// Attempts a send with the configured timeout-and-retry budget.
    ///
    /// Returns false once every pass has failed or the transport is no
    /// longer open. Failure never evicts the recipient; liveness is the
    /// heartbeat scheduler's job.
    pub async fn send_with_retry(
        &self,
        transport: &Arc<dyn Transport>,
        payload: &str,
        client_id: &ClientId,
    ) -> bool {
        for attempt in 1..=self.max_retries {
            if !transport.is_open() {
                debug!(client_id = %client_id, attempt, "transport closed, abandoning send");
                return false;
            }

            match tokio::time::timeout(self.send_timeout, transport.send_text(payload)).await {
                Ok(Ok(())) => return true,
                Ok(Err(error)) => {
                    warn!(client_id = %client_id, attempt, %error, "send failed");
                }
                Err(_) => {
                    warn!(
                        client_id = %client_id,
                        attempt,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "send timed out"
                    );
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!(client_id = %client_id, retries = self.max_retries, "giving up on recipient");
        false
    }

    /// Serializes the relay payload once, optionally stamping the sender.
    /// The shared allocation is cloned per recipient, not the text.
    fn serialize_relay(&self, sender_id: &ClientId, event: &Value) -> Option<Arc<str>> {
        let result = if self.stamp_sender {
            let mut stamped = event.clone();
            if let Some(object) = stamped.as_object_mut() {
                object.insert("sender".to_string(), Value::String(sender_id.to_string()));
            }
            serde_json::to_string(&stamped)
        } else {
            serde_json::to_string(event)
        };

        match result {
            Ok(payload) => Some(payload.into()),
            Err(error) => {
                warn!(client_id = %sender_id, %error, "failed to serialize relay payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockTransport;
    use crate::hub::sessions::ClientSession;
    use serde_json::json;

    struct Fixture {
        registry: Arc<RoomRegistry>,
        sessions: Arc<SessionDirectory>,
        config: RelayConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(RelayConfig::default())
        }

        fn with_config(config: RelayConfig) -> Self {
            Self {
                registry: Arc::new(RoomRegistry::new(config.history_capacity)),
                sessions: Arc::new(SessionDirectory::new()),
                config,
            }
        }

        fn broadcaster(&self) -> Broadcaster {
            Broadcaster::new(self.registry.clone(), self.sessions.clone(), &self.config)
        }

        async fn connect(&self, id: &str, room: &str) -> Arc<MockTransport> {
            let transport = Arc::new(MockTransport::new());
            let session = Arc::new(ClientSession::new(
                ClientId::new(id).unwrap(),
                transport.clone(),
            ));
            self.sessions.insert(session).await;
            self.registry
                .add_member(&RoomId::new(room).unwrap(), &ClientId::new(id).unwrap())
                .await;
            transport
        }
    }

    fn client(id: &str) -> ClientId {
        ClientId::new(id).unwrap()
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[tokio::test]
    async fn broadcast_reaches_other_members_only() {
        let fixture = Fixture::new();
        let a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;

        let event = json!({"type": "draw", "x": 100, "y": 200});
        fixture.broadcaster().broadcast(&client("a"), &event).await;

        assert_eq!(a.sent_count(), 0);
        assert_eq!(b.sent_values(), vec![event]);
    }

    #[tokio::test]
    async fn broadcast_stays_within_the_room() {
        let fixture = Fixture::new();
        let _a = fixture.connect("a", "r1").await;
        let c = fixture.connect("c", "r2").await;

        fixture
            .broadcaster()
            .broadcast(&client("a"), &json!({"type": "draw"}))
            .await;

        assert_eq!(c.sent_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_from_roomless_sender_is_dropped() {
        let fixture = Fixture::new();
        let transport = Arc::new(MockTransport::new());
        fixture
            .sessions
            .insert(Arc::new(ClientSession::new(client("a"), transport)))
            .await;
        let b = fixture.connect("b", "r1").await;

        fixture
            .broadcaster()
            .broadcast(&client("a"), &json!({"type": "draw"}))
            .await;

        assert_eq!(b.sent_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_skips_closed_recipients() {
        let fixture = Fixture::new();
        let _a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;
        let c = fixture.connect("c", "r1").await;
        b.close().await;

        fixture
            .broadcaster()
            .broadcast(&client("a"), &json!({"type": "note"}))
            .await;

        assert_eq!(b.sent_count(), 0);
        assert_eq!(c.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_recipient_does_not_starve_others() {
        let fixture = Fixture::new();
        let _a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;
        let c = fixture.connect("c", "r1").await;
        b.fail_next_sends(usize::MAX);

        fixture
            .broadcaster()
            .broadcast(&client("a"), &json!({"type": "note"}))
            .await;

        assert_eq!(b.sent_count(), 0);
        assert_eq!(c.sent_count(), 1);
    }

    #[tokio::test]
    async fn stamped_relay_carries_sender_id() {
        let fixture = Fixture::with_config(RelayConfig {
            stamp_sender: true,
            ..Default::default()
        });
        let _a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;

        fixture
            .broadcaster()
            .broadcast(&client("a"), &json!({"type": "note", "body": "hi"}))
            .await;

        let received = b.last_value().unwrap();
        assert_eq!(received["sender"], "a");
        assert_eq!(received["body"], "hi");
    }

    #[tokio::test]
    async fn unstamped_relay_is_verbatim() {
        let fixture = Fixture::new();
        let _a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;

        let event = json!({"type": "note", "body": "hi"});
        fixture.broadcaster().broadcast(&client("a"), &event).await;

        assert_eq!(b.last_value().unwrap(), event);
    }

    #[tokio::test]
    async fn user_count_goes_to_every_member() {
        let fixture = Fixture::new();
        let a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;

        fixture.broadcaster().send_room_user_count(&room("r1")).await;

        for transport in [&a, &b] {
            let frame = transport.last_value().unwrap();
            assert_eq!(frame["type"], "roomUserCount");
            assert_eq!(frame["roomId"], "r1");
            assert_eq!(frame["count"], 2);
        }
    }

    #[tokio::test]
    async fn history_goes_to_one_client() {
        let fixture = Fixture::new();
        let a = fixture.connect("a", "r1").await;
        let b = fixture.connect("b", "r1").await;
        fixture
            .registry
            .append_history(&room("r1"), json!({"type": "note", "seq": 1}))
            .await;

        fixture
            .broadcaster()
            .send_room_history(&client("a"), &room("r1"))
            .await;

        let frame = a.last_value().unwrap();
        assert_eq!(frame["type"], "roomHistory");
        assert_eq!(frame["history"][0]["seq"], 1);
        assert_eq!(b.sent_count(), 0);
    }

    // ─── send_with_retry ─────────────────────────────────────────────

    #[tokio::test]
    async fn send_succeeds_on_first_pass() {
        let fixture = Fixture::new();
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());

        let delivered = fixture
            .broadcaster()
            .send_with_retry(&transport, "{}", &client("a"))
            .await;

        assert!(delivered);
    }

    #[tokio::test]
    async fn send_to_closed_transport_returns_false_immediately() {
        let fixture = Fixture::new();
        let mock = Arc::new(MockTransport::new());
        mock.close().await;
        let transport: Arc<dyn Transport> = mock.clone();

        let delivered = fixture
            .broadcaster()
            .send_with_retry(&transport, "{}", &client("a"))
            .await;

        assert!(!delivered);
        assert_eq!(mock.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_recovers_after_transient_failure() {
        let fixture = Fixture::new();
        let mock = Arc::new(MockTransport::new());
        mock.fail_next_sends(1);
        let transport: Arc<dyn Transport> = mock.clone();

        let delivered = fixture
            .broadcaster()
            .send_with_retry(&transport, "{}", &client("a"))
            .await;

        assert!(delivered);
        assert_eq!(mock.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_gives_up_after_all_passes() {
        let fixture = Fixture::new();
        let mock = Arc::new(MockTransport::new());
        mock.fail_next_sends(3);
        let transport: Arc<dyn Transport> = mock.clone();

        let delivered = fixture
            .broadcaster()
            .send_with_retry(&transport, "{}", &client("a"))
            .await;

        assert!(!delivered);
        assert_eq!(mock.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_times_out_and_gives_up() {
        let fixture = Fixture::new();
        let mock = Arc::new(MockTransport::new());
        mock.stall_sends(Duration::from_secs(60));
        let transport: Arc<dyn Transport> = mock.clone();

        let started = tokio::time::Instant::now();
        let delivered = fixture
            .broadcaster()
            .send_with_retry(&transport, "{}", &client("a"))
            .await;

        assert!(!delivered);
        assert_eq!(mock.sent_count(), 0);
        // 3 passes x 5s timeout with 1s between passes.
        assert_eq!(started.elapsed(), Duration::from_secs(17));
    }
}
