//! The relay hub: shared state and lifecycle of the relay core.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RelayHub                              │
//! │  ┌───────────────┐ ┌──────────────────┐ ┌────────────────┐  │
//! │  │ RoomRegistry  │ │ SessionDirectory │ │  Broadcaster   │  │
//! │  │ rooms,history │ │ id → session     │ │  fan-out+retry │  │
//! │  └───────────────┘ └──────────────────┘ └────────────────┘  │
//! │            ▲                 ▲                  ▲            │
//! └────────────┼─────────────────┼──────────────────┼────────────┘
//!              │                 │                  │
//!     ConnectionHandler (one per connection)   Heartbeat task
//! ```
//!
//! The hub handle is passed explicitly to the accept path; there is no
//! module-level singleton.

mod broadcaster;
mod connection;
mod heartbeat;
pub mod messages;
mod registry;
mod sessions;

pub use broadcaster::Broadcaster;
pub use connection::ConnectionHandler;
pub use registry::RoomRegistry;
pub use sessions::{ClientSession, SessionDirectory};

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RelayConfig;
use crate::domain::{ClientId, RoomId};
use crate::ports::Transport;

/// Process-wide relay state: registries, fan-out, and the heartbeat task.
pub struct RelayHub {
    config: RelayConfig,
    registry: Arc<RoomRegistry>,
    sessions: Arc<SessionDirectory>,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl RelayHub {
    /// Builds a hub without starting the heartbeat scheduler.
    pub fn new(config: RelayConfig) -> Arc<Self> {
        let registry = Arc::new(RoomRegistry::new(config.history_capacity));
        let sessions = Arc::new(SessionDirectory::new());
        let broadcaster = Broadcaster::new(registry.clone(), sessions.clone(), &config);
        Arc::new(Self {
            config,
            registry,
            sessions,
            broadcaster,
            shutdown: CancellationToken::new(),
            heartbeat: Mutex::new(None),
        })
    }

    /// Builds a hub and starts the heartbeat scheduler.
    pub fn start(config: RelayConfig) -> Arc<Self> {
        let hub = Self::new(config);
        let task = heartbeat::spawn(hub.clone(), hub.shutdown.clone());
        *hub.heartbeat.lock().expect("heartbeat lock poisoned") = Some(task);
        info!("relay hub started");
        hub
    }

    /// Admits a connection under the given identity.
    ///
    /// Any prior session for the same id is displaced: its transport is
    /// force-closed (no farewell frame) and its room membership carries
    /// over to the new session, whose arrival is announced with a fresh
    /// population count. Returns the new session and the resumed room.
    pub async fn admit(
        &self,
        client_id: ClientId,
        transport: Arc<dyn Transport>,
    ) -> (Arc<ClientSession>, Option<RoomId>) {
        let prior_room = match self.sessions.remove(&client_id).await {
            Some(displaced) => {
                let room = displaced.set_room(None);
                displaced.transport().close().await;
                if let Some(room_id) = &room {
                    self.registry.remove_member(room_id, &client_id).await;
                }
                info!(client_id = %client_id, "displaced prior session for reconnect");
                room
            }
            None => None,
        };

        let session = Arc::new(ClientSession::new(client_id.clone(), transport));
        self.sessions.insert(session.clone()).await;

        if let Some(room_id) = &prior_room {
            session.set_room(Some(room_id.clone()));
            self.registry.add_member(room_id, &client_id).await;
            self.broadcaster.send_room_user_count(room_id).await;
        }

        (session, prior_room)
    }

    /// Removes a session and its room membership, announcing the changed
    /// population. No-op when this exact session is no longer in the
    /// directory (already dropped, or displaced by a reconnect).
    pub async fn drop_session(&self, session: &Arc<ClientSession>) {
        if !self.sessions.remove_exact(session).await {
            return;
        }

        let room = session.set_room(None);
        if let Some(room_id) = &room {
            if self.registry.remove_member(room_id, session.client_id()).await {
                self.broadcaster.send_room_user_count(room_id).await;
            }
        }
        info!(client_id = %session.client_id(), "session dropped");
    }

    /// Drops whatever session currently holds the given id. No-op for
    /// unknown ids.
    pub async fn drop_client(&self, client_id: &ClientId) {
        if let Some(session) = self.sessions.get(client_id).await {
            self.drop_session(&session).await;
        }
    }

    /// Stops the heartbeat scheduler, force-closes every transport, and
    /// resets both registries.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = self
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let drained = self.sessions.clear().await;
        for session in &drained {
            session.transport().close().await;
        }
        self.registry.clear().await;
        info!(closed = drained.len(), "relay hub stopped");
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionDirectory> {
        &self.sessions
    }

    pub(crate) fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }
}
