//! Heartbeat scheduler: process-wide liveness sweep.
//!
//! One periodic task scans every session. Sessions idle past the
//! absolute threshold are evicted through the normal drop path; the
//! rest get a transport-level ping so their pongs keep refreshing the
//! activity timestamp.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ports::Transport as _;

use super::RelayHub;

/// Spawns the scheduler. The first sweep runs one interval after start.
pub(crate) fn spawn(hub: Arc<RelayHub>, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = hub.config().heartbeat_interval();
        let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticks.tick() => {
                    sweep(&hub).await;
                }
            }
        }
        debug!("heartbeat scheduler stopped");
    })
}

/// One scan over the session directory. Returns how many sessions were
/// evicted.
pub(crate) async fn sweep(hub: &Arc<RelayHub>) -> usize {
    let threshold = hub.config().liveness_threshold();
    let mut stale = Vec::new();

    for session in hub.sessions().snapshot().await {
        if !session.is_alive(threshold) {
            stale.push(session);
        } else if session.transport().is_open() {
            if let Err(error) = session.transport().send_ping().await {
                debug!(client_id = %session.client_id(), %error, "ping failed");
            }
        }
    }

    let evicted = stale.len();
    for session in stale {
        warn!(
            client_id = %session.client_id(),
            idle_ms = session.idle_for().as_millis() as u64,
            "evicting stale session"
        );
        session.transport().close().await;
        hub.drop_session(&session).await;
    }
    evicted
}
