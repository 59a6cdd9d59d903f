//! Transport port - the connection handle the hub sends through.
//!
//! The hub never touches the underlying socket library. Everything it
//! needs from a connection is behind this trait: text frames out, a
//! protocol-level keepalive ping, a forced close, and an openness probe.
//!
//! Two adapters implement it: the axum WebSocket transport (production)
//! and an in-memory mock (tests).

use async_trait::async_trait;

/// Errors a transport can surface on send.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection is no longer open.
    #[error("transport is closed")]
    Closed,

    /// The underlying socket rejected the frame.
    #[error("send failed: {0}")]
    Send(String),
}

/// One live connection to a client.
///
/// Implementations must be safe to share: the owning connection task,
/// the broadcaster, and the heartbeat scheduler all hold the same handle.
/// `close` is idempotent, and a closed transport fails sends with
/// [`TransportError::Closed`] rather than panicking.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one UTF-8 text frame.
    async fn send_text(&self, payload: &str) -> Result<(), TransportError>;

    /// Sends a protocol-level ping frame (distinct from application events).
    async fn send_ping(&self) -> Result<(), TransportError>;

    /// Force-closes the connection. Safe to call more than once.
    async fn close(&self);

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;
}
