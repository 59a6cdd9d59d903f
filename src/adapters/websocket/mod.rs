//! WebSocket surface: upgrade handling and the axum transport.
//!
//! # Components
//!
//! - [`handler`] - upgrade route, per-connection event loop, health probe
//! - [`transport`] - [`crate::ports::Transport`] over an axum socket

mod handler;
mod transport;

pub use handler::{router, AppState};
pub use transport::WsTransport;
