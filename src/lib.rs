//! Roomcast - room-scoped real-time message relay
//!
//! Clients connect over WebSocket, identify themselves with a stable
//! client id, join a named room, and exchange arbitrary JSON events with
//! the other members of that room. The server keeps a bounded per-room
//! history for late joiners and broadcasts room population counts.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod hub;
pub mod ports;
