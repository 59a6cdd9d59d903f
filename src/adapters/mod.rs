//! Adapters implementing the transport port and the HTTP surface.

pub mod mock;
pub mod websocket;
