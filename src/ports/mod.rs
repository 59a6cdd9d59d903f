//! Ports: interfaces the relay core consumes, implemented by adapters.

mod transport;

pub use transport::{Transport, TransportError};
