//! Domain model for the relay: identities, per-session state, rooms.

mod errors;
mod ids;
mod room;
mod state;

pub use errors::ValidationError;
pub use ids::{ClientId, RoomId};
pub use room::Room;
pub use state::ClientState;
