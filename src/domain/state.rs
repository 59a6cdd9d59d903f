//! Presentational state carried by each client session.

use rand::{thread_rng, Rng};

/// Cursor position and assigned color for one session.
///
/// Coordinates default to the origin and fold in updates from `draw`
/// events. The color is assigned uniformly at random when the session is
/// created and may be replaced by a `draw` event carrying one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub x: i64,
    pub y: i64,
    pub color: String,
}

impl ClientState {
    /// Creates the initial state with a random color.
    pub fn new() -> Self {
        Self {
            x: 0,
            y: 0,
            color: random_color(),
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniformly-random 6-digit hex color with a leading `#`.
fn random_color() -> String {
    let mut rng = thread_rng();
    format!(
        "#{:02x}{:02x}{:02x}",
        rng.gen::<u8>(),
        rng.gen::<u8>(),
        rng.gen::<u8>()
    )
}
