//! Coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables shared by the coordinator, presence monitor and phase
/// scheduler.
///
/// The defaults are the production values. Tests usually keep them and
/// run on paused time instead of shrinking them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Spectator slots per room, on top of `max_participants`.
    pub max_spectators: u32,

    /// How long a disconnected participant has to come back before it is
    /// evicted.
    pub reconnect_grace: Duration,

    /// Delay between announcing that a room will close and deleting it.
    pub deletion_delay: Duration,

    /// Period of the viability sweep over started rooms.
    pub sweep_interval: Duration,

    /// Length of the voting phase at the end of a debate.
    pub voting_time: Duration,

    /// Step of the phase countdown.
    pub tick_resolution: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_spectators: 4,
            reconnect_grace: Duration::from_secs(10),
            deletion_delay: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(10),
            voting_time: Duration::from_secs(30),
            tick_resolution: Duration::from_secs(1),
        }
    }
}
