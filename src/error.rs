/// Recoverable conditions raised by the tracker's reducers.
///
/// None of these ever reach the user. The engine logs them at debug level and
/// carries on; the worst outcome is a stale readout until the next event.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("'{0}' is not a tracked boss")]
    UnknownBoss(String),

    #[error("party message for npc {npc_index} came from world {world}, local world is {local_world}")]
    StaleMessage {
        npc_index:   u32,
        world:       u32,
        local_world: u32,
    },

    #[error("duplicate party message for npc {0}")]
    Duplicate(u32),

    #[error("no active encounter for npc {0}")]
    NoActiveEncounter(u32),

    #[error("local player context unavailable: {0}")]
    MissingLocalPlayerContext(&'static str),
}
