// Domain layer: round rules, player liveness, scoring, and the ports they drive.

pub mod errors;
pub mod events;
pub mod liveness;
pub mod minigames;
pub mod phase;
pub mod ports;
pub mod replicated;
pub mod roster;
pub mod scoring;
pub mod state;

pub use state::{
    Authority, EntityRef, GateEvent, GateKind, MinigameVariant, PlayerId, PlayerRecord,
    RoundState, SceneMode, SpawnPoint,
};
