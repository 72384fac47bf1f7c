// Domain-level errors for roster, scene, and authority checks.

use super::state::{PlayerId, SceneMode};

#[derive(Debug, PartialEq, Eq)]
pub enum RosterError {
    AlreadyRegistered(PlayerId),
}

/// Failure reported by the engine when a scene operation cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    LoadRejected { scene: String, mode: SceneMode },
    UnloadRejected { scene: String },
    Unavailable,
}

/// A client tried to perform a server-only operation.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthorityError {
    ServerOnly { caller: PlayerId },
}

/// A player-control collaborator could not act on the requested player.
#[derive(Debug, PartialEq, Eq)]
pub enum ControlError {
    MissingEntity(PlayerId),
    Disconnected(PlayerId),
}
