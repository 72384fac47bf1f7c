// Ports for the engine collaborators the round logic drives.

use std::time::Duration;

use super::errors::{ControlError, SceneError};
use super::scoring::ScoreDelta;
use super::state::{EntityRef, MinigameVariant, PlayerId, SceneMode, SpawnPoint};

// Port for retrieving the current time.
pub trait Clock: Send {
    /// Monotonic time since an arbitrary origin fixed for the session.
    fn now(&self) -> Duration;
}

/// Port for scene loading; completion arrives later as a session event.
pub trait SceneDirector: Send {
    fn load(&mut self, scene: &str, mode: SceneMode) -> Result<(), SceneError>;
    fn unload(&mut self, scene: &str) -> Result<(), SceneError>;
}

/// Port for the engine side of a player's body and its input lock.
pub trait PlayerControl: Send {
    fn spawn_entity(&mut self, player: PlayerId, at: SpawnPoint) -> Result<EntityRef, ControlError>;
    fn despawn_entity(&mut self, player: PlayerId, entity: EntityRef);
    fn teleport(&mut self, player: PlayerId, to: SpawnPoint) -> Result<(), ControlError>;
    fn freeze(
        &mut self,
        player: PlayerId,
        entity: Option<EntityRef>,
        include_camera: bool,
    ) -> Result<(), ControlError>;
    fn unfreeze(&mut self, player: PlayerId, entity: Option<EntityRef>) -> Result<(), ControlError>;
}

/// Addressing for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Everyone,
    Owner(EntityRef),
    Single(PlayerId),
}

/// Remote calls the server issues to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Teleport { to: SpawnPoint },
    LockInput { include_camera: bool },
    UnlockInput,
    CountdownText { text: String },
    LivesChanged { player: PlayerId, lives: u32 },
    LoadScene { scene: String, mode: SceneMode },
    UnloadScene { scene: String },
    PlayerJoined { player: PlayerId, display_name: String },
    PlayerLeft { player: PlayerId, display_name: String },
    ScoreUpdated { player: PlayerId, total: i64 },
    SpectateTarget { target: Option<PlayerId> },
    EntitySpawned { player: PlayerId, entity: EntityRef, at: SpawnPoint },
    EntityDespawned { player: PlayerId, entity: EntityRef },
    MinigameInitialized { variant: MinigameVariant, players: Vec<PlayerId> },
    RoundResults { variant: MinigameVariant, deltas: Vec<ScoreDelta> },
}

/// Port for the remote-call transport.
pub trait ClientOutbox: Send {
    fn send(&mut self, target: Target, command: ClientCommand);
}
