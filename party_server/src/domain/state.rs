// Domain-level identities, round states, and gate signals.

use std::fmt;

/// Opaque identifier for a connected participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Identity used when the server itself requests an engine operation.
    pub const SERVER: PlayerId = PlayerId(0);
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup key for a spawned player-controlled entity.
///
/// The entity lives in the engine; the core never owns it and may find the key
/// stale after a despawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

impl SpawnPoint {
    pub const fn new(x: f32, y: f32, z: f32, yaw: f32) -> Self {
        Self { x, y, z, yaw }
    }
}

/// Directory entry for one connected player.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub display_name: String,
    pub account_id: u64,
    pub entity: Option<EntityRef>,
}

/// Server-authoritative phase of the round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Lobby,
    Transitioning,
    CountdownPending,
    CountdownRunning,
    PlayActive,
    Ending,
}

/// Every minigame the server knows how to host.
///
/// `Blank` is the lobby scene between rounds and is never scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MinigameVariant {
    Blank,
    Replicate,
    Telephone,
    RaceToHeaven,
    Ascend,
    PushToShove,
    Knockoff,
}

impl MinigameVariant {
    /// Declaration order; selection fallbacks walk this list.
    pub const ALL: [MinigameVariant; 7] = [
        MinigameVariant::Blank,
        MinigameVariant::Replicate,
        MinigameVariant::Telephone,
        MinigameVariant::RaceToHeaven,
        MinigameVariant::Ascend,
        MinigameVariant::PushToShove,
        MinigameVariant::Knockoff,
    ];

    pub fn is_lobby(self) -> bool {
        matches!(self, MinigameVariant::Blank)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MinigameVariant::Blank => "blank",
            MinigameVariant::Replicate => "replicate",
            MinigameVariant::Telephone => "telephone",
            MinigameVariant::RaceToHeaven => "race_to_heaven",
            MinigameVariant::Ascend => "ascend",
            MinigameVariant::PushToShove => "push_to_shove",
            MinigameVariant::Knockoff => "knockoff",
        }
    }
}

impl fmt::Display for MinigameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Finish,
    Death,
}

/// A player-controlled entity entered a trigger volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateEvent {
    pub player: PlayerId,
    pub kind: GateKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneMode {
    Single,
    Additive,
}

/// Role of whoever raised a request; only the server may mutate shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Server,
    Client(PlayerId),
}
