// Wire protocol DTOs and conversions for public party server messages.
// Internal engine-to-server DTOs live in `net::internal`.

use crate::domain::liveness::SpectateDirection;
use crate::domain::ports::ClientCommand;
use crate::domain::scoring::{ScoreDelta, Standing};
use crate::domain::{PlayerId, RoundState, SceneMode, SpawnPoint};
use crate::use_cases::SessionView;
use serde::{Deserialize, Serialize};

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity for the connection after Join is accepted.
    Identity { player_id: String },
    // Join refused; the socket closes right after.
    Denied { reason: String },
    // Round state and clock projection for UI.
    RoundStatus(RoundStatusDto),
    Teleport(SpawnPointDto),
    LockInput { include_camera: bool },
    UnlockInput,
    CountdownText { text: String },
    LivesChanged { player_id: String, lives: u32 },
    LoadScene { scene: String, mode: SceneModeDto },
    UnloadScene { scene: String },
    PlayerJoined { player_id: String, display_name: String },
    PlayerLeft { player_id: String, display_name: String },
    ScoreUpdated { player_id: String, total: i64 },
    SpectateTarget { player_id: Option<String> },
    EntitySpawned {
        player_id: String,
        entity_id: String,
        at: SpawnPointDto,
    },
    EntityDespawned { player_id: String, entity_id: String },
    MinigameInitialized {
        minigame: String,
        player_ids: Vec<String>,
    },
    RoundResults {
        minigame: String,
        results: Vec<ScoreDeltaDto>,
    },
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake message with identity metadata.
    Join(JoinPayload),
    // Dead players cycle their spectate camera.
    Spectate { direction: SpectateDirectionDto },
}

/// Payload for the Join handshake with identity metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinPayload {
    pub display_name: String,
    #[serde(default)]
    pub account_id: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectateDirectionDto {
    Next,
    Previous,
}

impl From<SpectateDirectionDto> for SpectateDirection {
    fn from(direction: SpectateDirectionDto) -> Self {
        match direction {
            SpectateDirectionDto::Next => SpectateDirection::Next,
            SpectateDirectionDto::Previous => SpectateDirection::Previous,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpawnPointDto {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

impl From<SpawnPoint> for SpawnPointDto {
    fn from(point: SpawnPoint) -> Self {
        Self {
            x: point.x,
            y: point.y,
            z: point.z,
            yaw: point.yaw,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum SceneModeDto {
    Single,
    Additive,
}

impl From<SceneMode> for SceneModeDto {
    fn from(mode: SceneMode) -> Self {
        match mode {
            SceneMode::Single => SceneModeDto::Single,
            SceneMode::Additive => SceneModeDto::Additive,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreDeltaDto {
    pub player_id: String,
    pub rank: usize,
    pub points: i64,
    pub survived: bool,
}

impl From<&ScoreDelta> for ScoreDeltaDto {
    fn from(delta: &ScoreDelta) -> Self {
        Self {
            player_id: delta.player.to_string(),
            rank: delta.rank,
            points: delta.points,
            survived: delta.survived,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StandingDto {
    pub player_id: String,
    pub score: i64,
}

impl From<&Standing> for StandingDto {
    fn from(standing: &Standing) -> Self {
        Self {
            player_id: standing.player.to_string(),
            score: standing.score,
        }
    }
}

/// Server-authoritative round phase sent to clients for UI flow.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum RoundStateDto {
    Lobby,
    Transitioning,
    CountdownPending,
    CountdownRunning,
    PlayActive,
    Ending,
}

impl From<RoundState> for RoundStateDto {
    fn from(state: RoundState) -> Self {
        match state {
            RoundState::Lobby => RoundStateDto::Lobby,
            RoundState::Transitioning => RoundStateDto::Transitioning,
            RoundState::CountdownPending => RoundStateDto::CountdownPending,
            RoundState::CountdownRunning => RoundStateDto::CountdownRunning,
            RoundState::PlayActive => RoundStateDto::PlayActive,
            RoundState::Ending => RoundStateDto::Ending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundStatusDto {
    pub state: RoundStateDto,
    pub minigame: Option<String>,
    pub time_remaining: f32,
    pub can_join: bool,
}

impl From<&SessionView> for RoundStatusDto {
    fn from(view: &SessionView) -> Self {
        Self {
            state: view.round_state.borrow().current.into(),
            minigame: view.minigame.borrow().current.map(|v| v.to_string()),
            time_remaining: view.clock.borrow().current,
            can_join: view.can_join.borrow().current,
        }
    }
}

fn id(player: PlayerId) -> String {
    player.to_string()
}

impl From<ClientCommand> for ServerMessage {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::Teleport { to } => ServerMessage::Teleport(to.into()),
            ClientCommand::LockInput { include_camera } => {
                ServerMessage::LockInput { include_camera }
            }
            ClientCommand::UnlockInput => ServerMessage::UnlockInput,
            ClientCommand::CountdownText { text } => ServerMessage::CountdownText { text },
            ClientCommand::LivesChanged { player, lives } => ServerMessage::LivesChanged {
                player_id: id(player),
                lives,
            },
            ClientCommand::LoadScene { scene, mode } => ServerMessage::LoadScene {
                scene,
                mode: mode.into(),
            },
            ClientCommand::UnloadScene { scene } => ServerMessage::UnloadScene { scene },
            ClientCommand::PlayerJoined {
                player,
                display_name,
            } => ServerMessage::PlayerJoined {
                player_id: id(player),
                display_name,
            },
            ClientCommand::PlayerLeft {
                player,
                display_name,
            } => ServerMessage::PlayerLeft {
                player_id: id(player),
                display_name,
            },
            ClientCommand::ScoreUpdated { player, total } => ServerMessage::ScoreUpdated {
                player_id: id(player),
                total,
            },
            ClientCommand::SpectateTarget { target } => ServerMessage::SpectateTarget {
                player_id: target.map(id),
            },
            ClientCommand::EntitySpawned { player, entity, at } => ServerMessage::EntitySpawned {
                player_id: id(player),
                entity_id: entity.0.to_string(),
                at: at.into(),
            },
            ClientCommand::EntityDespawned { player, entity } => ServerMessage::EntityDespawned {
                player_id: id(player),
                entity_id: entity.0.to_string(),
            },
            ClientCommand::MinigameInitialized { variant, players } => {
                ServerMessage::MinigameInitialized {
                    minigame: variant.to_string(),
                    player_ids: players.into_iter().map(id).collect(),
                }
            }
            ClientCommand::RoundResults { variant, deltas } => ServerMessage::RoundResults {
                minigame: variant.to_string(),
                results: deltas.iter().map(ScoreDeltaDto::from).collect(),
            },
        }
    }
}
