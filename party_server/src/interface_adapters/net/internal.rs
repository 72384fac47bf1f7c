// Engine-facing HTTP routes: gate hits, scene completions, and operator controls.
// Everything here runs with server authority.

use crate::domain::{Authority, GateEvent, GateKind, PlayerId, SceneMode};
use crate::interface_adapters::http::error_response;
use crate::interface_adapters::protocol::{RoundStatusDto, StandingDto};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{SceneSignal, SessionEvent};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKindDto {
    Finish,
    Death,
}

impl From<GateKindDto> for GateKind {
    fn from(kind: GateKindDto) -> Self {
        match kind {
            GateKindDto::Finish => GateKind::Finish,
            GateKindDto::Death => GateKind::Death,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct GateRequest {
    player_id: u64,
    kind: GateKindDto,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatusDto {
    Loaded,
    Unloaded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneModeDto {
    #[default]
    Single,
    Additive,
}

impl From<SceneModeDto> for SceneMode {
    fn from(mode: SceneModeDto) -> Self {
        match mode {
            SceneModeDto::Single => SceneMode::Single,
            SceneModeDto::Additive => SceneMode::Additive,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct SceneRequest {
    scene: String,
    status: SceneStatusDto,
    // Only meaningful for loads.
    #[serde(default)]
    mode: SceneModeDto,
}

#[derive(Debug, serde::Deserialize)]
pub struct AbortRequest {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct ReviveRequest {
    player_id: u64,
}

#[derive(Debug, serde::Serialize)]
struct AcceptedResponse {
    accepted: bool,
}

#[derive(Debug, serde::Serialize)]
struct ScoresResponse {
    round: RoundStatusDto,
    standings: Vec<StandingDto>,
}

#[derive(Debug, serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn bad_request(error: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, error)
}

async fn forward(state: &AppState, event: SessionEvent) -> Response {
    match state.events_tx.send(event).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })).into_response(),
        Err(_) => {
            warn!("session channel closed; rejecting internal request");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "session unavailable")
        }
    }
}

pub async fn gate_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GateRequest>,
) -> impl IntoResponse {
    let player = PlayerId(payload.player_id);
    if player == PlayerId::SERVER {
        return bad_request("player_id is required");
    }
    let event = GateEvent {
        player,
        kind: payload.kind.into(),
    };
    forward(
        &state,
        SessionEvent::Gate {
            authority: Authority::Server,
            event,
        },
    )
    .await
}

pub async fn scene_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SceneRequest>,
) -> impl IntoResponse {
    let scene = payload.scene.trim().to_string();
    if scene.is_empty() {
        return bad_request("scene is required");
    }
    let signal = match payload.status {
        SceneStatusDto::Loaded => SceneSignal::Loaded {
            scene,
            mode: payload.mode.into(),
        },
        SceneStatusDto::Unloaded => SceneSignal::Unloaded { scene },
        SceneStatusDto::Failed => SceneSignal::Failed { scene },
    };
    forward(&state, SessionEvent::Scene(signal)).await
}

pub async fn abort_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AbortRequest>,
) -> impl IntoResponse {
    let reason = match payload.reason.trim() {
        "" => "aborted by operator".to_string(),
        reason => reason.to_string(),
    };
    forward(&state, SessionEvent::AbortRound { reason }).await
}

pub async fn revive_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReviveRequest>,
) -> impl IntoResponse {
    let player_id = PlayerId(payload.player_id);
    if player_id == PlayerId::SERVER {
        return bad_request("player_id is required");
    }
    forward(
        &state,
        SessionEvent::Revive {
            authority: Authority::Server,
            player_id,
        },
    )
    .await
}

pub async fn scores_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let standings = state
        .view
        .standings
        .borrow()
        .current
        .iter()
        .map(StandingDto::from)
        .collect();
    Json(ScoresResponse {
        round: RoundStatusDto::from(&state.view),
        standings,
    })
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
