// Use-case level inputs/outputs for the session loop.

use tokio::sync::oneshot;

use crate::domain::liveness::SpectateDirection;
use crate::domain::{Authority, GateEvent, PlayerId, SceneMode};

pub const DENIED_ROUND_RUNNING: &str = "A minigame is currently running.";
pub const DENIED_ALREADY_CONNECTED: &str = "Player is already connected.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Approved,
    Denied { reason: String },
}

/// Completion signal for a scene request, keyed by scene name.
/// Loads also report the mode they were made in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSignal {
    Loaded { scene: String, mode: SceneMode },
    Unloaded { scene: String },
    Failed { scene: String },
}

/// Everything that reaches the session loop from the outside.
#[derive(Debug)]
pub enum SessionEvent {
    Connect {
        player_id: PlayerId,
        display_name: String,
        account_id: u64,
        reply: Option<oneshot::Sender<ConnectOutcome>>,
    },
    Disconnect {
        player_id: PlayerId,
    },
    Gate {
        authority: Authority,
        event: GateEvent,
    },
    Scene(SceneSignal),
    Revive {
        authority: Authority,
        player_id: PlayerId,
    },
    Spectate {
        player_id: PlayerId,
        direction: SpectateDirection,
    },
    AbortRound {
        reason: String,
    },
}
