use crate::interface_adapters::hub::ConnectionHub;
use crate::use_cases::{SessionEvent, SessionView};
use std::sync::{Arc, atomic::AtomicU64};
use tokio::sync::mpsc;

pub struct AppState {
    // Everything that reaches the session loop from sockets and routes.
    pub events_tx: mpsc::Sender<SessionEvent>,
    // Outbound routing to connected sockets.
    pub hub: Arc<ConnectionHub>,
    // Replicated round, liveness, and score projections.
    pub view: SessionView,
    // Next id handed to an accepted socket.
    pub next_player_id: AtomicU64,
}
