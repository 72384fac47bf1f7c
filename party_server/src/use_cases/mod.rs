// Use cases layer: round orchestration and the hosted session loop.

pub mod orchestrator;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use orchestrator::{MinigameEntry, RoundOrchestrator, RoundSettings};
pub use session::{Session, SessionPorts, SessionSettings, SessionView, session_task};
pub use types::{ConnectOutcome, SceneSignal, SessionEvent};
