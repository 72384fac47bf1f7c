// Engine-side ports implemented as remote calls to clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::errors::{ControlError, SceneError};
use crate::domain::ports::{Clock, ClientCommand, PlayerControl, SceneDirector};
use crate::domain::{EntityRef, PlayerId, SceneMode, SpawnPoint};
use crate::interface_adapters::hub::ConnectionHub;
use crate::use_cases::{SceneSignal, SessionEvent};

/// Time since the session was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Player bodies live on the owning client; the server only tracks ownership.
pub struct RemotePlayerControl {
    hub: Arc<ConnectionHub>,
    next_entity: u64,
}

impl RemotePlayerControl {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self {
            hub,
            next_entity: 1,
        }
    }

    fn deliver(&self, player: PlayerId, command: ClientCommand) -> Result<(), ControlError> {
        if self.hub.send_to(player, command) {
            Ok(())
        } else {
            Err(ControlError::Disconnected(player))
        }
    }
}

impl PlayerControl for RemotePlayerControl {
    fn spawn_entity(&mut self, player: PlayerId, at: SpawnPoint) -> Result<EntityRef, ControlError> {
        if !self.hub.is_connected(player) {
            return Err(ControlError::Disconnected(player));
        }
        let entity = EntityRef(self.next_entity);
        self.next_entity += 1;
        self.hub.set_owner(entity, player);
        self.hub
            .broadcast(ClientCommand::EntitySpawned { player, entity, at });
        Ok(entity)
    }

    fn despawn_entity(&mut self, player: PlayerId, entity: EntityRef) {
        self.hub.clear_owner(entity);
        self.hub
            .broadcast(ClientCommand::EntityDespawned { player, entity });
    }

    fn teleport(&mut self, player: PlayerId, to: SpawnPoint) -> Result<(), ControlError> {
        self.deliver(player, ClientCommand::Teleport { to })
    }

    fn freeze(
        &mut self,
        player: PlayerId,
        entity: Option<EntityRef>,
        include_camera: bool,
    ) -> Result<(), ControlError> {
        if entity.is_none() {
            return Err(ControlError::MissingEntity(player));
        }
        self.deliver(player, ClientCommand::LockInput { include_camera })
    }

    fn unfreeze(&mut self, player: PlayerId, entity: Option<EntityRef>) -> Result<(), ControlError> {
        if entity.is_none() {
            return Err(ControlError::MissingEntity(player));
        }
        self.deliver(player, ClientCommand::UnlockInput)
    }
}

/// Broadcasts scene commands and, unless an engine reports completions over
/// HTTP, acknowledges them straight back into the session feed.
pub struct LoopbackSceneDirector {
    hub: Arc<ConnectionHub>,
    events_tx: mpsc::Sender<SessionEvent>,
    external_acks: bool,
}

impl LoopbackSceneDirector {
    pub fn new(
        hub: Arc<ConnectionHub>,
        events_tx: mpsc::Sender<SessionEvent>,
        external_acks: bool,
    ) -> Self {
        Self {
            hub,
            events_tx,
            external_acks,
        }
    }

    fn acknowledge(&self, signal: SceneSignal) -> Result<(), SceneError> {
        if self.external_acks {
            debug!(?signal, "waiting for engine scene acknowledgement");
            return Ok(());
        }
        self.events_tx
            .try_send(SessionEvent::Scene(signal))
            .map_err(|error| {
                warn!(error = %error, "could not acknowledge scene request");
                SceneError::Unavailable
            })
    }
}

impl SceneDirector for LoopbackSceneDirector {
    fn load(&mut self, scene: &str, mode: SceneMode) -> Result<(), SceneError> {
        self.hub.broadcast(ClientCommand::LoadScene {
            scene: scene.to_string(),
            mode,
        });
        self.acknowledge(SceneSignal::Loaded {
            scene: scene.to_string(),
            mode,
        })
    }

    fn unload(&mut self, scene: &str) -> Result<(), SceneError> {
        self.hub.broadcast(ClientCommand::UnloadScene {
            scene: scene.to_string(),
        });
        self.acknowledge(SceneSignal::Unloaded {
            scene: scene.to_string(),
        })
    }
}
