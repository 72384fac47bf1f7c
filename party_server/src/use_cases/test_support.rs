use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::errors::{ControlError, SceneError};
use crate::domain::ports::{Clock, ClientCommand, ClientOutbox, PlayerControl, SceneDirector, Target};
use crate::domain::{EntityRef, PlayerId, SceneMode, SpawnPoint};

// Controllable time source shared between the test and the session.
#[derive(Clone, Default)]
pub(crate) struct ManualClock(Arc<Mutex<Duration>>);

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock().expect("clock mutex poisoned") += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.0.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default)]
struct ControlLog {
    next_entity: u64,
    spawned: Vec<(PlayerId, SpawnPoint)>,
    despawned: Vec<(PlayerId, EntityRef)>,
    teleports: Vec<(PlayerId, SpawnPoint)>,
    freezes: Vec<(PlayerId, bool)>,
    unfreezes: Vec<PlayerId>,
    missing: HashSet<PlayerId>,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingControl {
    log: Arc<Mutex<ControlLog>>,
}

impl RecordingControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every later call for `player` fail as a missing collaborator.
    pub(crate) fn lose(&self, player: PlayerId) {
        self.log().missing.insert(player);
    }

    pub(crate) fn spawned(&self) -> Vec<(PlayerId, SpawnPoint)> {
        self.log().spawned.clone()
    }

    pub(crate) fn despawned(&self) -> Vec<(PlayerId, EntityRef)> {
        self.log().despawned.clone()
    }

    pub(crate) fn teleports(&self) -> Vec<(PlayerId, SpawnPoint)> {
        self.log().teleports.clone()
    }

    pub(crate) fn freezes(&self) -> Vec<(PlayerId, bool)> {
        self.log().freezes.clone()
    }

    pub(crate) fn unfreezes(&self) -> Vec<PlayerId> {
        self.log().unfreezes.clone()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, ControlLog> {
        self.log.lock().expect("control mutex poisoned")
    }
}

impl PlayerControl for RecordingControl {
    fn spawn_entity(&mut self, player: PlayerId, at: SpawnPoint) -> Result<EntityRef, ControlError> {
        let mut log = self.log();
        if log.missing.contains(&player) {
            return Err(ControlError::Disconnected(player));
        }
        log.next_entity += 1;
        log.spawned.push((player, at));
        Ok(EntityRef(log.next_entity))
    }

    fn despawn_entity(&mut self, player: PlayerId, entity: EntityRef) {
        self.log().despawned.push((player, entity));
    }

    fn teleport(&mut self, player: PlayerId, to: SpawnPoint) -> Result<(), ControlError> {
        let mut log = self.log();
        if log.missing.contains(&player) {
            return Err(ControlError::Disconnected(player));
        }
        log.teleports.push((player, to));
        Ok(())
    }

    fn freeze(
        &mut self,
        player: PlayerId,
        _entity: Option<EntityRef>,
        include_camera: bool,
    ) -> Result<(), ControlError> {
        let mut log = self.log();
        if log.missing.contains(&player) {
            return Err(ControlError::MissingEntity(player));
        }
        log.freezes.push((player, include_camera));
        Ok(())
    }

    fn unfreeze(&mut self, player: PlayerId, _entity: Option<EntityRef>) -> Result<(), ControlError> {
        let mut log = self.log();
        if log.missing.contains(&player) {
            return Err(ControlError::MissingEntity(player));
        }
        log.unfreezes.push(player);
        Ok(())
    }
}

#[derive(Default)]
struct SceneLog {
    loads: Vec<(String, SceneMode)>,
    unloads: Vec<String>,
    failing_loads: u32,
    failing_unloads: u32,
}

// Records scene requests; completions are delivered by the test.
#[derive(Clone, Default)]
pub(crate) struct RecordingScenes {
    log: Arc<Mutex<SceneLog>>,
}

impl RecordingScenes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_next_loads(&self, count: u32) {
        self.log().failing_loads = count;
    }

    pub(crate) fn fail_next_unloads(&self, count: u32) {
        self.log().failing_unloads = count;
    }

    pub(crate) fn loads(&self) -> Vec<String> {
        self.log().loads.iter().map(|(scene, _)| scene.clone()).collect()
    }

    pub(crate) fn unloads(&self) -> Vec<String> {
        self.log().unloads.clone()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, SceneLog> {
        self.log.lock().expect("scene mutex poisoned")
    }
}

impl SceneDirector for RecordingScenes {
    fn load(&mut self, scene: &str, mode: SceneMode) -> Result<(), SceneError> {
        let mut log = self.log();
        log.loads.push((scene.to_string(), mode));
        if log.failing_loads > 0 {
            log.failing_loads -= 1;
            return Err(SceneError::LoadRejected {
                scene: scene.to_string(),
                mode,
            });
        }
        Ok(())
    }

    fn unload(&mut self, scene: &str) -> Result<(), SceneError> {
        let mut log = self.log();
        log.unloads.push(scene.to_string());
        if log.failing_unloads > 0 {
            log.failing_unloads -= 1;
            return Err(SceneError::UnloadRejected {
                scene: scene.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingOutbox {
    sent: Arc<Mutex<Vec<(Target, ClientCommand)>>>,
}

impl RecordingOutbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sent(&self) -> Vec<(Target, ClientCommand)> {
        self.sent.lock().expect("outbox mutex poisoned").clone()
    }

    pub(crate) fn countdown_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, command)| match command {
                ClientCommand::CountdownText { text } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl ClientOutbox for RecordingOutbox {
    fn send(&mut self, target: Target, command: ClientCommand) {
        self.sent
            .lock()
            .expect("outbox mutex poisoned")
            .push((target, command));
    }
}
