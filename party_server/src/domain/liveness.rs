// Alive/spectating roster and the death/revive flow.

use std::collections::HashMap;

use rand::{Rng, RngCore};
use tracing::{debug, info, warn};

use super::events::{EventBus, Subscription};
use super::ports::PlayerControl;
use super::replicated::Replicated;
use super::roster::PlayerRosterRegistry;
use super::state::{EntityRef, PlayerId, SpawnPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectateDirection {
    Next,
    Previous,
}

/// Observer notifications for UI and spectate cameras.
#[derive(Debug, Clone, PartialEq)]
pub enum LivenessChange {
    Died {
        player: PlayerId,
    },
    Revived {
        player: PlayerId,
        entity: Option<EntityRef>,
        at: SpawnPoint,
    },
    LivesChanged {
        player: PlayerId,
        lives: u32,
    },
    SpectateTarget {
        viewer: PlayerId,
        target: Option<PlayerId>,
    },
}

pub struct LivenessTracker {
    starting_lives: u32,
    // Ordered so spectate cycling is stable across ticks.
    alive: Vec<PlayerId>,
    lives: HashMap<PlayerId, u32>,
    // viewer -> followed player
    spectating: HashMap<PlayerId, PlayerId>,
    spawn_pool: Vec<SpawnPoint>,
    replicated_alive: Replicated<Vec<PlayerId>>,
    game_running: Replicated<bool>,
    changes: EventBus<LivenessChange>,
}

impl LivenessTracker {
    pub fn new(starting_lives: u32, spawn_pool: Vec<SpawnPoint>) -> Self {
        Self {
            starting_lives: starting_lives.max(1),
            alive: Vec::new(),
            lives: HashMap::new(),
            spectating: HashMap::new(),
            spawn_pool,
            replicated_alive: Replicated::new(Vec::new()),
            game_running: Replicated::new(false),
            changes: EventBus::new(),
        }
    }

    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.alive.contains(&player)
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn alive_players(&self) -> &[PlayerId] {
        &self.alive
    }

    /// Remaining lives; `None` for players the tracker has never seen.
    pub fn lives(&self, player: PlayerId) -> Option<u32> {
        self.lives.get(&player).copied()
    }

    pub fn spectate_target(&self, viewer: PlayerId) -> Option<PlayerId> {
        self.spectating.get(&viewer).copied()
    }

    pub fn is_game_running(&self) -> bool {
        self.game_running.get()
    }

    /// Replaces the pool revives draw from; set by the active scene.
    pub fn set_spawn_pool(&mut self, pool: Vec<SpawnPoint>) {
        self.spawn_pool = pool;
    }

    pub fn subscribe(&self) -> Subscription<LivenessChange> {
        self.changes.subscribe()
    }

    pub fn replicated_alive(&self) -> &Replicated<Vec<PlayerId>> {
        &self.replicated_alive
    }

    pub fn replicated_game_running(&self) -> &Replicated<bool> {
        &self.game_running
    }

    /// Newly approved players start alive with full lives.
    pub fn on_connect(
        &mut self,
        player: PlayerId,
        roster: &mut PlayerRosterRegistry,
        control: &mut dyn PlayerControl,
        rng: &mut dyn RngCore,
    ) {
        self.lives.insert(player, self.starting_lives);
        self.revive(player, roster, control, rng);
    }

    /// Forgets the player; call before the roster record is removed.
    pub fn on_disconnect(
        &mut self,
        player: PlayerId,
        roster: &mut PlayerRosterRegistry,
        control: &mut dyn PlayerControl,
    ) {
        if let Some(entity) = roster.entity_of(player) {
            control.despawn_entity(player, entity);
            roster.set_entity(player, None);
        }
        self.lives.remove(&player);
        self.spectating.remove(&player);
        if self.remove_alive(player) {
            self.retarget_followers_of(player);
        }
    }

    /// Death gate handler; killing a dead player is a no-op.
    pub fn kill(
        &mut self,
        player: PlayerId,
        roster: &mut PlayerRosterRegistry,
        control: &mut dyn PlayerControl,
    ) -> bool {
        if !self.is_alive(player) {
            debug!(player_id = player.0, "kill ignored; player already dead");
            return false;
        }

        if let Some(entity) = roster.entity_of(player) {
            control.despawn_entity(player, entity);
            roster.set_entity(player, None);
        } else {
            warn!(player_id = player.0, "no entity to despawn for dying player");
        }

        self.remove_alive(player);
        self.lives.insert(player, 0);
        info!(player_id = player.0, alive = self.alive.len(), "player died");
        self.changes.publish(LivenessChange::Died { player });
        self.changes
            .publish(LivenessChange::LivesChanged { player, lives: 0 });

        // The dead player starts spectating; anyone following them moves on.
        let target = self.cycle_target(None, SpectateDirection::Next);
        self.set_spectate_target(player, target);
        self.retarget_followers_of(player);
        true
    }

    /// Respawns a dead player at a random point of the active pool.
    pub fn revive(
        &mut self,
        player: PlayerId,
        roster: &mut PlayerRosterRegistry,
        control: &mut dyn PlayerControl,
        rng: &mut dyn RngCore,
    ) -> bool {
        if !roster.contains(player) {
            warn!(player_id = player.0, "revive ignored; player not registered");
            return false;
        }
        if self.is_alive(player) {
            debug!(player_id = player.0, "revive ignored; player already alive");
            return false;
        }

        let at = self.pick_spawn(rng);
        let entity = match control.spawn_entity(player, at) {
            Ok(entity) => Some(entity),
            Err(error) => {
                // Player still counts as alive; the engine can respawn the body later.
                warn!(player_id = player.0, ?error, "failed to spawn revived player");
                None
            }
        };
        roster.set_entity(player, entity);

        self.alive.push(player);
        self.replicated_alive.set(self.alive.clone());
        self.lives.insert(player, self.starting_lives);
        self.spectating.remove(&player);

        info!(player_id = player.0, alive = self.alive.len(), "player revived");
        self.changes
            .publish(LivenessChange::Revived { player, entity, at });
        self.changes.publish(LivenessChange::LivesChanged {
            player,
            lives: self.starting_lives,
        });
        true
    }

    /// Flag toggled by the lobby phase.
    ///
    /// Both edges make sure every registered player is alive: `true` starts a
    /// fresh round cycle, `false` returns everyone to the free-roaming lobby.
    pub fn set_game_running(
        &mut self,
        running: bool,
        roster: &mut PlayerRosterRegistry,
        control: &mut dyn PlayerControl,
        rng: &mut dyn RngCore,
    ) {
        self.game_running.set(running);
        let revived = self.revive_all(roster, control, rng);
        info!(running, revived, "game running flag changed");
    }

    pub fn revive_all(
        &mut self,
        roster: &mut PlayerRosterRegistry,
        control: &mut dyn PlayerControl,
        rng: &mut dyn RngCore,
    ) -> usize {
        let mut revived = 0;
        for player in roster.ids() {
            if !self.is_alive(player) && self.revive(player, roster, control, rng) {
                revived += 1;
            }
        }
        revived
    }

    /// Moves a dead player's camera to the next or previous alive player.
    pub fn request_spectate(
        &mut self,
        viewer: PlayerId,
        direction: SpectateDirection,
    ) -> Option<PlayerId> {
        if self.is_alive(viewer) || !self.lives.contains_key(&viewer) {
            debug!(viewer = viewer.0, "spectate request ignored");
            return None;
        }
        let current = self.spectating.get(&viewer).copied();
        let target = self.cycle_target(current, direction);
        self.set_spectate_target(viewer, target);
        target
    }

    fn cycle_target(&self, current: Option<PlayerId>, direction: SpectateDirection) -> Option<PlayerId> {
        let len = self.alive.len();
        if len == 0 {
            return None;
        }
        let index = current.and_then(|c| self.alive.iter().position(|&p| p == c));
        let next = match (direction, index) {
            (SpectateDirection::Next, Some(i)) => (i + 1) % len,
            (SpectateDirection::Next, None) => 0,
            (SpectateDirection::Previous, Some(i)) => (i + len - 1) % len,
            (SpectateDirection::Previous, None) => len - 1,
        };
        Some(self.alive[next])
    }

    fn set_spectate_target(&mut self, viewer: PlayerId, target: Option<PlayerId>) {
        match target {
            Some(t) => {
                self.spectating.insert(viewer, t);
            }
            None => {
                self.spectating.remove(&viewer);
            }
        }
        self.changes
            .publish(LivenessChange::SpectateTarget { viewer, target });
    }

    fn retarget_followers_of(&mut self, player: PlayerId) {
        let followers: Vec<PlayerId> = self
            .spectating
            .iter()
            .filter(|&(_, &target)| target == player)
            .map(|(&viewer, _)| viewer)
            .collect();
        for viewer in followers {
            let target = self.cycle_target(None, SpectateDirection::Next);
            self.set_spectate_target(viewer, target);
        }
    }

    fn remove_alive(&mut self, player: PlayerId) -> bool {
        let before = self.alive.len();
        self.alive.retain(|&p| p != player);
        let removed = self.alive.len() != before;
        if removed {
            self.replicated_alive.set(self.alive.clone());
        }
        removed
    }

    fn pick_spawn(&self, rng: &mut dyn RngCore) -> SpawnPoint {
        if self.spawn_pool.is_empty() {
            warn!("spawn pool empty; reviving at origin");
            return SpawnPoint::new(0.0, 0.0, 0.0, 0.0);
        }
        self.spawn_pool[rng.random_range(0..self.spawn_pool.len())]
    }
}
