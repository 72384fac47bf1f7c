// Lobby <-> minigame round cycle: selection, scene transitions, timed phases.

use std::time::Duration;

use rand::RngCore;
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::{debug, error, info, warn};

use crate::domain::events::{GateEventBus, Subscription};
use crate::domain::liveness::LivenessTracker;
use crate::domain::minigames::{ControllerRegistry, MinigameController, RoundPlan, RoundSignal};
use crate::domain::phase::Phase;
use crate::domain::ports::{ClientCommand, ClientOutbox, PlayerControl, SceneDirector, Target};
use crate::domain::replicated::Replicated;
use crate::domain::roster::PlayerRosterRegistry;
use crate::domain::scoring::ScoreBoard;
use crate::domain::{GateEvent, MinigameVariant, PlayerId, RoundState, SceneMode, SpawnPoint};

use super::types::SceneSignal;

// One retry, then give up on the round.
const MAX_SCENE_ATTEMPTS: u8 = 2;

// Lobby and minigames each replace the previous scene.
const ROUND_SCENE_MODE: SceneMode = SceneMode::Single;

/// Scene and timing for one hostable variant.
#[derive(Debug, Clone)]
pub struct MinigameEntry {
    pub variant: MinigameVariant,
    pub scene: String,
    pub positions: Vec<SpawnPoint>,
    pub countdown: Duration,
    pub play: Duration,
}

#[derive(Debug, Clone)]
pub struct RoundSettings {
    /// Wait before every scene load so clients finish the previous transition.
    pub settle_delay: Duration,
    /// Delay between the elimination exit and the end of the round.
    pub grace_period: Duration,
    /// Developer override: only the play timer ends a round.
    pub always_run: bool,
    /// Also lock the camera during the countdown.
    pub freeze_camera: bool,
    pub minigames: Vec<MinigameEntry>,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            always_run: false,
            freeze_camera: false,
            minigames: Vec::new(),
        }
    }
}

/// Services a round step may touch, borrowed from the session for one call.
pub struct RoundContext<'a> {
    pub now: Duration,
    pub roster: &'a mut PlayerRosterRegistry,
    pub liveness: &'a mut LivenessTracker,
    pub scores: &'a mut ScoreBoard,
    pub gates: &'a GateEventBus,
    pub scenes: &'a mut dyn SceneDirector,
    pub control: &'a mut dyn PlayerControl,
    pub outbox: &'a mut dyn ClientOutbox,
    pub rng: &'a mut dyn RngCore,
}

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Idle,
    Settling {
        phase: Phase,
        next: MinigameVariant,
    },
    Loading {
        variant: MinigameVariant,
        scene: String,
        attempts: u8,
    },
    Countdown {
        phase: Option<Phase>,
    },
    Playing {
        phase: Phase,
        grace: Option<Phase>,
    },
    Unloading {
        variant: MinigameVariant,
        scene: String,
        attempts: u8,
    },
    Stopped,
}

// Dropping this releases the round's gate subscription.
struct ActiveRound {
    variant: MinigameVariant,
    scene: String,
    controller: Box<dyn MinigameController>,
    players: Vec<PlayerId>,
    gates: Subscription<GateEvent>,
    countdown: Duration,
    play: Duration,
    last_countdown_text: Option<u64>,
}

pub struct RoundOrchestrator {
    settings: RoundSettings,
    controllers: ControllerRegistry,
    stage: Stage,
    round: Option<ActiveRound>,
    previous: Option<MinigameVariant>,
    round_state: Replicated<RoundState>,
    clock: Replicated<f32>,
    can_join: Replicated<bool>,
    current: Replicated<Option<MinigameVariant>>,
}

impl RoundOrchestrator {
    pub fn new(settings: RoundSettings, controllers: ControllerRegistry) -> Self {
        Self {
            settings,
            controllers,
            stage: Stage::Idle,
            round: None,
            previous: None,
            round_state: Replicated::new(RoundState::Lobby),
            clock: Replicated::new(0.0),
            can_join: Replicated::new(true),
            current: Replicated::new(None),
        }
    }

    pub fn round_state(&self) -> RoundState {
        self.round_state.get()
    }

    pub fn can_players_join(&self) -> bool {
        self.can_join.get()
    }

    pub fn previous(&self) -> Option<MinigameVariant> {
        self.previous
    }

    pub fn current(&self) -> Option<MinigameVariant> {
        self.current.get()
    }

    pub fn time_remaining(&self) -> f32 {
        self.clock.get()
    }

    pub fn players_in_round(&self) -> Option<&[PlayerId]> {
        self.round.as_ref().map(|round| round.players.as_slice())
    }

    pub fn replicated_round_state(&self) -> &Replicated<RoundState> {
        &self.round_state
    }

    pub fn replicated_clock(&self) -> &Replicated<f32> {
        &self.clock
    }

    pub fn replicated_can_join(&self) -> &Replicated<bool> {
        &self.can_join
    }

    pub fn replicated_current(&self) -> &Replicated<Option<MinigameVariant>> {
        &self.current
    }

    fn entry(&self, variant: MinigameVariant) -> Option<&MinigameEntry> {
        self.settings
            .minigames
            .iter()
            .find(|entry| entry.variant == variant)
    }

    pub fn start(&mut self, ctx: &mut RoundContext<'_>) {
        info!(
            minigames = self.settings.minigames.len(),
            always_run = self.settings.always_run,
            "round orchestrator started"
        );
        self.enter_lobby(ctx);
    }

    /// Cancels the active phase and releases its subscriptions.
    pub fn shutdown(&mut self) {
        if let Some(round) = self.round.take() {
            info!(minigame = %round.variant, "round cancelled by shutdown");
        }
        self.stage = Stage::Stopped;
    }

    /// Picks the next round target: never the previous one unless it is the only one.
    pub fn select_next_minigame(&mut self, rng: &mut dyn RngCore) -> Option<MinigameVariant> {
        let registered: Vec<MinigameVariant> = MinigameVariant::ALL
            .into_iter()
            .filter(|&variant| {
                !variant.is_lobby()
                    && self.entry(variant).is_some()
                    && self.controllers.contains(variant)
            })
            .collect();
        let candidates: Vec<MinigameVariant> = registered
            .iter()
            .copied()
            .filter(|&variant| Some(variant) != self.previous)
            .collect();

        let chosen = match candidates.choose(rng) {
            Some(&variant) => variant,
            None => {
                let fallback = registered.first().copied()?;
                debug!(minigame = %fallback, "no other minigame available; repeating");
                fallback
            }
        };
        self.previous = Some(chosen);
        Some(chosen)
    }

    pub fn tick(&mut self, ctx: &mut RoundContext<'_>) {
        // Gate deliveries first so this tick's exit poll sees them.
        if let Some(round) = self.round.as_mut() {
            for event in round.gates.drain() {
                round.controller.on_gate(event);
            }
        }

        match self.stage {
            Stage::Settling { phase, next } => {
                if phase.is_complete(ctx.now) {
                    self.request_load(ctx, next, 1);
                }
            }
            Stage::Countdown { phase } => self.tick_countdown(ctx, phase),
            Stage::Playing { phase, grace } => self.tick_play(ctx, phase, grace),
            _ => {}
        }
    }

    pub fn on_scene_signal(&mut self, ctx: &mut RoundContext<'_>, signal: SceneSignal) {
        match signal {
            SceneSignal::Loaded { scene, mode } => match &self.stage {
                Stage::Loading {
                    variant,
                    scene: expected,
                    ..
                } if *expected == scene && mode == ROUND_SCENE_MODE => {
                    let variant = *variant;
                    info!(minigame = %variant, %scene, "scene loaded");
                    self.begin_round(ctx, variant, scene);
                }
                _ => debug!(%scene, ?mode, "ignoring unexpected scene load"),
            },
            SceneSignal::Unloaded { scene } => match &self.stage {
                Stage::Unloading {
                    variant,
                    scene: expected,
                    ..
                } if *expected == scene => {
                    let variant = *variant;
                    info!(minigame = %variant, %scene, "scene unloaded");
                    self.after_unload(ctx, variant);
                }
                _ => debug!(%scene, "ignoring unexpected scene unload"),
            },
            SceneSignal::Failed { scene } => self.on_scene_failure(ctx, scene),
        }
    }

    /// Ends the active round out of band; nothing is scored.
    pub fn abort_round(&mut self, ctx: &mut RoundContext<'_>, reason: &str) -> bool {
        match self.stage {
            Stage::Countdown { .. } | Stage::Playing { .. } => {
                warn!(reason, "round aborted");
                self.end_round(ctx, false);
                true
            }
            _ => {
                debug!(reason, "abort ignored; no round in progress");
                false
            }
        }
    }

    fn enter_lobby(&mut self, ctx: &mut RoundContext<'_>) {
        self.round = None;
        self.round_state.set(RoundState::Lobby);
        self.can_join.set(true);
        self.current.set(None);
        self.clock.set(0.0);
        // Revives land in the lobby, not the scene that was just unloaded.
        if let Some(lobby) = self.entry(MinigameVariant::Blank) {
            ctx.liveness.set_spawn_pool(lobby.positions.clone());
        }
        ctx.liveness
            .set_game_running(false, ctx.roster, ctx.control, ctx.rng);
        self.settle_then_load(ctx, MinigameVariant::Blank);
    }

    fn settle_then_load(&mut self, ctx: &mut RoundContext<'_>, next: MinigameVariant) {
        debug!(minigame = %next, settle_ms = self.settings.settle_delay.as_millis(), "settling");
        self.stage = Stage::Settling {
            phase: Phase::starting_at(ctx.now, self.settings.settle_delay),
            next,
        };
    }

    fn request_load(&mut self, ctx: &mut RoundContext<'_>, variant: MinigameVariant, attempts: u8) {
        let Some(scene) = self.entry(variant).map(|entry| entry.scene.clone()) else {
            if variant.is_lobby() {
                warn!("no lobby scene registered; skipping straight to selection");
                ctx.liveness
                    .set_game_running(true, ctx.roster, ctx.control, ctx.rng);
                self.queue_next_minigame(ctx);
            } else {
                warn!(minigame = %variant, "no scene registered for minigame");
                self.enter_lobby(ctx);
            }
            return;
        };

        self.round_state.set(RoundState::Transitioning);
        if !variant.is_lobby() {
            self.can_join.set(false);
        }
        info!(minigame = %variant, %scene, attempts, "requesting scene load");
        self.stage = Stage::Loading {
            variant,
            scene: scene.clone(),
            attempts,
        };
        if let Err(error) = ctx.scenes.load(&scene, ROUND_SCENE_MODE) {
            warn!(%scene, ?error, "scene load request rejected");
            self.on_scene_failure(ctx, scene);
        }
    }

    fn request_unload(
        &mut self,
        ctx: &mut RoundContext<'_>,
        variant: MinigameVariant,
        scene: String,
        attempts: u8,
    ) {
        self.round_state.set(RoundState::Transitioning);
        info!(minigame = %variant, %scene, attempts, "requesting scene unload");
        self.stage = Stage::Unloading {
            variant,
            scene: scene.clone(),
            attempts,
        };
        if let Err(error) = ctx.scenes.unload(&scene) {
            warn!(%scene, ?error, "scene unload request rejected");
            self.on_scene_failure(ctx, scene);
        }
    }

    fn on_scene_failure(&mut self, ctx: &mut RoundContext<'_>, scene: String) {
        match &self.stage {
            Stage::Loading {
                variant,
                scene: expected,
                attempts,
            } if *expected == scene => {
                let (variant, attempts) = (*variant, *attempts);
                if attempts < MAX_SCENE_ATTEMPTS {
                    warn!(minigame = %variant, %scene, "scene load failed; retrying");
                    self.request_load(ctx, variant, attempts + 1);
                } else {
                    error!(minigame = %variant, %scene, "scene load failed again; returning to lobby");
                    self.enter_lobby(ctx);
                }
            }
            Stage::Unloading {
                variant,
                scene: expected,
                attempts,
            } if *expected == scene => {
                let (variant, attempts) = (*variant, *attempts);
                if attempts < MAX_SCENE_ATTEMPTS {
                    warn!(minigame = %variant, %scene, "scene unload failed; retrying");
                    self.request_unload(ctx, variant, scene, attempts + 1);
                } else {
                    error!(minigame = %variant, %scene, "scene unload failed again; returning to lobby");
                    self.enter_lobby(ctx);
                }
            }
            _ => debug!(%scene, "ignoring failure for a scene not in flight"),
        }
    }

    fn begin_round(&mut self, ctx: &mut RoundContext<'_>, variant: MinigameVariant, scene: String) {
        let Some(entry) = self.entry(variant).cloned() else {
            warn!(minigame = %variant, "minigame unregistered while loading");
            self.enter_lobby(ctx);
            return;
        };
        let Some(mut controller) = self.controllers.create(variant) else {
            warn!(minigame = %variant, "no controller for minigame");
            self.enter_lobby(ctx);
            return;
        };

        let players = ctx.roster.ids();
        ctx.liveness.set_spawn_pool(entry.positions.clone());
        self.current.set(Some(variant));

        match controller.on_round_start(&players) {
            RoundPlan::OpenLobby => {
                self.round_state.set(RoundState::Lobby);
                ctx.liveness
                    .set_game_running(true, ctx.roster, ctx.control, ctx.rng);
                self.request_unload(ctx, variant, scene, 1);
            }
            RoundPlan::Timed => {
                let gates = ctx.gates.subscribe();
                let teleported = assign_positions(ctx, &players, &entry.positions);
                info!(
                    minigame = %variant,
                    players = players.len(),
                    teleported,
                    "round starting"
                );
                ctx.outbox.send(
                    Target::Everyone,
                    ClientCommand::MinigameInitialized {
                        variant,
                        players: players.clone(),
                    },
                );
                for &player in &players {
                    let entity = ctx.roster.entity_of(player);
                    if let Err(error) =
                        ctx.control
                            .freeze(player, entity, self.settings.freeze_camera)
                    {
                        warn!(player_id = player.0, ?error, "could not freeze player");
                    }
                }

                self.round = Some(ActiveRound {
                    variant,
                    scene,
                    controller,
                    players,
                    gates,
                    countdown: entry.countdown,
                    play: entry.play,
                    last_countdown_text: None,
                });
                self.round_state.set(RoundState::CountdownPending);
                self.clock.set(entry.countdown.as_secs_f32());
                self.stage = Stage::Countdown { phase: None };
            }
        }
    }

    fn tick_countdown(&mut self, ctx: &mut RoundContext<'_>, phase: Option<Phase>) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        let phase = match phase {
            Some(phase) => phase,
            None => {
                let phase = Phase::starting_at(ctx.now, round.countdown);
                self.stage = Stage::Countdown { phase: Some(phase) };
                self.round_state.set(RoundState::CountdownRunning);
                phase
            }
        };

        let remaining = phase.remaining_secs(ctx.now);
        self.clock.set(remaining);
        if phase.is_complete(ctx.now) {
            ctx.outbox.send(
                Target::Everyone,
                ClientCommand::CountdownText {
                    text: "GO!".to_string(),
                },
            );
            self.start_play(ctx);
            return;
        }

        let whole = remaining.ceil() as u64;
        if round.last_countdown_text != Some(whole) {
            round.last_countdown_text = Some(whole);
            ctx.outbox.send(
                Target::Everyone,
                ClientCommand::CountdownText {
                    text: whole.to_string(),
                },
            );
        }
    }

    fn start_play(&mut self, ctx: &mut RoundContext<'_>) {
        let Some(round) = self.round.as_ref() else {
            return;
        };
        unfreeze_all(ctx, &round.players);
        let phase = Phase::starting_at(ctx.now, round.play);
        info!(minigame = %round.variant, play_secs = round.play.as_secs(), "play started");
        self.stage = Stage::Playing { phase, grace: None };
        self.round_state.set(RoundState::PlayActive);
        self.clock.set(phase.remaining_secs(ctx.now));
    }

    fn tick_play(&mut self, ctx: &mut RoundContext<'_>, phase: Phase, grace: Option<Phase>) {
        self.clock.set(phase.remaining_secs(ctx.now));

        if let Some(grace) = grace {
            if grace.is_complete(ctx.now) {
                info!("grace period over");
                self.end_round(ctx, true);
            }
            return;
        }

        if phase.is_complete(ctx.now) {
            info!("play timer expired");
            self.end_round(ctx, true);
            return;
        }

        let signal = self
            .round
            .as_mut()
            .map_or(RoundSignal::Continue, |round| round.controller.on_tick());
        if signal == RoundSignal::Finished {
            info!("round win condition reached");
            self.end_round(ctx, true);
            return;
        }

        let alive = ctx.liveness.alive_count();
        if !self.settings.always_run && alive <= 1 {
            info!(alive, grace_secs = self.settings.grace_period.as_secs(), "elimination exit");
            self.stage = Stage::Playing {
                phase,
                grace: Some(Phase::starting_at(ctx.now, self.settings.grace_period)),
            };
        }
    }

    fn end_round(&mut self, ctx: &mut RoundContext<'_>, scored: bool) {
        let Some(mut round) = self.round.take() else {
            return;
        };
        self.round_state.set(RoundState::Ending);
        for event in round.gates.drain() {
            round.controller.on_gate(event);
        }

        if scored {
            if let Some(ranking) = round.controller.calculate_ranking() {
                let liveness = &*ctx.liveness;
                let deltas = ctx
                    .scores
                    .apply_round_scores(&ranking, |player| liveness.is_alive(player));
                info!(minigame = %round.variant, ranked = deltas.len(), "round scored");
                ctx.outbox.send(
                    Target::Everyone,
                    ClientCommand::RoundResults {
                        variant: round.variant,
                        deltas,
                    },
                );
            }
        } else {
            info!(minigame = %round.variant, "round ended without scoring");
        }

        unfreeze_all(ctx, &round.players);
        self.clock.set(0.0);
        self.request_unload(ctx, round.variant, round.scene, 1);
    }

    fn after_unload(&mut self, ctx: &mut RoundContext<'_>, variant: MinigameVariant) {
        if variant.is_lobby() {
            self.queue_next_minigame(ctx);
        } else {
            self.enter_lobby(ctx);
        }
    }

    fn queue_next_minigame(&mut self, ctx: &mut RoundContext<'_>) {
        self.round_state.set(RoundState::Lobby);
        match self.select_next_minigame(ctx.rng) {
            Some(next) => {
                info!(minigame = %next, "next minigame selected");
                self.settle_then_load(ctx, next);
            }
            None => {
                warn!("no minigame registered; staying in lobby");
                self.stage = Stage::Idle;
            }
        }
    }
}

/// Shuffles the pool and teleports player `i` to entry `i`; extra players stay put.
fn assign_positions(ctx: &mut RoundContext<'_>, players: &[PlayerId], positions: &[SpawnPoint]) -> usize {
    let mut pool = positions.to_vec();
    pool.shuffle(&mut *ctx.rng);
    if players.len() > pool.len() {
        warn!(
            players = players.len(),
            positions = pool.len(),
            "more players than positions; extra players are not moved"
        );
    }

    let mut teleported = 0;
    for (&player, &point) in players.iter().zip(pool.iter()) {
        match ctx.control.teleport(player, point) {
            Ok(()) => teleported += 1,
            Err(error) => warn!(player_id = player.0, ?error, "teleport skipped"),
        }
    }
    teleported
}

fn unfreeze_all(ctx: &mut RoundContext<'_>, players: &[PlayerId]) {
    for &player in players {
        let entity = ctx.roster.entity_of(player);
        if let Err(error) = ctx.control.unfreeze(player, entity) {
            warn!(player_id = player.0, ?error, "could not unfreeze player");
        }
    }
}
