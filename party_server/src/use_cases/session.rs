// Hosted session: wires the round services together and runs the tick loop.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::events::{GateEventBus, Subscription};
use crate::domain::liveness::{LivenessChange, LivenessTracker};
use crate::domain::minigames::ControllerRegistry;
use crate::domain::ports::{ClientCommand, ClientOutbox, Clock, PlayerControl, SceneDirector, Target};
use crate::domain::replicated::Versioned;
use crate::domain::roster::PlayerRosterRegistry;
use crate::domain::scoring::{ScoreBoard, ScoreUpdate, ScoringRules, Standing};
use crate::domain::{
    Authority, GateEvent, GateKind, MinigameVariant, PlayerId, PlayerRecord, RoundState,
};

use super::orchestrator::{RoundContext, RoundOrchestrator, RoundSettings};
use super::types::{
    ConnectOutcome, DENIED_ALREADY_CONNECTED, DENIED_ROUND_RUNNING, SessionEvent,
};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub round: RoundSettings,
    pub scoring: ScoringRules,
    pub starting_lives: u32,
    /// Fixed seed for reproducible selection and spawn picks.
    pub seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            round: RoundSettings::default(),
            scoring: ScoringRules::default(),
            starting_lives: 3,
            seed: None,
        }
    }
}

/// Engine collaborators the session drives.
pub struct SessionPorts {
    pub clock: Box<dyn Clock>,
    pub scenes: Box<dyn SceneDirector>,
    pub control: Box<dyn PlayerControl>,
    pub outbox: Box<dyn ClientOutbox>,
}

/// Read-only projections for adapters.
#[derive(Clone)]
pub struct SessionView {
    pub round_state: watch::Receiver<Versioned<RoundState>>,
    pub clock: watch::Receiver<Versioned<f32>>,
    pub can_join: watch::Receiver<Versioned<bool>>,
    pub minigame: watch::Receiver<Versioned<Option<MinigameVariant>>>,
    pub alive: watch::Receiver<Versioned<Vec<PlayerId>>>,
    pub game_running: watch::Receiver<Versioned<bool>>,
    pub standings: watch::Receiver<Versioned<Vec<Standing>>>,
}

pub struct Session {
    roster: PlayerRosterRegistry,
    liveness: LivenessTracker,
    scores: ScoreBoard,
    gates: GateEventBus,
    orchestrator: RoundOrchestrator,
    clock: Box<dyn Clock>,
    scenes: Box<dyn SceneDirector>,
    control: Box<dyn PlayerControl>,
    outbox: Box<dyn ClientOutbox>,
    rng: StdRng,
    deaths: Subscription<GateEvent>,
    liveness_feed: Subscription<LivenessChange>,
    score_feed: Subscription<ScoreUpdate>,
}

impl Session {
    pub fn new(settings: SessionSettings, ports: SessionPorts) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let lobby_pool = settings
            .round
            .minigames
            .iter()
            .find(|entry| entry.variant.is_lobby())
            .map(|entry| entry.positions.clone())
            .unwrap_or_default();

        let liveness = LivenessTracker::new(settings.starting_lives, lobby_pool);
        let scores = ScoreBoard::new(settings.scoring);
        let gates = GateEventBus::new();
        let deaths = gates.subscribe();
        let liveness_feed = liveness.subscribe();
        let score_feed = scores.subscribe();

        Self {
            roster: PlayerRosterRegistry::new(),
            liveness,
            scores,
            gates,
            orchestrator: RoundOrchestrator::new(settings.round, ControllerRegistry::default()),
            clock: ports.clock,
            scenes: ports.scenes,
            control: ports.control,
            outbox: ports.outbox,
            rng,
            deaths,
            liveness_feed,
            score_feed,
        }
    }

    fn with_round<R>(&mut self, f: impl FnOnce(&mut RoundOrchestrator, &mut RoundContext<'_>) -> R) -> R {
        let mut ctx = RoundContext {
            now: self.clock.now(),
            roster: &mut self.roster,
            liveness: &mut self.liveness,
            scores: &mut self.scores,
            gates: &self.gates,
            scenes: self.scenes.as_mut(),
            control: self.control.as_mut(),
            outbox: self.outbox.as_mut(),
            rng: &mut self.rng,
        };
        let result = f(&mut self.orchestrator, &mut ctx);
        self.flush_observers();
        result
    }

    pub fn start(&mut self) {
        self.with_round(|orchestrator, ctx| orchestrator.start(ctx));
    }

    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown();
        info!(players = self.roster.len(), "session stopped");
    }

    /// Connection approval hook; denies while a minigame holds the session.
    pub fn approve_connection(&self, player_id: PlayerId) -> ConnectOutcome {
        if !self.orchestrator.can_players_join() {
            return ConnectOutcome::Denied {
                reason: DENIED_ROUND_RUNNING.to_string(),
            };
        }
        if self.roster.contains(player_id) {
            return ConnectOutcome::Denied {
                reason: DENIED_ALREADY_CONNECTED.to_string(),
            };
        }
        ConnectOutcome::Approved
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connect {
                player_id,
                display_name,
                account_id,
                reply,
            } => {
                let outcome = self.connect(player_id, display_name, account_id);
                if let Some(reply) = reply {
                    // The socket may be gone already; the disconnect follows.
                    let _ = reply.send(outcome);
                }
            }
            SessionEvent::Disconnect { player_id } => self.disconnect(player_id),
            SessionEvent::Gate { authority, event } => {
                // Rejections are logged by the bus.
                let _ = self.gates.publish(authority, event);
            }
            SessionEvent::Scene(signal) => {
                self.with_round(|orchestrator, ctx| orchestrator.on_scene_signal(ctx, signal));
            }
            SessionEvent::Revive {
                authority,
                player_id,
            } => match authority {
                Authority::Server => {
                    self.liveness.revive(
                        player_id,
                        &mut self.roster,
                        self.control.as_mut(),
                        &mut self.rng,
                    );
                    self.flush_observers();
                }
                Authority::Client(caller) => {
                    warn!(caller = caller.0, player_id = player_id.0, "client revive rejected");
                }
            },
            SessionEvent::Spectate {
                player_id,
                direction,
            } => {
                self.liveness.request_spectate(player_id, direction);
                self.flush_observers();
            }
            SessionEvent::AbortRound { reason } => {
                self.with_round(|orchestrator, ctx| orchestrator.abort_round(ctx, &reason));
            }
        }
    }

    /// One frame: apply pending deaths, then advance the round.
    pub fn tick(&mut self) {
        for event in self.deaths.drain() {
            if event.kind == GateKind::Death {
                self.liveness
                    .kill(event.player, &mut self.roster, self.control.as_mut());
            }
        }
        self.with_round(|orchestrator, ctx| orchestrator.tick(ctx));
    }

    fn connect(&mut self, player_id: PlayerId, display_name: String, account_id: u64) -> ConnectOutcome {
        let outcome = self.approve_connection(player_id);
        if let ConnectOutcome::Denied { reason } = &outcome {
            info!(player_id = player_id.0, %reason, "connection denied");
            return outcome;
        }

        let record = PlayerRecord {
            id: player_id,
            display_name: display_name.clone(),
            account_id,
            entity: None,
        };
        if let Err(error) = self.roster.add(record) {
            warn!(player_id = player_id.0, ?error, "connection denied");
            return ConnectOutcome::Denied {
                reason: DENIED_ALREADY_CONNECTED.to_string(),
            };
        }
        self.liveness.on_connect(
            player_id,
            &mut self.roster,
            self.control.as_mut(),
            &mut self.rng,
        );
        info!(player_id = player_id.0, %display_name, players = self.roster.len(), "player joined");
        self.outbox.send(
            Target::Everyone,
            ClientCommand::PlayerJoined {
                player: player_id,
                display_name,
            },
        );
        self.flush_observers();
        ConnectOutcome::Approved
    }

    fn disconnect(&mut self, player_id: PlayerId) {
        if !self.roster.contains(player_id) {
            debug!(player_id = player_id.0, "disconnect for unknown player");
            return;
        }
        self.liveness
            .on_disconnect(player_id, &mut self.roster, self.control.as_mut());
        if let Some(record) = self.roster.remove(player_id) {
            info!(player_id = player_id.0, players = self.roster.len(), "player left");
            self.outbox.send(
                Target::Everyone,
                ClientCommand::PlayerLeft {
                    player: player_id,
                    display_name: record.display_name,
                },
            );
        }
        self.flush_observers();
    }

    // Forwards observer notifications to clients.
    fn flush_observers(&mut self) {
        for change in self.liveness_feed.drain() {
            match change {
                LivenessChange::LivesChanged { player, lives } => self.outbox.send(
                    Target::Everyone,
                    ClientCommand::LivesChanged { player, lives },
                ),
                LivenessChange::SpectateTarget { viewer, target } => self.outbox.send(
                    Target::Single(viewer),
                    ClientCommand::SpectateTarget { target },
                ),
                LivenessChange::Revived {
                    entity: Some(entity),
                    ..
                } => self.outbox.send(
                    Target::Owner(entity),
                    ClientCommand::SpectateTarget { target: None },
                ),
                LivenessChange::Revived { entity: None, .. } | LivenessChange::Died { .. } => {}
            }
        }
        for update in self.score_feed.drain() {
            self.outbox.send(
                Target::Everyone,
                ClientCommand::ScoreUpdated {
                    player: update.player,
                    total: update.total,
                },
            );
        }
    }

    pub fn round_state(&self) -> RoundState {
        self.orchestrator.round_state()
    }

    pub fn can_players_join(&self) -> bool {
        self.orchestrator.can_players_join()
    }

    pub fn orchestrator(&self) -> &RoundOrchestrator {
        &self.orchestrator
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    pub fn roster(&self) -> &PlayerRosterRegistry {
        &self.roster
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            round_state: self.orchestrator.replicated_round_state().subscribe(),
            clock: self.orchestrator.replicated_clock().subscribe(),
            can_join: self.orchestrator.replicated_can_join().subscribe(),
            minigame: self.orchestrator.replicated_current().subscribe(),
            alive: self.liveness.replicated_alive().subscribe(),
            game_running: self.liveness.replicated_game_running().subscribe(),
            standings: self.scores.replicated_standings().subscribe(),
        }
    }
}

/// Single tick loop owning the session; exits when `shutdown` is notified.
pub async fn session_task(
    mut session: Session,
    mut events_rx: mpsc::Receiver<SessionEvent>,
    tick_interval: Duration,
    shutdown: Arc<Notify>,
) {
    session.start();
    let mut interval = tokio::time::interval(tick_interval);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break;
            }
            _ = interval.tick() => {}
        }

        // Events first, so the same tick's exit poll sees them.
        while let Ok(event) = events_rx.try_recv() {
            session.handle(event);
        }
        session.tick();
    }

    session.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::liveness::SpectateDirection;
    use crate::domain::{SceneMode, SpawnPoint};
    use crate::use_cases::orchestrator::MinigameEntry;
    use crate::use_cases::test_support::{
        ManualClock, RecordingControl, RecordingOutbox, RecordingScenes,
    };
    use crate::use_cases::types::SceneSignal;

    const SETTLE: Duration = Duration::from_secs(1);

    struct Harness {
        session: Session,
        clock: ManualClock,
        scenes: RecordingScenes,
        control: RecordingControl,
        outbox: RecordingOutbox,
    }

    fn positions(count: usize) -> Vec<SpawnPoint> {
        (0..count)
            .map(|i| SpawnPoint::new(i as f32, 0.0, 0.0, 0.0))
            .collect()
    }

    fn entry(variant: MinigameVariant, pool: usize) -> MinigameEntry {
        MinigameEntry {
            variant,
            scene: variant.to_string(),
            positions: positions(pool),
            countdown: Duration::from_secs(5),
            play: Duration::from_secs(60),
        }
    }

    impl Harness {
        fn new(minigames: Vec<MinigameEntry>) -> Self {
            Self::with_override(minigames, false)
        }

        fn with_override(minigames: Vec<MinigameEntry>, always_run: bool) -> Self {
            let clock = ManualClock::new();
            let scenes = RecordingScenes::new();
            let control = RecordingControl::new();
            let outbox = RecordingOutbox::new();
            let settings = SessionSettings {
                round: RoundSettings {
                    settle_delay: SETTLE,
                    grace_period: Duration::from_secs(5),
                    always_run,
                    minigames,
                    ..RoundSettings::default()
                },
                seed: Some(42),
                ..SessionSettings::default()
            };
            let session = Session::new(
                settings,
                SessionPorts {
                    clock: Box::new(clock.clone()),
                    scenes: Box::new(scenes.clone()),
                    control: Box::new(control.clone()),
                    outbox: Box::new(outbox.clone()),
                },
            );
            Self {
                session,
                clock,
                scenes,
                control,
                outbox,
            }
        }

        fn with_lobby_and(variants: &[(MinigameVariant, usize)]) -> Self {
            let mut minigames = vec![entry(MinigameVariant::Blank, 4)];
            minigames.extend(variants.iter().map(|&(v, pool)| entry(v, pool)));
            Self::new(minigames)
        }

        fn connect(&mut self, id: u64) -> ConnectOutcome {
            let (reply, mut rx) = tokio::sync::oneshot::channel();
            self.session.handle(SessionEvent::Connect {
                player_id: PlayerId(id),
                display_name: format!("P{id}"),
                account_id: id,
                reply: Some(reply),
            });
            rx.try_recv().expect("connect reply")
        }

        fn advance(&mut self, by: Duration) {
            self.clock.advance(by);
            self.session.tick();
        }

        fn step_secs(&mut self, secs: u64) {
            for _ in 0..secs {
                self.advance(Duration::from_secs(1));
            }
        }

        fn scene(&mut self, signal: SceneSignal) {
            self.session.handle(SessionEvent::Scene(signal));
        }

        fn gate(&mut self, id: u64, kind: GateKind) {
            self.session.handle(SessionEvent::Gate {
                authority: Authority::Server,
                event: GateEvent {
                    player: PlayerId(id),
                    kind,
                },
            });
        }

        /// Start -> lobby loaded and unloaded -> next minigame loaded.
        fn run_to_countdown(&mut self) -> MinigameVariant {
            self.advance(SETTLE);
            let lobby = self.scenes.loads().last().cloned().expect("lobby load");
            self.scene(SceneSignal::Loaded {
                scene: lobby.clone(),
                mode: SceneMode::Single,
            });
            self.scene(SceneSignal::Unloaded { scene: lobby });
            self.advance(SETTLE);
            let scene = self.scenes.loads().last().cloned().expect("minigame load");
            self.scene(SceneSignal::Loaded {
                scene,
                mode: SceneMode::Single,
            });
            self.session
                .orchestrator()
                .current()
                .expect("minigame running")
        }

        fn run_to_play(&mut self) -> MinigameVariant {
            let variant = self.run_to_countdown();
            // Pending -> running on the first tick, then five seconds of countdown.
            self.advance(Duration::ZERO);
            self.step_secs(5);
            assert_eq!(self.session.round_state(), RoundState::PlayActive);
            variant
        }

        fn results(&self) -> Vec<Vec<(PlayerId, i64)>> {
            self.outbox
                .sent()
                .into_iter()
                .filter_map(|(_, command)| match command {
                    ClientCommand::RoundResults { deltas, .. } => Some(
                        deltas
                            .into_iter()
                            .map(|delta| (delta.player, delta.points))
                            .collect(),
                    ),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn when_session_starts_then_lobby_scene_loads_after_settle_delay() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.session.start();

        harness.advance(Duration::from_millis(999));
        assert!(harness.scenes.loads().is_empty());

        harness.advance(Duration::from_millis(1));
        assert_eq!(harness.scenes.loads(), vec!["blank".to_string()]);
        assert_eq!(harness.session.round_state(), RoundState::Transitioning);
        assert!(harness.session.can_players_join());
    }

    #[test]
    fn when_lobby_scene_loads_then_game_runs_and_next_minigame_follows() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.connect(1);
        harness.session.start();
        assert!(!harness.session.liveness().is_game_running());

        harness.advance(SETTLE);
        harness.scene(SceneSignal::Loaded {
            scene: "blank".to_string(),
            mode: SceneMode::Single,
        });
        assert!(harness.session.liveness().is_game_running());
        assert_eq!(harness.scenes.unloads(), vec!["blank".to_string()]);

        harness.scene(SceneSignal::Unloaded {
            scene: "blank".to_string(),
        });
        harness.advance(SETTLE);
        assert_eq!(harness.scenes.loads().last().map(String::as_str), Some("ascend"));
        assert!(!harness.session.can_players_join());
    }

    #[test]
    fn when_scene_completes_in_another_mode_then_it_is_not_taken_as_the_load() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.session.start();
        harness.advance(SETTLE);

        harness.scene(SceneSignal::Loaded {
            scene: "blank".to_string(),
            mode: SceneMode::Additive,
        });
        assert!(!harness.session.liveness().is_game_running());
        assert!(harness.scenes.unloads().is_empty());

        harness.scene(SceneSignal::Loaded {
            scene: "blank".to_string(),
            mode: SceneMode::Single,
        });
        assert!(harness.session.liveness().is_game_running());
    }

    #[test]
    fn when_round_is_running_then_new_connections_are_denied_with_reason() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Knockoff, 4)]);
        assert_eq!(harness.connect(1), ConnectOutcome::Approved);
        harness.session.start();
        harness.run_to_countdown();

        let outcome = harness.connect(2);

        assert_eq!(
            outcome,
            ConnectOutcome::Denied {
                reason: "A minigame is currently running.".to_string()
            }
        );
        assert!(!harness.session.roster().contains(PlayerId(2)));
    }

    #[test]
    fn when_player_connects_twice_then_second_attempt_is_denied() {
        let mut harness = Harness::with_lobby_and(&[]);

        assert_eq!(harness.connect(1), ConnectOutcome::Approved);
        assert!(matches!(harness.connect(1), ConnectOutcome::Denied { .. }));
        assert_eq!(harness.session.roster().len(), 1);
    }

    #[test]
    fn when_four_players_race_then_scores_match_the_worked_example() {
        let mut harness = Harness::with_lobby_and(&[
            (MinigameVariant::RaceToHeaven, 8),
            (MinigameVariant::Ascend, 8),
        ]);
        for id in 1..=4 {
            harness.connect(id);
        }
        harness.session.start();
        let first = harness.run_to_play();

        harness.gate(3, GateKind::Finish);
        harness.gate(1, GateKind::Finish);
        harness.step_secs(60);

        assert_eq!(
            harness.results(),
            vec![vec![
                (PlayerId(3), 20),
                (PlayerId(1), 17),
                (PlayerId(2), 14),
                (PlayerId(4), 11),
            ]]
        );
        assert_eq!(harness.session.scores().score(PlayerId(3)), 20);

        // Unload -> lobby -> blank round -> the other minigame.
        let scene = harness.scenes.unloads().last().cloned().expect("unload");
        harness.scene(SceneSignal::Unloaded { scene });
        assert!(harness.session.can_players_join());
        let second = harness.run_to_countdown();
        assert_ne!(first, second);
    }

    #[test]
    fn when_everyone_finishes_then_round_ends_before_the_timer() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Replicate, 4)]);
        harness.connect(1);
        harness.connect(2);
        harness.session.start();
        harness.run_to_play();

        harness.gate(2, GateKind::Finish);
        harness.gate(1, GateKind::Finish);
        harness.advance(Duration::from_millis(100));

        assert_eq!(
            harness.results(),
            vec![vec![(PlayerId(2), 20), (PlayerId(1), 11)]]
        );
    }

    #[test]
    fn when_one_player_is_left_then_round_ends_after_grace_not_timer() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Knockoff, 4)]);
        for id in 1..=3 {
            harness.connect(id);
        }
        harness.session.start();
        harness.run_to_play();
        harness.step_secs(10);

        harness.gate(1, GateKind::Death);
        harness.gate(2, GateKind::Death);
        harness.advance(Duration::from_secs(1));
        assert_eq!(harness.session.liveness().alive_count(), 1);
        assert_eq!(harness.session.round_state(), RoundState::PlayActive);

        harness.step_secs(4);
        assert_eq!(harness.session.round_state(), RoundState::PlayActive);
        assert!(harness.results().is_empty());

        harness.advance(Duration::from_secs(1));
        assert_eq!(harness.session.round_state(), RoundState::Transitioning);
        // Survivor first, then most recently eliminated.
        assert_eq!(
            harness.results(),
            vec![vec![(PlayerId(3), 20), (PlayerId(2), 6), (PlayerId(1), 1)]]
        );
    }

    #[test]
    fn when_round_ends_then_lobby_revives_use_lobby_positions() {
        let mut minigames = vec![entry(MinigameVariant::Blank, 4), entry(MinigameVariant::Knockoff, 2)];
        minigames[1].positions = vec![
            SpawnPoint::new(100.0, 0.0, 0.0, 0.0),
            SpawnPoint::new(101.0, 0.0, 0.0, 0.0),
        ];
        let mut harness = Harness::new(minigames);
        harness.connect(1);
        harness.connect(2);
        harness.session.start();
        harness.run_to_play();

        harness.gate(1, GateKind::Death);
        harness.advance(Duration::from_secs(1));
        assert!(!harness.session.liveness().is_alive(PlayerId(1)));
        harness.step_secs(5);
        assert_eq!(harness.session.round_state(), RoundState::Transitioning);

        let spawned_before = harness.control.spawned().len();
        harness.scene(SceneSignal::Unloaded {
            scene: "knockoff".to_string(),
        });

        assert_eq!(harness.session.round_state(), RoundState::Lobby);
        assert!(harness.session.liveness().is_alive(PlayerId(1)));
        let lobby_spawns = &harness.control.spawned()[spawned_before..];
        assert_eq!(lobby_spawns.len(), 1);
        let (player, at) = lobby_spawns[0];
        assert_eq!(player, PlayerId(1));
        assert!(at.x < 4.0, "revived at x={}", at.x);
    }

    #[test]
    fn when_always_run_is_set_then_only_the_timer_ends_the_round() {
        let mut minigames = vec![entry(MinigameVariant::Blank, 4), entry(MinigameVariant::Knockoff, 4)];
        minigames[1].play = Duration::from_secs(20);
        let mut harness = Harness::with_override(minigames, true);
        harness.connect(1);
        harness.connect(2);
        harness.session.start();
        harness.run_to_play();

        harness.gate(1, GateKind::Death);
        harness.step_secs(19);
        assert_eq!(harness.session.round_state(), RoundState::PlayActive);

        harness.advance(Duration::from_secs(1));
        assert_eq!(harness.session.round_state(), RoundState::Transitioning);
    }

    #[test]
    fn when_players_outnumber_positions_then_only_pool_size_are_teleported() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 3)]);
        for id in 1..=5 {
            harness.connect(id);
        }
        harness.session.start();

        harness.run_to_countdown();

        let teleports = harness.control.teleports();
        assert_eq!(teleports.len(), 3);
        let mut points: Vec<f32> = teleports.iter().map(|(_, at)| at.x).collect();
        points.sort_by(f32::total_cmp);
        assert_eq!(points, vec![0.0, 1.0, 2.0]);
        let players: Vec<PlayerId> = teleports.iter().map(|(p, _)| *p).collect();
        assert_eq!(players, vec![PlayerId(1), PlayerId(2), PlayerId(3)]);
    }

    #[test]
    fn when_countdown_runs_then_clock_strictly_decreases_and_ends_at_zero() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.connect(1);
        harness.session.start();
        harness.run_to_countdown();
        assert_eq!(harness.session.round_state(), RoundState::CountdownPending);
        let clock = harness.session.view().clock;

        harness.advance(Duration::ZERO);
        assert_eq!(harness.session.round_state(), RoundState::CountdownRunning);
        let mut seen = vec![clock.borrow().current];
        for _ in 0..40 {
            harness.advance(Duration::from_millis(250));
            if harness.session.round_state() != RoundState::CountdownRunning {
                break;
            }
            seen.push(clock.borrow().current);
        }

        assert_eq!(seen.first().copied(), Some(5.0));
        assert_eq!(seen.last().copied(), Some(0.25));
        for pair in seen.windows(2) {
            assert!(pair[1] < pair[0], "{seen:?}");
        }
        // The countdown publishes exactly 0 before the play clock takes over.
        let published = clock.borrow().clone();
        assert_eq!(published.previous, Some(0.0));
        assert_eq!(published.current, 60.0);
        assert_eq!(
            harness.outbox.countdown_texts(),
            vec!["5", "4", "3", "2", "1", "GO!"]
        );
        assert_eq!(harness.session.round_state(), RoundState::PlayActive);
    }

    #[test]
    fn when_countdown_starts_then_round_players_are_frozen_until_play() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.connect(1);
        harness.connect(2);
        harness.control.lose(PlayerId(2));
        harness.session.start();

        harness.run_to_countdown();
        assert_eq!(harness.control.freezes(), vec![(PlayerId(1), false)]);
        assert!(harness.control.unfreezes().is_empty());

        harness.advance(Duration::ZERO);
        harness.step_secs(5);
        assert_eq!(harness.control.unfreezes(), vec![PlayerId(1)]);
    }

    #[test]
    fn when_scene_load_fails_once_then_it_is_retried() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.session.start();
        harness.scenes.fail_next_loads(1);

        harness.advance(SETTLE);

        assert_eq!(harness.scenes.loads(), vec!["blank", "blank"]);
        assert_eq!(harness.session.round_state(), RoundState::Transitioning);
    }

    #[test]
    fn when_minigame_load_fails_twice_then_session_returns_to_lobby_unscored() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.connect(1);
        harness.session.start();
        harness.advance(SETTLE);
        harness.scene(SceneSignal::Loaded {
            scene: "blank".to_string(),
            mode: SceneMode::Single,
        });
        harness.scene(SceneSignal::Unloaded {
            scene: "blank".to_string(),
        });
        harness.advance(SETTLE);
        assert!(!harness.session.can_players_join());

        harness.scene(SceneSignal::Failed {
            scene: "ascend".to_string(),
        });
        assert_eq!(harness.scenes.loads().last().map(String::as_str), Some("ascend"));
        harness.scene(SceneSignal::Failed {
            scene: "ascend".to_string(),
        });

        assert_eq!(harness.session.round_state(), RoundState::Lobby);
        assert!(harness.session.can_players_join());
        assert!(harness.results().is_empty());
        assert_eq!(
            harness.session.orchestrator().previous(),
            Some(MinigameVariant::Ascend)
        );
    }

    #[test]
    fn when_round_is_aborted_then_nothing_is_scored_and_players_are_released() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.connect(1);
        harness.session.start();
        harness.run_to_countdown();
        harness.advance(Duration::ZERO);

        harness.session.handle(SessionEvent::AbortRound {
            reason: "operator".to_string(),
        });

        assert!(harness.results().is_empty());
        assert_eq!(harness.control.unfreezes(), vec![PlayerId(1)]);
        assert_eq!(harness.scenes.unloads().last().map(String::as_str), Some("ascend"));
        assert_eq!(harness.session.gates.subscriber_count(), 1);
    }

    #[test]
    fn when_round_ends_then_its_gate_subscription_is_released() {
        let mut harness = Harness::with_lobby_and(&[(MinigameVariant::Ascend, 4)]);
        harness.connect(1);
        harness.session.start();
        harness.run_to_countdown();
        assert_eq!(harness.session.gates.subscriber_count(), 2);

        harness.advance(Duration::ZERO);
        harness.step_secs(5 + 60);

        assert_eq!(harness.session.gates.subscriber_count(), 1);
    }

    #[test]
    fn when_client_raises_gate_or_revive_then_state_is_untouched() {
        let mut harness = Harness::with_lobby_and(&[]);
        harness.connect(1);
        harness.connect(2);

        harness.session.handle(SessionEvent::Gate {
            authority: Authority::Client(PlayerId(2)),
            event: GateEvent {
                player: PlayerId(1),
                kind: GateKind::Death,
            },
        });
        harness.advance(Duration::ZERO);
        assert!(harness.session.liveness().is_alive(PlayerId(1)));

        harness.gate(1, GateKind::Death);
        harness.advance(Duration::ZERO);
        harness.session.handle(SessionEvent::Revive {
            authority: Authority::Client(PlayerId(1)),
            player_id: PlayerId(1),
        });
        assert!(!harness.session.liveness().is_alive(PlayerId(1)));

        harness.session.handle(SessionEvent::Revive {
            authority: Authority::Server,
            player_id: PlayerId(1),
        });
        assert!(harness.session.liveness().is_alive(PlayerId(1)));
    }

    #[test]
    fn when_dead_player_spectates_then_target_is_sent_to_them_only() {
        let mut harness = Harness::with_lobby_and(&[]);
        for id in 1..=3 {
            harness.connect(id);
        }
        harness.gate(1, GateKind::Death);
        harness.advance(Duration::ZERO);

        harness.session.handle(SessionEvent::Spectate {
            player_id: PlayerId(1),
            direction: SpectateDirection::Next,
        });

        let targets: Vec<(Target, ClientCommand)> = harness
            .outbox
            .sent()
            .into_iter()
            .filter(|(_, c)| matches!(c, ClientCommand::SpectateTarget { .. }))
            .collect();
        assert_eq!(
            targets.last(),
            Some(&(
                Target::Single(PlayerId(1)),
                ClientCommand::SpectateTarget {
                    target: Some(PlayerId(3))
                }
            ))
        );
    }

    #[test]
    fn when_player_disconnects_then_they_leave_roster_and_alive_set() {
        let mut harness = Harness::with_lobby_and(&[]);
        harness.connect(1);
        harness.connect(2);

        harness.session.handle(SessionEvent::Disconnect {
            player_id: PlayerId(1),
        });

        assert!(!harness.session.roster().contains(PlayerId(1)));
        assert!(!harness.session.liveness().is_alive(PlayerId(1)));
        assert!(harness.outbox.sent().iter().any(|(_, c)| matches!(
            c,
            ClientCommand::PlayerLeft { player, .. } if *player == PlayerId(1)
        )));
    }

    #[tokio::test]
    async fn when_shutdown_is_notified_then_session_task_exits() {
        let harness = Harness::with_lobby_and(&[]);
        let (_tx, rx) = mpsc::channel(8);
        let shutdown = Arc::new(Notify::new());

        let task = tokio::spawn(session_task(
            harness.session,
            rx,
            Duration::from_millis(5),
            shutdown.clone(),
        ));
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("task should stop")
            .expect("task should not panic");
    }
}
