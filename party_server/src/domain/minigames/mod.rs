// Per-variant round controllers and the variant -> factory dispatch table.

pub mod finish_race;
pub mod last_standing;
pub mod lobby;

use std::collections::BTreeMap;

use super::state::{GateEvent, MinigameVariant, PlayerId};

pub use finish_race::FinishRace;
pub use last_standing::LastStanding;
pub use lobby::LobbyRound;

/// How the orchestrator should run a round once its scene is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPlan {
    /// Countdown, then timed play, then ranking.
    Timed,
    /// Lobby scene: mark the game running and end straight away, unscored.
    OpenLobby,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundSignal {
    Continue,
    /// The variant's own win condition is met; end without a grace period.
    Finished,
}

pub trait MinigameController: Send {
    fn variant(&self) -> MinigameVariant;

    fn on_round_start(&mut self, players: &[PlayerId]) -> RoundPlan;

    /// Gate signals raised while the round is active.
    fn on_gate(&mut self, event: GateEvent);

    fn on_tick(&mut self) -> RoundSignal {
        RoundSignal::Continue
    }

    /// Best first; `None` when the round is never scored.
    fn calculate_ranking(&self) -> Option<Vec<PlayerId>>;
}

pub type ControllerFactory = fn(MinigameVariant) -> Box<dyn MinigameController>;

/// Maps each hosted variant to the controller that runs it.
pub struct ControllerRegistry {
    factories: BTreeMap<MinigameVariant, ControllerFactory>,
}

impl ControllerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, variant: MinigameVariant, factory: ControllerFactory) {
        self.factories.insert(variant, factory);
    }

    pub fn create(&self, variant: MinigameVariant) -> Option<Box<dyn MinigameController>> {
        self.factories.get(&variant).map(|factory| factory(variant))
    }

    pub fn contains(&self, variant: MinigameVariant) -> bool {
        self.factories.contains_key(&variant)
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for variant in MinigameVariant::ALL {
            let factory: ControllerFactory = match variant {
                MinigameVariant::Blank => LobbyRound::boxed,
                MinigameVariant::Replicate
                | MinigameVariant::Telephone
                | MinigameVariant::RaceToHeaven
                | MinigameVariant::Ascend => FinishRace::boxed,
                MinigameVariant::PushToShove | MinigameVariant::Knockoff => LastStanding::boxed,
            };
            registry.register(variant, factory);
        }
        registry
    }
}
