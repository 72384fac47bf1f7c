// Race variants: ranked by the order players reach the finish gate.

use tracing::debug;

use super::{MinigameController, RoundPlan, RoundSignal};
use crate::domain::state::{GateEvent, GateKind, MinigameVariant, PlayerId};

pub struct FinishRace {
    variant: MinigameVariant,
    players: Vec<PlayerId>,
    finishers: Vec<PlayerId>,
}

impl FinishRace {
    pub fn new(variant: MinigameVariant) -> Self {
        Self {
            variant,
            players: Vec::new(),
            finishers: Vec::new(),
        }
    }

    pub fn boxed(variant: MinigameVariant) -> Box<dyn MinigameController> {
        Box::new(Self::new(variant))
    }

    pub fn finishers(&self) -> &[PlayerId] {
        &self.finishers
    }
}

impl MinigameController for FinishRace {
    fn variant(&self) -> MinigameVariant {
        self.variant
    }

    fn on_round_start(&mut self, players: &[PlayerId]) -> RoundPlan {
        self.players = players.to_vec();
        self.finishers.clear();
        RoundPlan::Timed
    }

    fn on_gate(&mut self, event: GateEvent) {
        if event.kind != GateKind::Finish {
            return;
        }
        if !self.players.contains(&event.player) {
            debug!(player_id = event.player.0, "finish from player outside the round");
            return;
        }
        if self.finishers.contains(&event.player) {
            return;
        }
        debug!(
            player_id = event.player.0,
            place = self.finishers.len() + 1,
            "player finished"
        );
        self.finishers.push(event.player);
    }

    fn on_tick(&mut self) -> RoundSignal {
        if !self.players.is_empty() && self.finishers.len() == self.players.len() {
            RoundSignal::Finished
        } else {
            RoundSignal::Continue
        }
    }

    fn calculate_ranking(&self) -> Option<Vec<PlayerId>> {
        let mut ranking = self.finishers.clone();
        ranking.extend(
            self.players
                .iter()
                .filter(|p| !self.finishers.contains(p))
                .copied(),
        );
        Some(ranking)
    }
}
