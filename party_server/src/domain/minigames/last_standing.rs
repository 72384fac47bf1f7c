// Elimination variants: survivors first, then the most recently eliminated.

use tracing::debug;

use super::{MinigameController, RoundPlan};
use crate::domain::state::{GateEvent, GateKind, MinigameVariant, PlayerId};

pub struct LastStanding {
    variant: MinigameVariant,
    players: Vec<PlayerId>,
    eliminated: Vec<PlayerId>,
}

impl LastStanding {
    pub fn new(variant: MinigameVariant) -> Self {
        Self {
            variant,
            players: Vec::new(),
            eliminated: Vec::new(),
        }
    }

    pub fn boxed(variant: MinigameVariant) -> Box<dyn MinigameController> {
        Box::new(Self::new(variant))
    }
}

impl MinigameController for LastStanding {
    fn variant(&self) -> MinigameVariant {
        self.variant
    }

    fn on_round_start(&mut self, players: &[PlayerId]) -> RoundPlan {
        self.players = players.to_vec();
        self.eliminated.clear();
        RoundPlan::Timed
    }

    fn on_gate(&mut self, event: GateEvent) {
        if event.kind != GateKind::Death
            || !self.players.contains(&event.player)
            || self.eliminated.contains(&event.player)
        {
            return;
        }
        self.eliminated.push(event.player);
        debug!(
            player_id = event.player.0,
            remaining = self.players.len() - self.eliminated.len(),
            "player eliminated"
        );
    }

    fn calculate_ranking(&self) -> Option<Vec<PlayerId>> {
        let mut ranking: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| !self.eliminated.contains(p))
            .copied()
            .collect();
        ranking.extend(self.eliminated.iter().rev().copied());
        Some(ranking)
    }
}
