// The blank lobby scene hosted between rounds.

use super::{MinigameController, RoundPlan};
use crate::domain::state::{GateEvent, MinigameVariant, PlayerId};

#[derive(Default)]
pub struct LobbyRound;

impl LobbyRound {
    pub fn boxed(_variant: MinigameVariant) -> Box<dyn MinigameController> {
        Box::new(Self)
    }
}

impl MinigameController for LobbyRound {
    fn variant(&self) -> MinigameVariant {
        MinigameVariant::Blank
    }

    fn on_round_start(&mut self, _players: &[PlayerId]) -> RoundPlan {
        RoundPlan::OpenLobby
    }

    fn on_gate(&mut self, _event: GateEvent) {}

    fn calculate_ranking(&self) -> Option<Vec<PlayerId>> {
        None
    }
}
