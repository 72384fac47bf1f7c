// Rank-weighted round scoring and the session-long score table.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::events::{EventBus, Subscription};
use super::replicated::Replicated;
use super::state::PlayerId;

/// Point values for round results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    /// Awarded to rank 0.
    pub max_points: i64,
    /// Awarded to the last rank.
    pub min_points: i64,
    /// Flat bonus for anyone still alive when the round ends.
    pub survival_bonus: i64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            max_points: 10,
            min_points: 1,
            survival_bonus: 10,
        }
    }
}

/// Points earned by one player in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreDelta {
    pub player: PlayerId,
    pub rank: usize,
    pub points: i64,
    pub survived: bool,
}

/// Published whenever a player's cumulative score changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub player: PlayerId,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub player: PlayerId,
    pub score: i64,
}

/// Linear interpolation from max (rank 0) to min (last rank).
///
/// Halfway values round to even.
pub fn points_for_rank(rules: &ScoringRules, index: usize, total: usize) -> i64 {
    if total <= 1 {
        return rules.max_points;
    }
    let t = index.min(total - 1) as f64 / (total - 1) as f64;
    let max = rules.max_points as f64;
    let min = rules.min_points as f64;
    (max + (min - max) * t).round_ties_even() as i64
}

/// Deltas for a ranking, best first; a pure function of rank, size, and aliveness.
pub fn round_deltas(
    rules: &ScoringRules,
    ranking: &[PlayerId],
    is_alive: impl Fn(PlayerId) -> bool,
) -> Vec<ScoreDelta> {
    let total = ranking.len();
    ranking
        .iter()
        .enumerate()
        .map(|(rank, &player)| {
            let survived = is_alive(player);
            let mut points = points_for_rank(rules, rank, total);
            if survived {
                points += rules.survival_bonus;
            }
            ScoreDelta {
                player,
                rank,
                points,
                survived,
            }
        })
        .collect()
}

pub struct ScoreBoard {
    rules: ScoringRules,
    table: HashMap<PlayerId, i64>,
    updates: EventBus<ScoreUpdate>,
    standings: Replicated<Vec<Standing>>,
}

impl ScoreBoard {
    pub fn new(rules: ScoringRules) -> Self {
        Self {
            rules,
            table: HashMap::new(),
            updates: EventBus::new(),
            standings: Replicated::new(Vec::new()),
        }
    }

    /// Scores a finished round and returns the deltas in ranking order.
    pub fn apply_round_scores(
        &mut self,
        ranking: &[PlayerId],
        is_alive: impl Fn(PlayerId) -> bool,
    ) -> Vec<ScoreDelta> {
        let deltas = round_deltas(&self.rules, ranking, is_alive);
        for delta in &deltas {
            self.add_score(delta.player, delta.points);
        }
        deltas
    }

    /// Adds points; the table never decreases so negative input counts as zero.
    pub fn add_score(&mut self, player: PlayerId, points: i64) -> i64 {
        if points < 0 {
            warn!(player_id = player.0, points, "negative score delta clamped");
        }
        let entry = self.table.entry(player).or_insert(0);
        *entry += points.max(0);
        let total = *entry;
        debug!(player_id = player.0, points, total, "score updated");

        self.updates.publish(ScoreUpdate { player, total });
        self.standings.set(self.standings());
        total
    }

    pub fn score(&self, player: PlayerId) -> i64 {
        self.table.get(&player).copied().unwrap_or(0)
    }

    /// Highest score first; ties broken by id for a stable order.
    pub fn standings(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .table
            .iter()
            .map(|(&player, &score)| Standing { player, score })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score).then(a.player.cmp(&b.player)));
        standings
    }

    pub fn subscribe(&self) -> Subscription<ScoreUpdate> {
        self.updates.subscribe()
    }

    pub fn replicated_standings(&self) -> &Replicated<Vec<Standing>> {
        &self.standings
    }
}
