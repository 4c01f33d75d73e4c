//! Elimination cadence, floor check and the elimination record.
//!
//! A cycle runs `Eligible → Selecting → CheckingFloor → (Skipped | Eliminating
//! → Replacing) → Idle`. The policy here owns the decision; the controller
//! performs the replacement.

use serde::{Deserialize, Serialize};

use super::post_mortem::PostMortem;
use crate::agents::{AgentId, AgentSnapshot};
use crate::error::InvariantViolation;
use crate::voting::{Contender, Ranking, TieBreak, VotingAggregator};

/// Step of the elimination cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationPhase {
    Idle,
    Eligible,
    Selecting,
    CheckingFloor,
    Skipped,
    Eliminating,
    Replacing,
}

/// What the policy decided for the current round.
#[derive(Debug, Clone, PartialEq)]
pub enum EliminationDecision {
    /// The cadence has not been reached.
    NotDue,
    /// Due, but removing an agent would breach the population floor.
    Skip {
        alive: usize,
        minimum: usize,
        ranking: Ranking,
    },
    /// Due; the lowest-ranked agent goes.
    Eliminate { ranking: Ranking },
}

/// Append-only record of one elimination and its replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationEvent {
    pub round: u64,
    pub eliminated: AgentSnapshot,
    pub final_score: u64,
    pub replacement: AgentSnapshot,
    pub tie_break: TieBreak,
    /// Full elimination order at decision time, most eliminable first.
    pub ranking: Vec<AgentId>,
    pub post_mortem: PostMortem,
}

/// Result of a due elimination check.
#[derive(Debug, Clone, PartialEq)]
pub enum EliminationOutcome {
    Eliminated(Box<EliminationEvent>),
    Skipped {
        round: u64,
        alive: usize,
        minimum: usize,
        spared: Option<AgentId>,
    },
}

/// Cadence and floor for eliminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EliminationPolicy {
    rounds_per_elimination: u64,
    minimum_population: usize,
}

impl EliminationPolicy {
    pub fn new(rounds_per_elimination: u64, minimum_population: usize) -> Self {
        Self {
            rounds_per_elimination: rounds_per_elimination.max(1),
            minimum_population,
        }
    }

    pub fn rounds_per_elimination(&self) -> u64 {
        self.rounds_per_elimination
    }

    pub fn minimum_population(&self) -> usize {
        self.minimum_population
    }

    /// Whether a cycle is eligible after `rounds_since_last` closed rounds.
    pub fn is_due(&self, rounds_since_last: u64) -> bool {
        rounds_since_last >= self.rounds_per_elimination
    }

    /// Whether removing one agent keeps the population at or above the floor.
    pub fn floor_allows(&self, alive: usize) -> bool {
        alive > self.minimum_population
    }

    /// Runs the selecting and floor-check steps of a cycle.
    pub fn decide(
        &self,
        aggregator: &VotingAggregator,
        round: u64,
        rounds_since_last: u64,
        contenders: &[Contender],
    ) -> Result<EliminationDecision, InvariantViolation> {
        if !self.is_due(rounds_since_last) {
            return Ok(EliminationDecision::NotDue);
        }

        let ranking = aggregator.rank(round, contenders)?;
        let alive = contenders.len();

        if !self.floor_allows(alive) {
            return Ok(EliminationDecision::Skip {
                alive,
                minimum: self.minimum_population,
                ranking,
            });
        }

        Ok(EliminationDecision::Eliminate { ranking })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contenders(scores: &[u64]) -> Vec<Contender> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| Contender {
                agent_id: AgentId::new(i as u64 + 1),
                score: *score,
                historical_average: *score as f64 / 2.0,
            })
            .collect()
    }

    #[test]
    fn test_not_due_before_cadence() {
        let policy = EliminationPolicy::new(3, 3);
        let decision = policy
            .decide(&VotingAggregator::new(1), 2, 2, &contenders(&[1, 2, 3, 4]))
            .expect("decision");
        assert_eq!(decision, EliminationDecision::NotDue);
    }

    #[test]
    fn test_eliminates_lowest_when_due() {
        let policy = EliminationPolicy::new(2, 3);
        match policy
            .decide(&VotingAggregator::new(1), 2, 2, &contenders(&[4, 1, 3, 2]))
            .expect("decision")
        {
            EliminationDecision::Eliminate { ranking } => {
                assert_eq!(ranking.lowest().map(|s| s.agent_id), Some(AgentId::new(2)));
            }
            other => panic!("expected elimination, got {:?}", other),
        }
    }

    #[test]
    fn test_floor_skips_at_minimum() {
        let policy = EliminationPolicy::new(1, 3);
        assert!(!policy.floor_allows(3));
        assert!(policy.floor_allows(4));
        match policy
            .decide(&VotingAggregator::new(1), 1, 1, &contenders(&[0, 1, 2]))
            .expect("decision")
        {
            EliminationDecision::Skip { alive, minimum, ranking } => {
                assert_eq!(alive, 3);
                assert_eq!(minimum, 3);
                assert_eq!(ranking.lowest().map(|s| s.agent_id), Some(AgentId::new(1)));
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_cadence_clamped() {
        assert_eq!(EliminationPolicy::new(0, 3).rounds_per_elimination(), 1);
    }
}
