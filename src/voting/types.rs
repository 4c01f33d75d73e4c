//! Vote, tally and ranking types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

/// One vote as it reaches the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: AgentId,
    pub target: AgentId,
    /// The agent's own ballot was unusable and this target was substituted.
    pub fallback: bool,
}

/// Per-agent vote counts for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTally {
    pub round: u64,
    /// Every alive agent appears, with zero if it received no vote.
    pub counts: BTreeMap<AgentId, u32>,
    pub total_votes: usize,
}

impl RoundTally {
    pub fn count(&self, agent_id: AgentId) -> u32 {
        self.counts.get(&agent_id).copied().unwrap_or(0)
    }

    /// Anonymous count distribution, highest first.
    pub fn distribution(&self) -> Vec<u32> {
        let mut counts: Vec<u32> = self.counts.values().copied().collect();
        counts.sort_unstable_by(|a, b| b.cmp(a));
        counts
    }

    /// Sum of all counts; equals `total_votes` for a well-formed tally.
    pub fn sum(&self) -> u64 {
        self.counts.values().map(|c| u64::from(*c)).sum()
    }
}

/// Ranking input for one alive agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contender {
    pub agent_id: AgentId,
    pub score: u64,
    pub historical_average: f64,
}

/// One agent's position in an elimination ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub agent_id: AgentId,
    pub score: u64,
    pub historical_average: f64,
    /// Seeded key used to order agents still tied after the average.
    pub draw_key: u64,
}

/// Which comparison separated the two most eliminable agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Cumulative score alone decided.
    None,
    /// Scores tied; the lower lifetime average decided.
    HistoricalAverage,
    /// Score and average tied; the seeded draw decided.
    SeededDraw,
}

/// Full elimination order, most eliminable first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub round: u64,
    pub order: Vec<Standing>,
    pub decided_by: TieBreak,
}

impl Ranking {
    /// The agent the policy would eliminate.
    pub fn lowest(&self) -> Option<&Standing> {
        self.order.first()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.order.iter().map(|s| s.agent_id).collect()
    }
}
