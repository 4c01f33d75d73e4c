//! Descriptive record of an eliminated agent.
//!
//! Write-only: nothing in the arena reads a post-mortem back when making
//! decisions.

use serde::{Deserialize, Serialize};

use crate::agents::{Agent, AgentId};
use crate::personality::PersonalityProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMortem {
    pub agent_id: AgentId,
    pub slot: usize,
    pub generation: u32,
    pub profile: PersonalityProfile,
    /// Round in which the agent was eliminated.
    pub round: u64,
    pub rounds_survived: u64,
    pub total_votes_received: u64,
    pub lifetime_average: f64,
    pub votes_cast: u64,
    pub distinct_vote_targets: usize,
    pub abstentions: u32,
    pub fallback_votes: u32,
    /// Answers still in the agent's memory window, oldest first.
    pub recent_answers: Vec<String>,
}

impl PostMortem {
    pub fn from_agent(agent: &Agent, round: u64) -> Self {
        Self {
            agent_id: agent.id(),
            slot: agent.slot(),
            generation: agent.generation(),
            profile: *agent.profile(),
            round,
            rounds_survived: agent.rounds_played(),
            total_votes_received: agent.score(),
            lifetime_average: agent.historical_average(),
            votes_cast: agent.votes_cast(),
            distinct_vote_targets: agent.distinct_vote_targets(),
            abstentions: agent.abstentions(),
            fallback_votes: agent.fallback_votes(),
            recent_answers: agent.memory().view().map(|e| e.answer.clone()).collect(),
        }
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} (gen {}) survived {} rounds, {} votes (avg {:.2}), {} abstentions, {} fallback votes; {}",
            self.agent_id,
            self.generation,
            self.rounds_survived,
            self.total_votes_received,
            self.lifetime_average,
            self.abstentions,
            self.fallback_votes,
            self.profile
        )
    }
}
