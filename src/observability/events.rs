//! Arena events emitted to the persistence collaborator.
//!
//! Serialized as `{"event_type": "...", "data": {...}}`, one object per line in
//! the JSONL log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::{AgentId, AgentSnapshot};
use crate::arena::EliminationEvent;
use crate::prompts::PromptRef;
use crate::voting::TieBreak;

/// Phase in which an agent's responder call or ballot failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    Collecting,
    Voting,
}

impl FailurePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Voting => "voting",
        }
    }
}

/// How the failure was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// The answer was recorded as empty.
    Abstention,
    /// A seeded legal target was substituted for the vote.
    FallbackVote,
}

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    Stopped,
    Failed,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Events emitted by the arena controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum ArenaEvent {
    /// Roster built, before the first round.
    ArenaInitialized {
        model_name: String,
        master_seed: u64,
        num_agents: usize,
        rounds_per_elimination: u64,
        minimum_population: usize,
        total_rounds: u64,
        roster: Vec<AgentSnapshot>,
        timestamp: DateTime<Utc>,
    },
    RoundStarted {
        round: u64,
        prompt: PromptRef,
        prompt_text: String,
        alive: Vec<AgentId>,
        timestamp: DateTime<Utc>,
    },
    AgentResponded {
        round: u64,
        agent_id: AgentId,
        answer: String,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A per-agent failure that was recovered.
    AgentFailed {
        round: u64,
        agent_id: AgentId,
        phase: FailurePhase,
        error: String,
        recovery: Recovery,
        timestamp: DateTime<Utc>,
    },
    VoteCast {
        round: u64,
        voter: AgentId,
        target: AgentId,
        fallback: bool,
        timestamp: DateTime<Utc>,
    },
    /// Per-agent counts for the round; every alive agent appears.
    VoteSummary {
        round: u64,
        counts: BTreeMap<AgentId, u32>,
        total_votes: usize,
        timestamp: DateTime<Utc>,
    },
    /// Scores applied; cumulative scores after this round.
    RoundCompleted {
        round: u64,
        scores: BTreeMap<AgentId, u64>,
        abstentions: usize,
        fallback_votes: usize,
        timestamp: DateTime<Utc>,
    },
    EliminationDecided {
        elimination: Box<EliminationEvent>,
        timestamp: DateTime<Utc>,
    },
    /// Elimination was due but the population floor prevented it.
    EliminationSkipped {
        round: u64,
        alive: usize,
        minimum_population: usize,
        spared: Option<AgentId>,
        tie_break: TieBreak,
        timestamp: DateTime<Utc>,
    },
    /// An agent keeps producing unusable ballots. Informational only.
    FallbackAnomaly {
        round: u64,
        agent_id: AgentId,
        consecutive_fallbacks: u32,
        threshold: u32,
        timestamp: DateTime<Utc>,
    },
    ArenaTerminated {
        last_round: u64,
        reason: TerminationReason,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ArenaEvent {
    pub fn round_started(
        round: u64,
        prompt: PromptRef,
        prompt_text: impl Into<String>,
        alive: Vec<AgentId>,
    ) -> Self {
        Self::RoundStarted {
            round,
            prompt,
            prompt_text: prompt_text.into(),
            alive,
            timestamp: Utc::now(),
        }
    }

    pub fn agent_responded(round: u64, agent_id: AgentId, answer: impl Into<String>, latency_ms: u64) -> Self {
        Self::AgentResponded {
            round,
            agent_id,
            answer: answer.into(),
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn agent_failed(
        round: u64,
        agent_id: AgentId,
        phase: FailurePhase,
        error: impl ToString,
        recovery: Recovery,
    ) -> Self {
        Self::AgentFailed {
            round,
            agent_id,
            phase,
            error: error.to_string(),
            recovery,
            timestamp: Utc::now(),
        }
    }

    pub fn vote_cast(round: u64, voter: AgentId, target: AgentId, fallback: bool) -> Self {
        Self::VoteCast {
            round,
            voter,
            target,
            fallback,
            timestamp: Utc::now(),
        }
    }

    pub fn vote_summary(round: u64, counts: BTreeMap<AgentId, u32>, total_votes: usize) -> Self {
        Self::VoteSummary {
            round,
            counts,
            total_votes,
            timestamp: Utc::now(),
        }
    }

    pub fn round_completed(
        round: u64,
        scores: BTreeMap<AgentId, u64>,
        abstentions: usize,
        fallback_votes: usize,
    ) -> Self {
        Self::RoundCompleted {
            round,
            scores,
            abstentions,
            fallback_votes,
            timestamp: Utc::now(),
        }
    }

    pub fn elimination_decided(elimination: EliminationEvent) -> Self {
        Self::EliminationDecided {
            elimination: Box::new(elimination),
            timestamp: Utc::now(),
        }
    }

    pub fn elimination_skipped(
        round: u64,
        alive: usize,
        minimum_population: usize,
        spared: Option<AgentId>,
        tie_break: TieBreak,
    ) -> Self {
        Self::EliminationSkipped {
            round,
            alive,
            minimum_population,
            spared,
            tie_break,
            timestamp: Utc::now(),
        }
    }

    pub fn fallback_anomaly(round: u64, agent_id: AgentId, consecutive_fallbacks: u32, threshold: u32) -> Self {
        Self::FallbackAnomaly {
            round,
            agent_id,
            consecutive_fallbacks,
            threshold,
            timestamp: Utc::now(),
        }
    }

    pub fn arena_terminated(last_round: u64, reason: TerminationReason, message: Option<String>) -> Self {
        Self::ArenaTerminated {
            last_round,
            reason,
            message,
            timestamp: Utc::now(),
        }
    }

    /// The `event_type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ArenaInitialized { .. } => "arena_initialized",
            Self::RoundStarted { .. } => "round_started",
            Self::AgentResponded { .. } => "agent_responded",
            Self::AgentFailed { .. } => "agent_failed",
            Self::VoteCast { .. } => "vote_cast",
            Self::VoteSummary { .. } => "vote_summary",
            Self::RoundCompleted { .. } => "round_completed",
            Self::EliminationDecided { .. } => "elimination_decided",
            Self::EliminationSkipped { .. } => "elimination_skipped",
            Self::FallbackAnomaly { .. } => "fallback_anomaly",
            Self::ArenaTerminated { .. } => "arena_terminated",
        }
    }

    /// The round an event belongs to, if any.
    pub fn round(&self) -> Option<u64> {
        match self {
            Self::ArenaInitialized { .. } | Self::ArenaTerminated { .. } => None,
            Self::RoundStarted { round, .. }
            | Self::AgentResponded { round, .. }
            | Self::AgentFailed { round, .. }
            | Self::VoteCast { round, .. }
            | Self::VoteSummary { round, .. }
            | Self::RoundCompleted { round, .. }
            | Self::EliminationSkipped { round, .. }
            | Self::FallbackAnomaly { round, .. } => Some(*round),
            Self::EliminationDecided { elimination, .. } => Some(elimination.round),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_shape() {
        let event = ArenaEvent::vote_cast(3, AgentId::new(1), AgentId::new(2), true);
        let value = serde_json::to_value(&event).expect("serializable");
        assert_eq!(value["event_type"], "vote_cast");
        assert_eq!(value["data"]["round"], 3);
        assert_eq!(value["data"]["voter"], 1);
        assert_eq!(value["data"]["fallback"], true);
        assert!(value["data"]["timestamp"].is_string());
        assert_eq!(event.event_type(), "vote_cast");
    }

    #[test]
    fn test_vote_summary_round_trips_with_id_keys() {
        let counts: BTreeMap<AgentId, u32> =
            [(AgentId::new(1), 2), (AgentId::new(4), 0)].into_iter().collect();
        let event = ArenaEvent::vote_summary(2, counts.clone(), 2);
        let line = serde_json::to_string(&event).expect("serializable");
        let back: ArenaEvent = serde_json::from_str(&line).expect("deserializable");
        match back {
            ArenaEvent::VoteSummary { counts: parsed, total_votes, .. } => {
                assert_eq!(parsed, counts);
                assert_eq!(total_votes, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_round_accessor() {
        assert_eq!(
            ArenaEvent::arena_terminated(4, TerminationReason::Stopped, None).round(),
            None
        );
        assert_eq!(
            ArenaEvent::agent_failed(
                5,
                AgentId::new(2),
                FailurePhase::Collecting,
                "timed out",
                Recovery::Abstention
            )
            .round(),
            Some(5)
        );
    }
}
