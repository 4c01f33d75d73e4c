//! Rebuilds per-round summaries from an event log without calling any
//! responder.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use super::events::{ArenaEvent, FailurePhase, TerminationReason};
use crate::agents::AgentId;
use crate::arena::EliminationEvent;
use crate::error::PersistenceError;
use crate::prompts::PromptRef;

/// What a log says about one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayRoundSummary {
    pub round: u64,
    pub prompt: PromptRef,
    pub prompt_text: String,
    pub alive: Vec<AgentId>,
    pub responses: BTreeMap<AgentId, String>,
    pub failures: Vec<(AgentId, FailurePhase, String)>,
    /// Voter to `(target, fallback)`.
    pub votes: BTreeMap<AgentId, (AgentId, bool)>,
    pub counts: BTreeMap<AgentId, u32>,
    pub scores: BTreeMap<AgentId, u64>,
    pub completed: bool,
    pub elimination: Option<EliminationEvent>,
    pub elimination_skipped: bool,
}

impl ReplayRoundSummary {
    fn new(round: u64, prompt: PromptRef, prompt_text: String, alive: Vec<AgentId>) -> Self {
        Self {
            round,
            prompt,
            prompt_text,
            alive,
            responses: BTreeMap::new(),
            failures: Vec::new(),
            votes: BTreeMap::new(),
            counts: BTreeMap::new(),
            scores: BTreeMap::new(),
            completed: false,
            elimination: None,
            elimination_skipped: false,
        }
    }

    /// Human-readable multi-line summary.
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "Round {} [{}] {} agents, {} votes{}",
            self.round,
            self.prompt,
            self.alive.len(),
            self.votes.len(),
            if self.completed { "" } else { " (incomplete)" }
        )];
        let mut ranked: Vec<(&AgentId, &u32)> = self.counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (agent_id, count) in ranked {
            let total = self.scores.get(agent_id).copied().unwrap_or(0);
            lines.push(format!("  {}: +{} (total {})", agent_id, count, total));
        }
        for (agent_id, phase, error) in &self.failures {
            lines.push(format!("  ! {} failed while {}: {}", agent_id, phase.as_str(), error));
        }
        if let Some(elimination) = &self.elimination {
            lines.push(format!(
                "  x {} eliminated with score {} ({:?}); replaced by {}",
                elimination.eliminated.agent_id,
                elimination.final_score,
                elimination.tie_break,
                elimination.replacement.agent_id
            ));
        } else if self.elimination_skipped {
            lines.push("  - elimination skipped at population floor".to_string());
        }
        lines.join("\n")
    }
}

/// Folds events into round summaries, checking that the log is coherent.
#[derive(Debug, Default)]
pub struct ReplayEngine {
    rounds: BTreeMap<u64, ReplayRoundSummary>,
    initialized: bool,
    termination: Option<(TerminationReason, u64)>,
    anomalies: Vec<(u64, AgentId)>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays every event in a JSONL file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let mut engine = Self::new();
        for event in read_events(path)? {
            engine.apply(&event)?;
        }
        engine.finish()?;
        Ok(engine)
    }

    /// Replays an in-memory event sequence.
    pub fn from_events<'a, I>(events: I) -> Result<Self, PersistenceError>
    where
        I: IntoIterator<Item = &'a ArenaEvent>,
    {
        let mut engine = Self::new();
        for event in events {
            engine.apply(event)?;
        }
        engine.finish()?;
        Ok(engine)
    }

    fn round_mut(&mut self, round: u64, event_type: &str) -> Result<&mut ReplayRoundSummary, PersistenceError> {
        self.rounds.get_mut(&round).ok_or_else(|| {
            PersistenceError::Inconsistent(format!(
                "{} references round {} which never started",
                event_type, round
            ))
        })
    }

    /// Applies one event.
    pub fn apply(&mut self, event: &ArenaEvent) -> Result<(), PersistenceError> {
        let event_type = event.event_type();
        match event {
            ArenaEvent::ArenaInitialized { .. } => {
                self.initialized = true;
            }
            ArenaEvent::RoundStarted {
                round,
                prompt,
                prompt_text,
                alive,
                ..
            } => {
                if self.rounds.contains_key(round) {
                    return Err(PersistenceError::Inconsistent(format!(
                        "round {} started twice",
                        round
                    )));
                }
                self.rounds.insert(
                    *round,
                    ReplayRoundSummary::new(*round, prompt.clone(), prompt_text.clone(), alive.clone()),
                );
            }
            ArenaEvent::AgentResponded {
                round,
                agent_id,
                answer,
                ..
            } => {
                self.round_mut(*round, event_type)?
                    .responses
                    .insert(*agent_id, answer.clone());
            }
            ArenaEvent::AgentFailed {
                round,
                agent_id,
                phase,
                error,
                ..
            } => {
                let summary = self.round_mut(*round, event_type)?;
                if *phase == FailurePhase::Collecting {
                    summary.responses.insert(*agent_id, String::new());
                }
                summary.failures.push((*agent_id, *phase, error.clone()));
            }
            ArenaEvent::VoteCast {
                round,
                voter,
                target,
                fallback,
                ..
            } => {
                let summary = self.round_mut(*round, event_type)?;
                if summary.votes.insert(*voter, (*target, *fallback)).is_some() {
                    return Err(PersistenceError::Inconsistent(format!(
                        "{} voted twice in round {}",
                        voter, round
                    )));
                }
            }
            ArenaEvent::VoteSummary {
                round,
                counts,
                total_votes,
                ..
            } => {
                let summary = self.round_mut(*round, event_type)?;
                let cast = summary.votes.len();
                let counted: u64 = counts.values().map(|c| u64::from(*c)).sum();
                if cast != *total_votes || counted != *total_votes as u64 {
                    return Err(PersistenceError::Inconsistent(format!(
                        "round {} summary reports {} votes (counts sum to {}) but {} were cast",
                        round, total_votes, counted, cast
                    )));
                }
                summary.counts = counts.clone();
            }
            ArenaEvent::RoundCompleted { round, scores, .. } => {
                let summary = self.round_mut(*round, event_type)?;
                summary.scores = scores.clone();
                summary.completed = true;
            }
            ArenaEvent::EliminationDecided { elimination, .. } => {
                self.round_mut(elimination.round, event_type)?.elimination =
                    Some(elimination.as_ref().clone());
            }
            ArenaEvent::EliminationSkipped { round, .. } => {
                self.round_mut(*round, event_type)?.elimination_skipped = true;
            }
            ArenaEvent::FallbackAnomaly { round, agent_id, .. } => {
                self.round_mut(*round, event_type)?;
                self.anomalies.push((*round, *agent_id));
            }
            ArenaEvent::ArenaTerminated {
                last_round, reason, ..
            } => {
                self.termination = Some((*reason, *last_round));
            }
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), PersistenceError> {
        if let Some((_, last_round)) = self.termination {
            let highest = self.rounds.keys().next_back().copied().unwrap_or(0);
            if highest > last_round {
                return Err(PersistenceError::Inconsistent(format!(
                    "arena terminated after round {} but round {} was logged",
                    last_round, highest
                )));
            }
        }
        Ok(())
    }

    pub fn rounds(&self) -> impl Iterator<Item = &ReplayRoundSummary> + '_ {
        self.rounds.values()
    }

    pub fn round(&self, index: u64) -> Option<&ReplayRoundSummary> {
        self.rounds.get(&index)
    }

    pub fn eliminations(&self) -> Vec<&EliminationEvent> {
        self.rounds
            .values()
            .filter_map(|r| r.elimination.as_ref())
            .collect()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination.map(|(reason, _)| reason)
    }

    /// `(round, agent)` pairs flagged for repeated fallback voting.
    pub fn anomalies(&self) -> &[(u64, AgentId)] {
        &self.anomalies
    }
}

/// Reads a JSONL event log. Blank lines are ignored.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<ArenaEvent>, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|e| PersistenceError::Malformed {
            line: index + 1,
            message: e.to_string(),
        })?;
        events.push(event);
    }
    Ok(events)
}
