//! Arena state: the roster, round counter and per-round records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::elimination::EliminationPhase;
use crate::agents::{Agent, AgentId, AgentSnapshot};
use crate::error::{ArenaResult, ConfigError, InvariantViolation};
use crate::personality::{PersonalityGenerator, PersonalityTemplate};
use crate::prompts::PromptRef;
use crate::voting::{Contender, RoundTally, Vote};

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Init,
    RoundStart,
    Collecting,
    Voting,
    Scoring,
    EliminationCheck,
    Terminal,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::RoundStart => "round_start",
            Self::Collecting => "collecting",
            Self::Voting => "voting",
            Self::Scoring => "scoring",
            Self::EliminationCheck => "elimination_check",
            Self::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed round. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: u64,
    pub prompt: PromptRef,
    pub prompt_text: String,
    /// Answer per alive agent; empty for abstentions.
    pub responses: BTreeMap<AgentId, String>,
    pub abstentions: BTreeSet<AgentId>,
    pub votes: Vec<Vote>,
    pub tally: RoundTally,
}

impl Round {
    pub fn fallback_votes(&self) -> usize {
        self.votes.iter().filter(|v| v.fallback).count()
    }
}

/// The single mutable arena state, owned by the controller.
///
/// Slot `i` of the roster always holds exactly one agent; replacement swaps
/// the occupant in place.
#[derive(Debug, Clone)]
pub struct ArenaState {
    roster: Vec<Agent>,
    minimum_population: usize,
    round: u64,
    rounds_since_last_elimination: u64,
    next_agent_id: u64,
    phase: RoundPhase,
    elimination_phase: EliminationPhase,
}

impl ArenaState {
    /// Builds the initial roster with independently seeded personalities.
    pub fn initialize(
        num_agents: usize,
        minimum_population: usize,
        memory_window: usize,
        generator: &PersonalityGenerator,
        template: &PersonalityTemplate,
    ) -> Result<Self, ConfigError> {
        if num_agents < minimum_population {
            return Err(ConfigError::invalid(
                "num_agents",
                format!("must be at least minimum_population ({})", minimum_population),
            ));
        }

        let mut state = Self {
            roster: Vec::with_capacity(num_agents),
            minimum_population,
            round: 0,
            rounds_since_last_elimination: 0,
            next_agent_id: 1,
            phase: RoundPhase::Init,
            elimination_phase: EliminationPhase::Idle,
        };

        for slot in 0..num_agents {
            let (seed, profile) = generator.initial(template, slot)?;
            let id = state.allocate_id();
            state
                .roster
                .push(Agent::new(id, slot, 0, seed, profile, memory_window));
        }

        Ok(state)
    }

    pub fn roster(&self) -> &[Agent] {
        &self.roster
    }

    pub fn capacity(&self) -> usize {
        self.roster.len()
    }

    pub fn alive(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.roster.iter().filter(|a| a.is_alive())
    }

    pub fn alive_ids(&self) -> BTreeSet<AgentId> {
        self.alive().map(|a| a.id()).collect()
    }

    pub fn alive_count(&self) -> usize {
        self.alive().count()
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.roster.iter().find(|a| a.id() == id)
    }

    pub(crate) fn agent_mut(&mut self, id: AgentId) -> Result<&mut Agent, InvariantViolation> {
        self.roster
            .iter_mut()
            .find(|a| a.id() == id)
            .ok_or_else(|| InvariantViolation::AgentNotFound(id.to_string()))
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.alive().map(Agent::snapshot).collect()
    }

    /// Ranking inputs for every alive agent.
    pub fn contenders(&self) -> Vec<Contender> {
        self.alive()
            .map(|a| Contender {
                agent_id: a.id(),
                score: a.score(),
                historical_average: a.historical_average(),
            })
            .collect()
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn rounds_since_last_elimination(&self) -> u64 {
        self.rounds_since_last_elimination
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn elimination_phase(&self) -> EliminationPhase {
        self.elimination_phase
    }

    pub fn minimum_population(&self) -> usize {
        self.minimum_population
    }

    pub(crate) fn set_phase(&mut self, phase: RoundPhase) {
        tracing::debug!(round = self.round, from = %self.phase, to = %phase, "Phase transition");
        self.phase = phase;
    }

    pub(crate) fn set_elimination_phase(&mut self, phase: EliminationPhase) {
        tracing::debug!(round = self.round, phase = ?phase, "Elimination cycle step");
        self.elimination_phase = phase;
    }

    /// Advances to the next round and returns its index.
    pub(crate) fn begin_round(&mut self) -> u64 {
        self.round += 1;
        self.rounds_since_last_elimination += 1;
        self.round
    }

    pub(crate) fn reset_elimination_counter(&mut self) {
        self.rounds_since_last_elimination = 0;
    }

    pub(crate) fn allocate_id(&mut self) -> AgentId {
        let id = AgentId::new(self.next_agent_id);
        self.next_agent_id += 1;
        id
    }

    /// Checks `minimum ≤ alive ≤ capacity`.
    pub fn check_population(&self) -> Result<(), InvariantViolation> {
        let alive = self.alive_count();
        if alive < self.minimum_population || alive > self.capacity() {
            return Err(InvariantViolation::PopulationOutOfBounds {
                alive,
                minimum: self.minimum_population,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Replaces `agent_id` with a freshly generated agent in the same slot.
    ///
    /// Returns the retired agent. The successor has a new id, the next
    /// generation number, a score of zero and an empty memory.
    pub(crate) fn replace(
        &mut self,
        agent_id: AgentId,
        generator: &PersonalityGenerator,
        template: &PersonalityTemplate,
    ) -> ArenaResult<Agent> {
        let slot = self
            .roster
            .iter()
            .position(|a| a.id() == agent_id && a.is_alive())
            .ok_or_else(|| InvariantViolation::AgentNotFound(agent_id.to_string()))?;

        let round = self.round;
        let (seed, profile) = {
            let old = &self.roster[slot];
            generator.successor(
                template,
                old.profile(),
                old.seed(),
                old.generation() + 1,
                slot,
                round,
            )?
        };

        let id = self.allocate_id();
        let successor = self.roster[slot].successor(id, seed, profile);
        let mut retired = std::mem::replace(&mut self.roster[slot], successor);
        retired.retire();
        Ok(retired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(num_agents: usize) -> ArenaState {
        ArenaState::initialize(
            num_agents,
            3,
            5,
            &PersonalityGenerator::new(42),
            &PersonalityTemplate::default(),
        )
        .expect("valid state")
    }

    #[test]
    fn test_initialize_assigns_unique_ids_and_slots() {
        let s = state(6);
        assert_eq!(s.capacity(), 6);
        assert_eq!(s.alive_count(), 6);
        let ids = s.alive_ids();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids.iter().next().map(|id| id.to_string()), Some("agent-001".to_string()));
        for (slot, agent) in s.roster().iter().enumerate() {
            assert_eq!(agent.slot(), slot);
            assert_eq!(agent.generation(), 0);
        }
        assert!(s.check_population().is_ok());
        assert_eq!(s.phase(), RoundPhase::Init);
    }

    #[test]
    fn test_initialize_rejects_small_population() {
        let result = ArenaState::initialize(
            2,
            3,
            5,
            &PersonalityGenerator::new(1),
            &PersonalityTemplate::default(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_initialize_is_reproducible() {
        let a: Vec<_> = state(5).roster().iter().map(|a| *a.profile()).collect();
        let b: Vec<_> = state(5).roster().iter().map(|a| *a.profile()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_begin_round_and_counter() {
        let mut s = state(4);
        assert_eq!(s.begin_round(), 1);
        assert_eq!(s.begin_round(), 2);
        assert_eq!(s.rounds_since_last_elimination(), 2);
        s.reset_elimination_counter();
        assert_eq!(s.rounds_since_last_elimination(), 0);
        assert_eq!(s.round(), 2);
    }

    #[test]
    fn test_replace_installs_fresh_agent_in_slot() {
        let mut s = state(4);
        s.begin_round();
        let target = s.roster()[2].id();

        let retired = s
            .replace(target, &PersonalityGenerator::new(42), &PersonalityTemplate::default())
            .expect("replaced");

        assert_eq!(retired.id(), target);
        assert!(!retired.is_alive());

        let successor = &s.roster()[2];
        assert_eq!(successor.id(), AgentId::new(5));
        assert_eq!(successor.generation(), 1);
        assert_eq!(successor.score(), 0);
        assert!(successor.memory().is_empty());
        assert!(s.agent(target).is_none());
        assert_eq!(s.alive_count(), 4);
    }

    #[test]
    fn test_replace_unknown_agent() {
        let mut s = state(4);
        let result = s.replace(
            AgentId::new(99),
            &PersonalityGenerator::new(42),
            &PersonalityTemplate::default(),
        );
        assert!(matches!(
            result,
            Err(crate::error::ArenaError::Invariant(
                InvariantViolation::AgentNotFound(_)
            ))
        ));
    }
}
