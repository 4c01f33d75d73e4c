//! Agent wrapper: identity, personality, memory and score for one roster slot.
//!
//! An agent never sees the arena state. Each responder call receives only the
//! agent's own personality and memory; all mutation happens through
//! crate-private methods called by the controller after a phase has joined.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::memory::{MemoryEntry, MemoryWindow};
use super::responder::{Responder, ResponderRequest, Sampling};
use super::AgentId;
use crate::error::{InvalidVoteError, InvariantViolation, ResponderError};
use crate::personality::PersonalityProfile;
use crate::voting::Ballot;

/// Why an agent's ballot could not be used as cast.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BallotFailure {
    #[error(transparent)]
    Responder(#[from] ResponderError),

    #[error(transparent)]
    Invalid(#[from] InvalidVoteError),
}

/// Serializable identity and personality of an agent, for events and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub slot: usize,
    pub generation: u32,
    pub seed: u64,
    pub profile: PersonalityProfile,
}

/// What happened to one agent in a closed round.
#[derive(Debug, Clone)]
pub(crate) struct RoundOutcomeForAgent {
    pub round: u64,
    pub prompt: String,
    pub answer: String,
    pub abstained: bool,
    pub vote_target: AgentId,
    pub vote_was_fallback: bool,
    pub votes_received: u32,
    pub vote_distribution: Vec<u32>,
}

/// A contestant occupying one roster slot for one generation.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    slot: usize,
    generation: u32,
    seed: u64,
    profile: PersonalityProfile,
    memory: MemoryWindow,
    score: u64,
    alive: bool,
    rounds_played: u64,
    votes_cast: u64,
    vote_targets: BTreeMap<AgentId, u32>,
    abstentions: u32,
    fallback_votes: u32,
    consecutive_fallbacks: u32,
}

impl Agent {
    /// Creates a fresh agent with an empty memory and a score of zero.
    pub fn new(
        id: AgentId,
        slot: usize,
        generation: u32,
        seed: u64,
        profile: PersonalityProfile,
        memory_window: usize,
    ) -> Self {
        Self {
            id,
            slot,
            generation,
            seed,
            profile,
            memory: MemoryWindow::new(memory_window),
            score: 0,
            alive: true,
            rounds_played: 0,
            votes_cast: 0,
            vote_targets: BTreeMap::new(),
            abstentions: 0,
            fallback_votes: 0,
            consecutive_fallbacks: 0,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn profile(&self) -> &PersonalityProfile {
        &self.profile
    }

    /// Read-only view of the agent's memory.
    pub fn memory(&self) -> &MemoryWindow {
        &self.memory
    }

    /// Cumulative votes received since this generation started.
    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn rounds_played(&self) -> u64 {
        self.rounds_played
    }

    pub fn votes_cast(&self) -> u64 {
        self.votes_cast
    }

    pub fn abstentions(&self) -> u32 {
        self.abstentions
    }

    pub fn fallback_votes(&self) -> u32 {
        self.fallback_votes
    }

    pub fn consecutive_fallbacks(&self) -> u32 {
        self.consecutive_fallbacks
    }

    /// Number of distinct agents this agent has voted for.
    pub fn distinct_vote_targets(&self) -> usize {
        self.vote_targets.len()
    }

    /// Average votes received per round over this generation's lifetime.
    pub fn historical_average(&self) -> f64 {
        if self.rounds_played == 0 {
            0.0
        } else {
            self.score as f64 / self.rounds_played as f64
        }
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.id,
            slot: self.slot,
            generation: self.generation,
            seed: self.seed,
            profile: self.profile,
        }
    }

    fn request(&self, prompt: String, sampling: Sampling) -> ResponderRequest {
        ResponderRequest {
            prompt,
            personality_context: self.profile.render_context(),
            memory_context: self.memory.render_context(),
            temperature: sampling.temperature,
            seed: sampling.seed,
        }
    }

    /// Asks the responder for this agent's answer to the round prompt.
    ///
    /// # Errors
    ///
    /// Returns the responder's error unchanged; the caller records it as an
    /// abstention.
    pub async fn respond(
        &self,
        responder: &dyn Responder,
        prompt: &str,
        sampling: Sampling,
    ) -> Result<String, ResponderError> {
        let answer = responder
            .generate(self.request(prompt.to_string(), sampling))
            .await?;
        Ok(answer.trim().to_string())
    }

    /// Asks the responder to pick one candidate from the ballot.
    ///
    /// The ballot never contains this agent's own answer. The returned id is
    /// guaranteed to be on the ballot and not this agent.
    ///
    /// # Errors
    ///
    /// `BallotFailure::Responder` if the call fails, `BallotFailure::Invalid`
    /// if the reply names no candidate, an unknown one, or this agent.
    pub async fn vote(
        &self,
        responder: &dyn Responder,
        ballot: &Ballot,
        sampling: Sampling,
    ) -> Result<AgentId, BallotFailure> {
        let reply = responder
            .generate(self.request(ballot.render(), sampling))
            .await?;
        let target = ballot.resolve(&reply)?;

        if target == self.id {
            return Err(InvalidVoteError::SelfVote {
                voter: self.id.to_string(),
            }
            .into());
        }
        Ok(target)
    }

    /// Applies a closed round: score, counters and a new memory entry.
    pub(crate) fn apply_round(
        &mut self,
        outcome: RoundOutcomeForAgent,
    ) -> Result<(), InvariantViolation> {
        self.score += u64::from(outcome.votes_received);
        self.rounds_played += 1;
        self.votes_cast += 1;
        *self.vote_targets.entry(outcome.vote_target).or_insert(0) += 1;

        if outcome.abstained {
            self.abstentions += 1;
        }
        if outcome.vote_was_fallback {
            self.fallback_votes += 1;
            self.consecutive_fallbacks += 1;
        } else {
            self.consecutive_fallbacks = 0;
        }

        self.remember(MemoryEntry {
            agent_id: self.id,
            round: outcome.round,
            prompt: outcome.prompt,
            answer: outcome.answer,
            abstained: outcome.abstained,
            vote_target: outcome.vote_target,
            vote_was_fallback: outcome.vote_was_fallback,
            votes_received: outcome.votes_received,
            vote_distribution: outcome.vote_distribution,
        })
    }

    /// Records an externally built memory entry, refusing foreign entries.
    pub(crate) fn remember(&mut self, entry: MemoryEntry) -> Result<(), InvariantViolation> {
        if entry.agent_id != self.id {
            return Err(InvariantViolation::ForeignMemoryEntry {
                owner: self.id.to_string(),
                foreign: entry.agent_id.to_string(),
            });
        }
        self.memory.record(entry);
        Ok(())
    }

    /// Marks the agent as removed from play.
    pub(crate) fn retire(&mut self) {
        self.alive = false;
    }

    /// Builds the agent that replaces this one in the same slot.
    ///
    /// The successor starts with a score of zero, an empty memory and the next
    /// generation number.
    pub(crate) fn successor(
        &self,
        id: AgentId,
        seed: u64,
        profile: PersonalityProfile,
    ) -> Agent {
        Agent::new(
            id,
            self.slot,
            self.generation + 1,
            seed,
            profile,
            self.memory.capacity(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personality::{PersonalityGenerator, PersonalityTemplate};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedResponder {
        reply: Result<String, ResponderError>,
        prompts: Mutex<Vec<ResponderRequest>>,
    }

    impl ScriptedResponder {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: ResponderError) -> Self {
            Self {
                reply: Err(err),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Responder for ScriptedResponder {
        async fn generate(&self, request: ResponderRequest) -> Result<String, ResponderError> {
            self.prompts.lock().expect("lock not poisoned").push(request);
            self.reply.clone()
        }
    }

    fn agent(id: u64) -> Agent {
        let profile =
            PersonalityGenerator::generate(&PersonalityTemplate::default(), id).expect("valid");
        Agent::new(AgentId::new(id), id as usize, 0, id, profile, 3)
    }

    fn outcome(round: u64, votes: u32, fallback: bool) -> RoundOutcomeForAgent {
        RoundOutcomeForAgent {
            round,
            prompt: "p".to_string(),
            answer: "a".to_string(),
            abstained: false,
            vote_target: AgentId::new(9),
            vote_was_fallback: fallback,
            votes_received: votes,
            vote_distribution: vec![votes],
        }
    }

    fn ballot_for(voter: AgentId) -> Ballot {
        Ballot::new(
            voter,
            vec![
                (AgentId::new(2), "Blue".to_string()),
                (AgentId::new(3), "Green".to_string()),
            ],
        )
    }

    #[tokio::test]
    async fn test_respond_passes_own_context() {
        let responder = ScriptedResponder::ok(" Blue. ");
        let a = agent(1);
        let answer = a
            .respond(&responder, "Favourite colour?", Sampling::new(0.5).with_seed(11))
            .await
            .expect("ok");
        assert_eq!(answer, "Blue.");

        let prompts = responder.prompts.lock().expect("lock not poisoned");
        assert_eq!(prompts[0].prompt, "Favourite colour?");
        assert_eq!(prompts[0].personality_context, a.profile().render_context());
        assert!((prompts[0].temperature - 0.5).abs() < f64::EPSILON);
        assert_eq!(prompts[0].seed, Some(11));
    }

    #[tokio::test]
    async fn test_respond_surfaces_failure() {
        let responder = ScriptedResponder::failing(ResponderError::Timeout { millis: 5000 });
        let err = agent(1).respond(&responder, "p", Sampling::new(0.5)).await.expect_err("fails");
        assert!(matches!(err, ResponderError::Timeout { millis: 5000 }));
    }

    #[tokio::test]
    async fn test_vote_resolves_label() {
        let responder = ScriptedResponder::ok("I pick candidate B");
        let voter = agent(1);
        let target = voter
            .vote(&responder, &ballot_for(voter.id()), Sampling::new(0.5))
            .await
            .expect("valid vote");
        assert_eq!(target, AgentId::new(3));
    }

    #[tokio::test]
    async fn test_vote_unknown_label_is_invalid() {
        let responder = ScriptedResponder::ok("Candidate Q");
        let voter = agent(1);
        let err = voter
            .vote(&responder, &ballot_for(voter.id()), Sampling::new(0.5))
            .await
            .expect_err("invalid");
        assert!(matches!(
            err,
            BallotFailure::Invalid(InvalidVoteError::UnknownCandidate { .. })
        ));
    }

    #[tokio::test]
    async fn test_vote_for_self_is_invalid() {
        let responder = ScriptedResponder::ok("A");
        let voter = agent(2);
        let err = voter
            .vote(&responder, &ballot_for(AgentId::new(1)), Sampling::new(0.5))
            .await
            .expect_err("self vote");
        assert!(matches!(
            err,
            BallotFailure::Invalid(InvalidVoteError::SelfVote { .. })
        ));
    }

    #[test]
    fn test_apply_round_updates_score_and_memory() {
        let mut a = agent(1);
        a.apply_round(outcome(1, 2, false)).expect("own entry");
        a.apply_round(outcome(2, 0, false)).expect("own entry");
        assert_eq!(a.score(), 2);
        assert_eq!(a.rounds_played(), 2);
        assert!((a.historical_average() - 1.0).abs() < f64::EPSILON);
        assert_eq!(a.memory().len(), 2);
        assert_eq!(a.distinct_vote_targets(), 1);
    }

    #[test]
    fn test_consecutive_fallbacks_reset_on_valid_vote() {
        let mut a = agent(1);
        a.apply_round(outcome(1, 0, true)).expect("own entry");
        a.apply_round(outcome(2, 0, true)).expect("own entry");
        assert_eq!(a.consecutive_fallbacks(), 2);
        a.apply_round(outcome(3, 0, false)).expect("own entry");
        assert_eq!(a.consecutive_fallbacks(), 0);
        assert_eq!(a.fallback_votes(), 2);
    }

    #[test]
    fn test_remember_rejects_foreign_entry() {
        let mut a = agent(1);
        let foreign = MemoryEntry {
            agent_id: AgentId::new(2),
            round: 1,
            prompt: "p".to_string(),
            answer: "a".to_string(),
            abstained: false,
            vote_target: AgentId::new(1),
            vote_was_fallback: false,
            votes_received: 0,
            vote_distribution: vec![],
        };
        assert!(matches!(
            a.remember(foreign),
            Err(InvariantViolation::ForeignMemoryEntry { .. })
        ));
        assert!(a.memory().is_empty());
    }

    #[test]
    fn test_successor_starts_clean() {
        let mut a = agent(1);
        a.apply_round(outcome(1, 4, false)).expect("own entry");
        let profile = *a.profile();
        let next = a.successor(AgentId::new(20), 99, profile);
        assert_eq!(next.slot(), a.slot());
        assert_eq!(next.generation(), a.generation() + 1);
        assert_eq!(next.score(), 0);
        assert!(next.memory().is_empty());
        assert_eq!(next.memory().capacity(), a.memory().capacity());
        assert!(next.is_alive());
    }
}
