//! Arena controller: drives `Init → RoundStart → Collecting → Voting →
//! Scoring → EliminationCheck → (RoundStart | Terminal)`.
//!
//! Agent calls within a phase run concurrently, bounded by a semaphore, and
//! are joined before the next phase begins. All state mutation happens here,
//! sequentially, after the join.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::elimination::{
    EliminationDecision, EliminationEvent, EliminationOutcome, EliminationPhase, EliminationPolicy,
};
use super::post_mortem::PostMortem;
use super::state::{ArenaState, Round, RoundPhase};
use crate::agents::agent::RoundOutcomeForAgent;
use crate::agents::{AgentId, AgentSnapshot, BallotFailure, Responder, Sampling};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult, ConfigError, InvariantViolation, ResponderError};
use crate::metrics::MetricsCollector;
use crate::observability::{ArenaEvent, EventSink, FailurePhase, Recovery, TerminationReason};
use crate::personality::PersonalityGenerator;
use crate::prompts::{PromptRef, PromptStore};
use crate::seed::derive_seed;
use crate::voting::{fallback_target, Ballot, Vote, VotingAggregator};

// ============================================================================
// Stop signal
// ============================================================================

/// External stop request, honoured at `RoundStart` and after `Scoring`.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of one call to [`ArenaController::run_round`].
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: Round,
    /// `None` when no elimination was due or a stop cut the round short.
    pub elimination: Option<EliminationOutcome>,
    /// A stop was observed after scoring; the elimination check did not run.
    pub stop_requested: bool,
}

/// Final position of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalStanding {
    pub agent: AgentSnapshot,
    pub score: u64,
    pub rounds_played: u64,
}

/// Outcome of a completed or stopped run.
#[derive(Debug, Clone, Serialize)]
pub struct ArenaSummary {
    pub rounds_completed: u64,
    pub termination: TerminationReason,
    pub eliminations: Vec<EliminationEvent>,
    pub skipped_eliminations: usize,
    /// Highest score first.
    pub final_standings: Vec<FinalStanding>,
}

// ============================================================================
// Controller
// ============================================================================

type CallResult<T, E> = (AgentId, Result<T, E>, Duration);

pub struct ArenaController {
    config: ArenaConfig,
    state: ArenaState,
    responder: Arc<dyn Responder>,
    prompts: Arc<dyn PromptStore>,
    sink: Arc<dyn EventSink>,
    aggregator: VotingAggregator,
    policy: EliminationPolicy,
    generator: PersonalityGenerator,
    limiter: Arc<Semaphore>,
    call_timeout: Duration,
    stop: StopHandle,
    metrics: MetricsCollector,
    eliminations: Vec<EliminationEvent>,
    skipped_eliminations: usize,
    announced: bool,
    terminated: bool,
}

impl ArenaController {
    /// Validates the configuration and builds the initial roster.
    ///
    /// # Errors
    ///
    /// `ConfigError` if any configuration rule fails, a scheduled prompt is
    /// missing from `prompts`, or the personality template is incomplete.
    pub fn new(
        config: ArenaConfig,
        responder: Arc<dyn Responder>,
        prompts: Arc<dyn PromptStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        config.validate_prompts(prompts.as_ref())?;

        let generator = PersonalityGenerator::new(config.random_seed);
        let state = ArenaState::initialize(
            config.num_agents,
            config.minimum_population,
            config.memory_window_size,
            &generator,
            &config.personality_template,
        )?;

        info!(
            model = %config.model_name,
            num_agents = config.num_agents,
            rounds_per_elimination = config.rounds_per_elimination,
            seed = config.random_seed,
            "Arena initialized"
        );
        for agent in state.roster() {
            debug!(agent_id = %agent.id(), slot = agent.slot(), personality = %agent.profile(), "Initial agent");
        }

        Ok(Self {
            aggregator: VotingAggregator::new(config.random_seed),
            policy: EliminationPolicy::new(config.rounds_per_elimination, config.minimum_population),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            generator,
            state,
            config,
            responder,
            prompts,
            sink,
            stop: StopHandle::new(),
            metrics: MetricsCollector::new(),
            eliminations: Vec::new(),
            skipped_eliminations: 0,
            announced: false,
            terminated: false,
        })
    }

    /// Shares an existing stop handle with this controller.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Overrides the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> &ArenaState {
        &self.state
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn eliminations(&self) -> &[EliminationEvent] {
        &self.eliminations
    }

    /// Runs rounds until `total_rounds` or a stop request.
    ///
    /// # Errors
    ///
    /// Any `InvariantViolation`, `PromptError` or `PersistenceError` aborts the
    /// run; an `ArenaTerminated` event is attempted first.
    pub async fn run(&mut self) -> ArenaResult<ArenaSummary> {
        if self.terminated {
            return Err(ArenaError::Terminated(self.state.round()));
        }

        match self.run_rounds().await {
            Ok(reason) => {
                self.finish(reason, None)?;
                Ok(self.summary(reason))
            }
            Err(err) => {
                error!(round = self.state.round(), error = %err, "Arena aborted");
                if let Err(emit_err) = self.finish(TerminationReason::Failed, Some(err.to_string())) {
                    error!(error = %emit_err, "Failed to record arena termination");
                }
                Err(err)
            }
        }
    }

    async fn run_rounds(&mut self) -> ArenaResult<TerminationReason> {
        self.announce()?;
        while self.state.round() < self.config.total_rounds {
            if self.stop.is_stopped() {
                info!(round = self.state.round(), "Stop requested; ending at round boundary");
                return Ok(TerminationReason::Stopped);
            }
            let report = self.run_round().await?;
            if report.stop_requested {
                return Ok(TerminationReason::Stopped);
            }
        }
        Ok(TerminationReason::Completed)
    }

    /// Runs exactly one round through every phase.
    pub async fn run_round(&mut self) -> ArenaResult<RoundReport> {
        if self.terminated {
            return Err(ArenaError::Terminated(self.state.round()));
        }
        self.announce()?;
        self.state.check_population()?;

        // RoundStart
        self.state.set_phase(RoundPhase::RoundStart);
        let round = self.state.begin_round();
        let prompt = PromptRef::scheduled(&self.config.prompts, round)
            .cloned()
            .ok_or_else(|| ConfigError::invalid("prompts", "no prompt scheduled"))?;
        let prompt_text = self.prompts.load_prompt(&prompt.name, prompt.version)?;
        let alive: BTreeSet<AgentId> = self.state.alive_ids();

        info!(round, prompt = %prompt, alive = alive.len(), "Round started");
        self.emit(ArenaEvent::round_started(
            round,
            prompt.clone(),
            prompt_text.clone(),
            alive.iter().copied().collect(),
        ))?;

        // Collecting
        self.state.set_phase(RoundPhase::Collecting);
        let (answers, abstentions) = self.collect(round, &prompt_text).await?;

        // Voting
        self.state.set_phase(RoundPhase::Voting);
        let votes = self.vote(round, &prompt_text, &answers, &alive).await?;
        let tally = self.aggregator.tally_votes(round, &votes, &alive)?;
        self.emit(ArenaEvent::vote_summary(round, tally.counts.clone(), tally.total_votes))?;

        // Scoring
        self.state.set_phase(RoundPhase::Scoring);
        let distribution = tally.distribution();
        let threshold = self.config.fallback_anomaly_threshold;
        let mut anomalies = Vec::new();
        for vote in &votes {
            let agent = self.state.agent_mut(vote.voter)?;
            agent.apply_round(RoundOutcomeForAgent {
                round,
                prompt: prompt_text.clone(),
                answer: answers.get(&vote.voter).cloned().unwrap_or_default(),
                abstained: abstentions.contains(&vote.voter),
                vote_target: vote.target,
                vote_was_fallback: vote.fallback,
                votes_received: tally.count(vote.voter),
                vote_distribution: distribution.clone(),
            })?;
            if threshold > 0 && agent.consecutive_fallbacks() == threshold {
                anomalies.push((vote.voter, agent.consecutive_fallbacks()));
            }
        }
        for (agent_id, consecutive) in anomalies {
            warn!(
                round,
                agent_id = %agent_id,
                consecutive_fallbacks = consecutive,
                "Agent keeps casting unusable ballots"
            );
            self.emit(ArenaEvent::fallback_anomaly(round, agent_id, consecutive, threshold))?;
        }

        let record = Round {
            index: round,
            prompt,
            prompt_text,
            responses: answers,
            abstentions,
            votes,
            tally,
        };
        let scores: BTreeMap<AgentId, u64> =
            self.state.alive().map(|a| (a.id(), a.score())).collect();
        self.emit(ArenaEvent::round_completed(
            round,
            scores,
            record.abstentions.len(),
            record.fallback_votes(),
        ))?;
        self.metrics.record_round(self.state.alive_count());
        info!(
            round,
            votes = record.tally.total_votes,
            abstentions = record.abstentions.len(),
            fallback_votes = record.fallback_votes(),
            "Round scored"
        );

        if self.stop.is_stopped() {
            info!(round, "Stop requested after scoring; skipping elimination check");
            return Ok(RoundReport {
                round: record,
                elimination: None,
                stop_requested: true,
            });
        }

        // EliminationCheck
        self.state.set_phase(RoundPhase::EliminationCheck);
        let elimination = self.check_elimination(round)?;
        self.state.check_population()?;

        Ok(RoundReport {
            round: record,
            elimination,
            stop_requested: false,
        })
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    /// Temperature plus a sampler seed unique to `(round, agent, call kind)`.
    fn sampling(&self, round: u64, agent_id: AgentId, kind: CallKind) -> Sampling {
        let seed = derive_seed(
            self.config.random_seed,
            "responder",
            &[round, agent_id.value(), kind as u64],
        );
        Sampling::new(self.config.temperature).with_seed(seed)
    }

    async fn collect(
        &self,
        round: u64,
        prompt_text: &str,
    ) -> ArenaResult<(BTreeMap<AgentId, String>, BTreeSet<AgentId>)> {
        let timeout = self.call_timeout;

        let calls = self.state.alive().map(|agent| {
            let limiter = Arc::clone(&self.limiter);
            let responder = Arc::clone(&self.responder);
            let sampling = self.sampling(round, agent.id(), CallKind::Answer);
            async move {
                let _permit = match limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err = ResponderError::RequestFailed(format!("worker pool closed: {}", e));
                        return (agent.id(), Err(err), Duration::ZERO);
                    }
                };
                let started = Instant::now();
                let result =
                    with_timeout(timeout, agent.respond(responder.as_ref(), prompt_text, sampling))
                        .await;
                (agent.id(), result, started.elapsed())
            }
        });
        let results: Vec<CallResult<String, ResponderError>> = join_all(calls).await;

        let mut answers = BTreeMap::new();
        let mut abstentions = BTreeSet::new();
        for (agent_id, result, elapsed) in results {
            let latency = elapsed.as_secs_f64();
            match result {
                Ok(answer) => {
                    self.metrics.record_responder_call("collecting", latency, true);
                    debug!(round, agent_id = %agent_id, chars = answer.len(), "Answer received");
                    self.emit(ArenaEvent::agent_responded(
                        round,
                        agent_id,
                        answer.clone(),
                        elapsed.as_millis() as u64,
                    ))?;
                    answers.insert(agent_id, answer);
                }
                Err(err) => {
                    self.metrics.record_responder_call("collecting", latency, false);
                    warn!(round, agent_id = %agent_id, error = %err, "Responder failed; recording abstention");
                    self.emit(ArenaEvent::agent_failed(
                        round,
                        agent_id,
                        FailurePhase::Collecting,
                        &err,
                        Recovery::Abstention,
                    ))?;
                    answers.insert(agent_id, String::new());
                    abstentions.insert(agent_id);
                }
            }
        }
        Ok((answers, abstentions))
    }

    async fn vote(
        &self,
        round: u64,
        prompt_text: &str,
        answers: &BTreeMap<AgentId, String>,
        alive: &BTreeSet<AgentId>,
    ) -> ArenaResult<Vec<Vote>> {
        let timeout = self.call_timeout;
        let master_seed = self.config.random_seed;
        let candidates: Vec<(AgentId, String)> =
            answers.iter().map(|(id, answer)| (*id, answer.clone())).collect();

        let calls = self.state.alive().map(|agent| {
            let limiter = Arc::clone(&self.limiter);
            let responder = Arc::clone(&self.responder);
            let ballot = Ballot::shuffled(master_seed, round, agent.id(), candidates.clone())
                .with_prompt(prompt_text);
            let sampling = self.sampling(round, agent.id(), CallKind::Ballot);
            async move {
                let _permit = match limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err = ResponderError::RequestFailed(format!("worker pool closed: {}", e));
                        return (agent.id(), Err(BallotFailure::from(err)), Duration::ZERO);
                    }
                };
                let started = Instant::now();
                let result =
                    with_timeout(timeout, agent.vote(responder.as_ref(), &ballot, sampling)).await;
                (agent.id(), result, started.elapsed())
            }
        });
        let results: Vec<CallResult<AgentId, BallotFailure>> = join_all(calls).await;

        let legal: Vec<AgentId> = alive.iter().copied().collect();
        let mut votes = Vec::with_capacity(results.len());
        for (voter, result, elapsed) in results {
            let latency = elapsed.as_secs_f64();
            let vote = match result {
                Ok(target) => {
                    self.metrics.record_responder_call("voting", latency, true);
                    Vote {
                        voter,
                        target,
                        fallback: false,
                    }
                }
                Err(failure) => {
                    match failure {
                        BallotFailure::Responder(_) => {
                            self.metrics.record_responder_call("voting", latency, false)
                        }
                        BallotFailure::Invalid(_) => {
                            self.metrics.record_responder_call("voting", latency, true);
                            self.metrics.record_invalid_ballot();
                        }
                    }
                    let target = fallback_target(master_seed, round, voter, &legal).ok_or(
                        InvariantViolation::PopulationOutOfBounds {
                            alive: legal.len(),
                            minimum: self.config.minimum_population,
                            capacity: self.state.capacity(),
                        },
                    )?;
                    warn!(
                        round,
                        agent_id = %voter,
                        error = %failure,
                        fallback_target = %target,
                        "Degraded vote: substituting seeded fallback target"
                    );
                    self.emit(ArenaEvent::agent_failed(
                        round,
                        voter,
                        FailurePhase::Voting,
                        &failure,
                        Recovery::FallbackVote,
                    ))?;
                    Vote {
                        voter,
                        target,
                        fallback: true,
                    }
                }
            };

            self.metrics.record_vote(vote.fallback);
            debug!(round, agent_id = %voter, target = %vote.target, fallback = vote.fallback, "Vote cast");
            self.emit(ArenaEvent::vote_cast(round, vote.voter, vote.target, vote.fallback))?;
            votes.push(vote);
        }
        Ok(votes)
    }

    fn check_elimination(&mut self, round: u64) -> ArenaResult<Option<EliminationOutcome>> {
        let since = self.state.rounds_since_last_elimination();
        if !self.policy.is_due(since) {
            debug!(round, rounds_since_last = since, "Elimination not due");
            return Ok(None);
        }

        self.state.set_elimination_phase(EliminationPhase::Eligible);
        self.state.set_elimination_phase(EliminationPhase::Selecting);
        let decision =
            self.policy
                .decide(&self.aggregator, round, since, &self.state.contenders())?;
        self.state.set_elimination_phase(EliminationPhase::CheckingFloor);

        let outcome = match decision {
            EliminationDecision::NotDue => None,
            EliminationDecision::Skip {
                alive,
                minimum,
                ranking,
            } => {
                self.state.set_elimination_phase(EliminationPhase::Skipped);
                let spared = ranking.lowest().map(|s| s.agent_id);
                info!(round, alive, minimum, "Elimination skipped: population at floor");
                self.emit(ArenaEvent::elimination_skipped(
                    round,
                    alive,
                    minimum,
                    spared,
                    ranking.decided_by,
                ))?;
                self.metrics.record_elimination("skipped");
                self.skipped_eliminations += 1;
                Some(EliminationOutcome::Skipped {
                    round,
                    alive,
                    minimum,
                    spared,
                })
            }
            EliminationDecision::Eliminate { ranking } => {
                self.state.set_elimination_phase(EliminationPhase::Eliminating);
                let lowest = ranking
                    .lowest()
                    .copied()
                    .ok_or(InvariantViolation::EmptyRanking { round })?;

                self.state.set_elimination_phase(EliminationPhase::Replacing);
                let retired = self.state.replace(
                    lowest.agent_id,
                    &self.generator,
                    &self.config.personality_template,
                )?;
                let replacement = self
                    .state
                    .roster()
                    .get(retired.slot())
                    .map(|a| a.snapshot())
                    .ok_or_else(|| InvariantViolation::AgentNotFound(retired.id().to_string()))?;

                let post_mortem = PostMortem::from_agent(&retired, round);
                let event = EliminationEvent {
                    round,
                    eliminated: retired.snapshot(),
                    final_score: retired.score(),
                    replacement,
                    tie_break: ranking.decided_by,
                    ranking: ranking.ids(),
                    post_mortem,
                };

                info!(
                    round,
                    agent_id = %event.eliminated.agent_id,
                    score = event.final_score,
                    tie_break = ?event.tie_break,
                    replacement = %event.replacement.agent_id,
                    generation = event.replacement.generation,
                    "Agent eliminated and replaced"
                );
                debug!(round, post_mortem = %event.post_mortem.summary(), "Post-mortem");

                self.emit(ArenaEvent::elimination_decided(event.clone()))?;
                self.metrics.record_elimination("eliminated");
                self.eliminations.push(event.clone());
                Some(EliminationOutcome::Eliminated(Box::new(event)))
            }
        };

        self.state.reset_elimination_counter();
        self.state.set_elimination_phase(EliminationPhase::Idle);
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Lifecycle helpers
    // ------------------------------------------------------------------------

    fn announce(&mut self) -> ArenaResult<()> {
        if self.announced {
            return Ok(());
        }
        self.emit(ArenaEvent::ArenaInitialized {
            model_name: self.config.model_name.clone(),
            master_seed: self.config.random_seed,
            num_agents: self.config.num_agents,
            rounds_per_elimination: self.config.rounds_per_elimination,
            minimum_population: self.config.minimum_population,
            total_rounds: self.config.total_rounds,
            roster: self.state.snapshots(),
            timestamp: chrono::Utc::now(),
        })?;
        self.metrics.set_alive_agents(self.state.alive_count());
        self.announced = true;
        Ok(())
    }

    fn finish(&mut self, reason: TerminationReason, message: Option<String>) -> ArenaResult<()> {
        self.state.set_phase(RoundPhase::Terminal);
        self.terminated = true;
        info!(rounds = self.state.round(), reason = %reason, eliminations = self.eliminations.len(), "Arena terminated");
        self.emit(ArenaEvent::arena_terminated(self.state.round(), reason, message))?;
        self.sink.flush()?;
        Ok(())
    }

    fn emit(&self, event: ArenaEvent) -> ArenaResult<()> {
        self.sink.emit(&event)?;
        Ok(())
    }

    fn summary(&self, termination: TerminationReason) -> ArenaSummary {
        let mut final_standings: Vec<FinalStanding> = self
            .state
            .alive()
            .map(|a| FinalStanding {
                agent: a.snapshot(),
                score: a.score(),
                rounds_played: a.rounds_played(),
            })
            .collect();
        final_standings.sort_by(|a, b| b.score.cmp(&a.score).then(a.agent.agent_id.cmp(&b.agent.agent_id)));

        ArenaSummary {
            rounds_completed: self.state.round(),
            termination,
            eliminations: self.eliminations.clone(),
            skipped_eliminations: self.skipped_eliminations,
            final_standings,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CallKind {
    Answer = 0,
    Ballot = 1,
}

/// Applies the per-call budget; an expired call becomes `ResponderError::Timeout`.
async fn with_timeout<T, E, F>(budget: Duration, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<ResponderError>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(ResponderError::Timeout {
            millis: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
        .into()),
    }
}
