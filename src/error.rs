//! Error types for agent-arena operations.
//!
//! Defines error types for each subsystem:
//! - Configuration loading and validation (fatal before Init completes)
//! - Responder calls (per-agent, recovered as abstention or fallback)
//! - Vote protocol violations (per-vote, recovered via a seeded fallback)
//! - Structural invariant breaches (fatal, abort the run)
//! - Prompt library and event persistence
//! - LLM API interactions

use thiserror::Error;

/// Errors raised while loading or validating arena configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required config key: {0}")]
    MissingKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Personality template field '{0}' has no categories")]
    MissingTemplateField(String),

    #[error("Prompt '{name}' version {version} is scheduled but not in the prompt store")]
    UnknownPrompt { name: String, version: u32 },

    #[error("Failed to parse configuration '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from a single call to the external responder.
#[derive(Debug, Clone, Error)]
pub enum ResponderError {
    #[error("Responder call timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Malformed responder output: {0}")]
    Malformed(String),

    #[error("Responder request failed: {0}")]
    RequestFailed(String),
}

impl From<LlmError> for ResponderError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ParseError(msg) => ResponderError::Malformed(msg),
            other => ResponderError::RequestFailed(other.to_string()),
        }
    }
}

/// A vote that names an illegal target.
///
/// Always recovered by the controller with a deterministic fallback target.
#[derive(Debug, Clone, Error)]
pub enum InvalidVoteError {
    #[error("Agent '{voter}' returned a ballot with no candidate label: {excerpt:?}")]
    Unparseable { voter: String, excerpt: String },

    #[error("Agent '{voter}' voted for unknown candidate label '{label}'")]
    UnknownCandidate { voter: String, label: String },

    #[error("Agent '{voter}' named several candidates: {labels:?}")]
    Ambiguous { voter: String, labels: Vec<String> },

    #[error("Agent '{voter}' voted for itself")]
    SelfVote { voter: String },
}

/// An upstream bug: continuing would make the run unreproducible.
#[derive(Debug, Clone, Error)]
pub enum InvariantViolation {
    #[error("Round {round}: agent '{voter}' reached the aggregator with a self-vote")]
    SelfVote { round: u64, voter: String },

    #[error("Round {round}: vote by '{voter}' targets unknown agent '{target}'")]
    UnknownTarget {
        round: u64,
        voter: String,
        target: String,
    },

    #[error("Round {round}: ballot cast by '{voter}' who is not alive")]
    UnknownVoter { round: u64, voter: String },

    #[error("Round {round}: expected {expected} votes, got {actual}")]
    VoteCountMismatch {
        round: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Alive population {alive} outside bounds [{minimum}, {capacity}]")]
    PopulationOutOfBounds {
        alive: usize,
        minimum: usize,
        capacity: usize,
    },

    #[error("Agent '{owner}' was handed a memory entry belonging to '{foreign}'")]
    ForeignMemoryEntry { owner: String, foreign: String },

    #[error("No elimination candidates in round {round}")]
    EmptyRanking { round: u64 },

    #[error("Agent '{0}' is not on the roster")]
    AgentNotFound(String),
}

/// Errors from the prompt store.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt '{name}' version {version} not found")]
    NotFound { name: String, version: u32 },

    #[error("Prompt '{name}' version {version} already exists and is immutable")]
    Duplicate { name: String, version: u32 },

    #[error("Failed to parse prompt file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while writing or replaying the event log.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event log line {line} is not a valid event: {message}")]
    Malformed { line: usize, message: String },

    #[error("Event log is inconsistent: {0}")]
    Inconsistent(String),

    #[error("Event sink lock poisoned")]
    Poisoned,
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Fatal errors that abort an arena run.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Arena already terminated after round {0}")]
    Terminated(u64),
}

/// Result type alias for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
