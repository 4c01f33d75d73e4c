//! agent-arena: repeated vote-and-eliminate tournaments among LLM agents.
//!
//! Each agent wraps the same model with a seeded personality. Every round the
//! agents answer a shared prompt, vote for the best answer other than their
//! own, and accumulate the votes they receive. Every `rounds_per_elimination`
//! rounds the lowest scorer is retired and replaced by a fresh personality.

pub mod agents;
pub mod arena;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod observability;
pub mod personality;
pub mod prompts;
pub mod seed;
pub mod voting;

// Re-export commonly used types
pub use arena::{ArenaController, ArenaSummary, StopHandle};
pub use config::ArenaConfig;
pub use error::{
    ArenaError, ArenaResult, ConfigError, InvalidVoteError, InvariantViolation, LlmError,
    PersistenceError, PromptError, ResponderError,
};
