//! Command-line interface for agent-arena.
//!
//! Provides commands to run an arena, replay an event log and check that
//! the responder runtime serves the configured model.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
