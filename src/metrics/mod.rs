//! Metrics module for Prometheus-based monitoring.
//!
//! Counts rounds, votes (direct vs. fallback), recovered agent failures and
//! elimination outcomes, and tracks responder latency and the alive
//! population.
//!
//! # Example
//!
//! ```ignore
//! use agent_arena::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! let collector = MetricsCollector::new();
//! collector.record_round(8);
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    AGENT_FAILURES_TOTAL, ALIVE_AGENTS, ELIMINATIONS_TOTAL, REGISTRY, RESPONDER_LATENCY,
    ROUNDS_TOTAL, VOTES_TOTAL,
};
