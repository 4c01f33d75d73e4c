//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    AGENT_FAILURES_TOTAL, ALIVE_AGENTS, ELIMINATIONS_TOTAL, RESPONDER_LATENCY, ROUNDS_TOTAL,
    VOTES_TOTAL,
};

/// Records arena metrics with consistent labels.
///
/// Every method is a no-op until `init_metrics()` has been called, so the
/// controller can record unconditionally.
///
/// # Example
///
/// ```ignore
/// use agent_arena::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_vote(false);
/// collector.record_elimination("skipped");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one responder call for `phase` (`collecting` or `voting`).
    pub fn record_responder_call(&self, phase: &str, latency_secs: f64, success: bool) {
        if let Some(latency) = RESPONDER_LATENCY.get() {
            latency.with_label_values(&[phase]).observe(latency_secs);
        }

        if !success {
            if let Some(failures) = AGENT_FAILURES_TOTAL.get() {
                failures.with_label_values(&[phase]).inc();
            }
        }

        tracing::trace!(
            phase = phase,
            latency_secs = latency_secs,
            success = success,
            "Recorded responder call metric"
        );
    }

    /// Record a ballot rejected after a successful responder call.
    pub fn record_invalid_ballot(&self) {
        if let Some(failures) = AGENT_FAILURES_TOTAL.get() {
            failures.with_label_values(&["ballot"]).inc();
        }
    }

    /// Record one counted vote.
    pub fn record_vote(&self, fallback: bool) {
        let kind = if fallback { "fallback" } else { "direct" };
        if let Some(votes) = VOTES_TOTAL.get() {
            votes.with_label_values(&[kind]).inc();
        }
    }

    /// Record a scored round and the resulting alive population.
    pub fn record_round(&self, alive_agents: usize) {
        if let Some(rounds) = ROUNDS_TOTAL.get() {
            rounds.inc();
        }
        self.set_alive_agents(alive_agents);
    }

    /// Record an elimination check outcome (`eliminated` or `skipped`).
    pub fn record_elimination(&self, outcome: &str) {
        if let Some(eliminations) = ELIMINATIONS_TOTAL.get() {
            eliminations.with_label_values(&[outcome]).inc();
        }
        tracing::trace!(outcome = outcome, "Recorded elimination metric");
    }

    pub fn set_alive_agents(&self, count: usize) {
        if let Some(alive) = ALIVE_AGENTS.get() {
            alive.set(count as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_recording_shows_up_in_export() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();
        collector.record_responder_call("voting", 0.25, false);
        collector.record_vote(true);
        collector.record_elimination("eliminated");
        collector.record_round(7);

        let text = export_metrics();
        assert!(text.contains("arena_votes_total{kind=\"fallback\"}"));
        assert!(text.contains("arena_agent_failures_total{phase=\"voting\"}"));
        assert!(text.contains("arena_eliminations_total{outcome=\"eliminated\"}"));
        assert!(text.contains("arena_alive_agents"));
    }

    #[test]
    fn test_collector_never_panics() {
        let collector = MetricsCollector::default();
        collector.record_invalid_ballot();
        collector.set_alive_agents(3);
    }
}
