//! Prometheus metrics registration and export.
//!
//! Defines the arena's metrics and the functions that initialize and export
//! them. Until [`init_metrics`] has run every recording call is a no-op.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so all statics come from one registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all arena metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Rounds closed (scored).
pub static ROUNDS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Votes counted, labeled by kind (`direct` or `fallback`).
pub static VOTES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Per-agent responder failures, labeled by phase.
pub static AGENT_FAILURES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Elimination checks, labeled by outcome (`eliminated` or `skipped`).
pub static ELIMINATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Responder call latency in seconds, labeled by phase.
pub static RESPONDER_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Agents currently alive on the roster.
pub static ALIVE_AGENTS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Safe to call more than once; later calls leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric cannot be created or registered.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let rounds_total = IntCounter::new("arena_rounds_total", "Total number of rounds scored")?;

    let votes_total = CounterVec::new(
        Opts::new("arena_votes_total", "Total votes counted"),
        &["kind"],
    )?;

    let agent_failures_total = CounterVec::new(
        Opts::new(
            "arena_agent_failures_total",
            "Responder failures recovered as abstention or fallback",
        ),
        &["phase"],
    )?;

    let eliminations_total = CounterVec::new(
        Opts::new("arena_eliminations_total", "Elimination checks by outcome"),
        &["outcome"],
    )?;

    let responder_latency = HistogramVec::new(
        HistogramOpts::new(
            "arena_responder_latency_seconds",
            "Responder call latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["phase"],
    )?;

    let alive_agents = Gauge::new("arena_alive_agents", "Agents currently alive")?;

    registry.register(Box::new(rounds_total.clone()))?;
    registry.register(Box::new(votes_total.clone()))?;
    registry.register(Box::new(agent_failures_total.clone()))?;
    registry.register(Box::new(eliminations_total.clone()))?;
    registry.register(Box::new(responder_latency.clone()))?;
    registry.register(Box::new(alive_agents.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = ROUNDS_TOTAL.set(rounds_total);
    let _ = VOTES_TOTAL.set(votes_total);
    let _ = AGENT_FAILURES_TOTAL.set(agent_failures_total);
    let _ = ELIMINATIONS_TOTAL.set(eliminations_total);
    let _ = RESPONDER_LATENCY.set(responder_latency);
    let _ = ALIVE_AGENTS.set(alive_agents);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics if the registry was never
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_init() {
        let _ = init_metrics();
        if let Some(counter) = ROUNDS_TOTAL.get() {
            counter.inc();
        }
        let text = export_metrics();
        assert!(!text.starts_with("# Error"));
        assert!(text.contains("arena_rounds_total"));
    }
}
