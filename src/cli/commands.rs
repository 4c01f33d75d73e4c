//! CLI command definitions for agent-arena.

use crate::agents::LlmResponder;
use crate::arena::{ArenaController, ArenaSummary};
use crate::config::{ArenaConfig, ConfigOverrides, DEFAULT_API_BASE};
use crate::llm::{LiteLlmClient, ModelCatalog};
use crate::metrics::{export_metrics, init_metrics};
use crate::observability::{EventSink, JsonlEventLog, NullEventSink, ReplayEngine};
use crate::prompts::PromptLibrary;
use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Default model served by a local Ollama runtime.
const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Vote-and-eliminate tournaments among personality-wrapped LLM agents.
#[derive(Parser)]
#[command(name = "agent-arena")]
#[command(about = "Run vote-and-eliminate tournaments among LLM agents")]
#[command(version)]
#[command(
    long_about = "agent-arena runs a population of LLM agents that share one model but carry different personalities.\n\nEach round every agent answers a prompt and votes for another agent's answer. Every N rounds the lowest scorer is replaced.\n\nExample usage:\n  agent-arena run --config arena.yaml --events ./runs/arena.jsonl"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run an arena from a configuration file.
    Run(RunArgs),

    /// Rebuild round summaries from a JSONL event log.
    Replay(ReplayArgs),

    /// Check that the responder runtime is reachable and serves the model.
    #[command(name = "check-responder", alias = "check")]
    CheckResponder(CheckResponderArgs),
}

/// Arguments for `agent-arena run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Arena configuration file (YAML).
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// Prompt library file (YAML). Defaults to the built-in prompt.
    #[arg(short = 'p', long)]
    pub prompts: Option<PathBuf>,

    /// Override the model name.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Override the number of agents.
    #[arg(short = 'n', long)]
    pub num_agents: Option<usize>,

    /// Override the number of rounds to run.
    #[arg(short = 'r', long)]
    pub rounds: Option<u64>,

    /// Override the master random seed.
    #[arg(short = 's', long)]
    pub seed: Option<u64>,

    /// Override the sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Override the responder API base URL.
    #[arg(long, env = "ARENA_API_BASE")]
    pub api_base: Option<String>,

    /// Write the event log to this JSONL file.
    #[arg(short = 'e', long)]
    pub events: Option<PathBuf>,

    /// Write Prometheus metrics to this file when the run ends.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model_name: self.model.clone(),
            num_agents: self.num_agents,
            total_rounds: self.rounds,
            random_seed: self.seed,
            temperature: self.temperature,
            api_base: self.api_base.clone(),
            event_log: self.events.clone(),
        }
    }
}

/// Arguments for `agent-arena replay`.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// JSONL event log written by `agent-arena run`.
    pub path: PathBuf,

    /// Only show this round.
    #[arg(short = 'r', long)]
    pub round: Option<u64>,
}

/// Arguments for `agent-arena check-responder`.
#[derive(Parser, Debug)]
pub struct CheckResponderArgs {
    /// Arena configuration file; supplies the API base and model.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Responder API base URL (overrides the config file).
    #[arg(long, env = "ARENA_API_BASE")]
    pub api_base: Option<String>,

    /// Model that must be available (overrides the config file).
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Output JSON report.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI args and run the command.
///
/// For control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_arena_command(args).await,
        Commands::Replay(args) => run_replay_command(args),
        Commands::CheckResponder(args) => run_check_responder_command(args).await,
    }
}

// ============================================================================
// Run
// ============================================================================

async fn run_arena_command(args: RunArgs) -> anyhow::Result<()> {
    let config = ArenaConfig::load(&args.config, &args.overrides())
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let prompts = match &args.prompts {
        Some(path) => PromptLibrary::load_file(path)
            .with_context(|| format!("Failed to load prompts {}", path.display()))?,
        None => PromptLibrary::builtin(),
    };

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Metrics registry unavailable");
    }

    let client = LiteLlmClient::from_config(&config.responder, &config.model_name)?;
    let mut responder = LlmResponder::new(Arc::new(client), config.model_name.clone());
    if let Some(max_tokens) = config.responder.max_tokens {
        responder = responder.with_max_tokens(max_tokens);
    }

    let sink: Arc<dyn EventSink> = match &config.event_log {
        Some(path) => {
            info!(path = %path.display(), "Writing event log");
            Arc::new(JsonlEventLog::create(path)?)
        }
        None => Arc::new(NullEventSink),
    };

    let mut controller =
        ArenaController::new(config, Arc::new(responder), Arc::new(prompts), sink)?;

    let stop = controller.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping at the next round boundary");
            stop.stop();
        }
    });

    let result = controller.run().await;

    if let Some(path) = &args.metrics_out {
        fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics {}", path.display()))?;
    }

    let summary = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ArenaSummary) {
    println!("\n=== Arena Results ===");
    println!("Rounds:        {}", summary.rounds_completed);
    println!("Termination:   {}", summary.termination);
    println!("Eliminations:  {}", summary.eliminations.len());
    println!("Skipped:       {}", summary.skipped_eliminations);

    if !summary.eliminations.is_empty() {
        println!("\nEliminated:");
        for e in &summary.eliminations {
            println!(
                "  round {:>3}: {} (score {}, {:?}) -> {}",
                e.round, e.eliminated.agent_id, e.final_score, e.tie_break, e.replacement.agent_id
            );
        }
    }

    println!("\nStandings:");
    for (rank, standing) in summary.final_standings.iter().enumerate() {
        println!(
            "  {:>2}. {} gen {} score {:>4}  {}",
            rank + 1,
            standing.agent.agent_id,
            standing.agent.generation,
            standing.score,
            standing.agent.profile
        );
    }
}

// ============================================================================
// Replay
// ============================================================================

fn run_replay_command(args: ReplayArgs) -> anyhow::Result<()> {
    let engine = ReplayEngine::from_file(&args.path)
        .with_context(|| format!("Failed to replay {}", args.path.display()))?;

    match args.round {
        Some(index) => {
            let round = engine
                .round(index)
                .with_context(|| format!("Round {} is not in the log", index))?;
            println!("{}", round.render());
        }
        None => {
            for round in engine.rounds() {
                println!("{}", round.render());
            }
            println!(
                "{} eliminations, termination: {}",
                engine.eliminations().len(),
                engine
                    .termination()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "none recorded".to_string())
            );
        }
    }
    Ok(())
}

// ============================================================================
// Responder health
// ============================================================================

impl CheckResponderArgs {
    /// Resolves `(api_base, model)`: flags, then the config file, then defaults.
    fn target(&self) -> anyhow::Result<(String, String)> {
        let from_file = match &self.config {
            Some(path) => {
                let config = ArenaConfig::load(path, &ConfigOverrides::default())
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
                Some((config.responder.api_base, config.model_name))
            }
            None => None,
        };
        let (file_base, file_model) = from_file.unzip();

        let api_base = self
            .api_base
            .clone()
            .or(file_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = self
            .model
            .clone()
            .or(file_model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok((api_base, model))
    }
}

async fn run_check_responder_command(args: CheckResponderArgs) -> anyhow::Result<()> {
    let (api_base, model) = args.target()?;
    let catalog = ModelCatalog::new(&api_base)?;
    let report = catalog.health_check(&model).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Responder:  {}", report.base_url);
        println!("Model:      {}", report.model);
        println!("Available:  {}", report.model_available);
        if !report.model_available {
            println!("Served models: {}", report.available_models.join(", "));
        }
    }

    if !report.is_healthy() {
        anyhow::bail!("model '{}' is not served by {}", model, report.base_url);
    }
    Ok(())
}
