//! Arena configuration.
//!
//! Loaded from YAML. `model_name`, `num_agents`, `rounds_per_elimination`,
//! `temperature` and `random_seed` are required; everything else has a
//! default. CLI overrides are applied before required keys are checked, so a
//! flag can supply a key the file omits.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agents::DEFAULT_MEMORY_WINDOW;
use crate::error::ConfigError;
use crate::personality::PersonalityTemplate;
use crate::prompts::{PromptRef, PromptStore};

/// Smallest population the arena can run with.
pub const MIN_POPULATION_FLOOR: usize = 3;

pub const DEFAULT_MINIMUM_POPULATION: usize = 3;
pub const DEFAULT_TOTAL_ROUNDS: u64 = 10;
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FALLBACK_ANOMALY_THRESHOLD: u32 = 3;
pub const DEFAULT_API_BASE: &str = "http://localhost:11434/v1";

/// Where responder calls go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Completion token budget per call; the responder default when unset.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            max_tokens: None,
        }
    }
}

/// Values supplied on the command line, applied over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub model_name: Option<String>,
    pub num_agents: Option<usize>,
    pub total_rounds: Option<u64>,
    pub random_seed: Option<u64>,
    pub temperature: Option<f64>,
    pub api_base: Option<String>,
    pub event_log: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Configuration file as written, before required keys are enforced.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    model_name: Option<String>,
    num_agents: Option<usize>,
    rounds_per_elimination: Option<u64>,
    temperature: Option<f64>,
    random_seed: Option<u64>,
    memory_window_size: Option<usize>,
    minimum_population: Option<usize>,
    total_rounds: Option<u64>,
    max_concurrent_calls: Option<usize>,
    call_timeout_secs: Option<u64>,
    fallback_anomaly_threshold: Option<u32>,
    prompts: Option<Vec<PromptRef>>,
    personality_template: Option<PersonalityTemplate>,
    responder: Option<ResponderConfig>,
    event_log: Option<PathBuf>,
}

impl RawConfig {
    fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(model) = &overrides.model_name {
            self.model_name = Some(model.clone());
        }
        if let Some(n) = overrides.num_agents {
            self.num_agents = Some(n);
        }
        if let Some(rounds) = overrides.total_rounds {
            self.total_rounds = Some(rounds);
        }
        if let Some(seed) = overrides.random_seed {
            self.random_seed = Some(seed);
        }
        if let Some(t) = overrides.temperature {
            self.temperature = Some(t);
        }
        if let Some(base) = &overrides.api_base {
            self.responder
                .get_or_insert_with(ResponderConfig::default)
                .api_base = base.clone();
        }
        if let Some(path) = &overrides.event_log {
            self.event_log = Some(path.clone());
        }
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

impl TryFrom<RawConfig> for ArenaConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            model_name: required(raw.model_name, "model_name")?,
            num_agents: required(raw.num_agents, "num_agents")?,
            rounds_per_elimination: required(raw.rounds_per_elimination, "rounds_per_elimination")?,
            temperature: required(raw.temperature, "temperature")?,
            random_seed: required(raw.random_seed, "random_seed")?,
            memory_window_size: raw.memory_window_size.unwrap_or(DEFAULT_MEMORY_WINDOW),
            minimum_population: raw.minimum_population.unwrap_or(DEFAULT_MINIMUM_POPULATION),
            total_rounds: raw.total_rounds.unwrap_or(DEFAULT_TOTAL_ROUNDS),
            max_concurrent_calls: raw.max_concurrent_calls.unwrap_or(DEFAULT_MAX_CONCURRENT_CALLS),
            call_timeout_secs: raw.call_timeout_secs.unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
            fallback_anomaly_threshold: raw
                .fallback_anomaly_threshold
                .unwrap_or(DEFAULT_FALLBACK_ANOMALY_THRESHOLD),
            prompts: raw.prompts.unwrap_or_else(|| vec![PromptRef::default()]),
            personality_template: raw.personality_template.unwrap_or_default(),
            responder: raw.responder.unwrap_or_default(),
            event_log: raw.event_log,
        })
    }
}

/// Validated arena configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaConfig {
    pub model_name: String,
    pub num_agents: usize,
    pub rounds_per_elimination: u64,
    pub temperature: f64,
    pub random_seed: u64,
    pub memory_window_size: usize,
    pub minimum_population: usize,
    pub total_rounds: u64,
    pub max_concurrent_calls: usize,
    pub call_timeout_secs: u64,
    pub fallback_anomaly_threshold: u32,
    /// Prompt schedule, rotated by round index.
    pub prompts: Vec<PromptRef>,
    pub personality_template: PersonalityTemplate,
    pub responder: ResponderConfig,
    pub event_log: Option<PathBuf>,
}

impl ArenaConfig {
    /// Creates a configuration from the required values, with defaults for
    /// the rest.
    pub fn new(
        model_name: impl Into<String>,
        num_agents: usize,
        rounds_per_elimination: u64,
        temperature: f64,
        random_seed: u64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            num_agents,
            rounds_per_elimination,
            temperature,
            random_seed,
            memory_window_size: DEFAULT_MEMORY_WINDOW,
            minimum_population: DEFAULT_MINIMUM_POPULATION,
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            fallback_anomaly_threshold: DEFAULT_FALLBACK_ANOMALY_THRESHOLD,
            prompts: vec![PromptRef::default()],
            personality_template: PersonalityTemplate::default(),
            responder: ResponderConfig::default(),
            event_log: None,
        }
    }

    /// Loads, overrides and validates a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content, &path.display().to_string(), overrides)
    }

    /// Parses, overrides and validates YAML; `origin` names the source in errors.
    pub fn from_yaml(
        content: &str,
        origin: &str,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: origin.to_string(),
                message: e.to_string(),
            })?
        };
        raw.apply(overrides);

        let config = Self::try_from(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_total_rounds(mut self, rounds: u64) -> Self {
        self.total_rounds = rounds;
        self
    }

    pub fn with_minimum_population(mut self, minimum: usize) -> Self {
        self.minimum_population = minimum;
        self
    }

    pub fn with_memory_window(mut self, size: usize) -> Self {
        self.memory_window_size = size;
        self
    }

    pub fn with_max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit;
        self
    }

    pub fn with_call_timeout_secs(mut self, seconds: u64) -> Self {
        self.call_timeout_secs = seconds;
        self
    }

    pub fn with_fallback_anomaly_threshold(mut self, threshold: u32) -> Self {
        self.fallback_anomaly_threshold = threshold;
        self
    }

    pub fn with_prompts(mut self, prompts: Vec<PromptRef>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_personality_template(mut self, template: PersonalityTemplate) -> Self {
        self.personality_template = template;
        self
    }

    pub fn with_responder(mut self, responder: ResponderConfig) -> Self {
        self.responder = responder;
        self
    }

    /// Checks every value rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::invalid("model_name", "must not be empty"));
        }
        if self.minimum_population < MIN_POPULATION_FLOOR {
            return Err(ConfigError::invalid(
                "minimum_population",
                format!("must be at least {}", MIN_POPULATION_FLOOR),
            ));
        }
        if self.num_agents < self.minimum_population {
            return Err(ConfigError::invalid(
                "num_agents",
                format!(
                    "must be at least minimum_population ({}), got {}",
                    self.minimum_population, self.num_agents
                ),
            ));
        }
        if self.rounds_per_elimination < 1 {
            return Err(ConfigError::invalid("rounds_per_elimination", "must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid(
                "temperature",
                format!("must be within 0.0..=2.0, got {}", self.temperature),
            ));
        }
        if self.memory_window_size < 1 {
            return Err(ConfigError::invalid("memory_window_size", "must be at least 1"));
        }
        if self.total_rounds < 1 {
            return Err(ConfigError::invalid("total_rounds", "must be at least 1"));
        }
        if self.max_concurrent_calls < 1 {
            return Err(ConfigError::invalid("max_concurrent_calls", "must be at least 1"));
        }
        if self.call_timeout_secs < 1 {
            return Err(ConfigError::invalid("call_timeout_secs", "must be at least 1"));
        }
        if self.responder.max_tokens == Some(0) {
            return Err(ConfigError::invalid("responder.max_tokens", "must be at least 1"));
        }
        if self.prompts.is_empty() {
            return Err(ConfigError::invalid("prompts", "at least one prompt must be scheduled"));
        }
        self.personality_template.validate()?;
        Ok(())
    }

    /// Checks that every scheduled prompt exists in `store`.
    pub fn validate_prompts(&self, store: &dyn PromptStore) -> Result<(), ConfigError> {
        for prompt in &self.prompts {
            if !store.contains(prompt) {
                return Err(ConfigError::UnknownPrompt {
                    name: prompt.name.clone(),
                    version: prompt.version,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptLibrary;
    use std::io::Write;

    const MINIMAL: &str = r#"
model_name: llama3.1:8b
num_agents: 8
rounds_per_elimination: 2
temperature: 0.7
random_seed: 42
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config =
            ArenaConfig::from_yaml(MINIMAL, "inline", &ConfigOverrides::default()).expect("valid");
        assert_eq!(config.num_agents, 8);
        assert_eq!(config.memory_window_size, 5);
        assert_eq!(config.minimum_population, 3);
        assert_eq!(config.total_rounds, 10);
        assert_eq!(config.prompts, vec![PromptRef::default()]);
        assert_eq!(config.responder.api_base, DEFAULT_API_BASE);
        assert_eq!(config.responder.max_tokens, None);
        assert!(config.event_log.is_none());
    }

    #[test]
    fn test_responder_token_budget() {
        let yaml = format!("{}responder:\n  max_tokens: 256\n", MINIMAL);
        let config =
            ArenaConfig::from_yaml(&yaml, "inline", &ConfigOverrides::default()).expect("valid");
        assert_eq!(config.responder.max_tokens, Some(256));
        assert_eq!(config.responder.api_base, DEFAULT_API_BASE);

        let zero = ArenaConfig::new("m", 5, 1, 0.5, 1).with_responder(ResponderConfig {
            max_tokens: Some(0),
            ..ResponderConfig::default()
        });
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "responder.max_tokens"
        ));
    }

    #[test]
    fn test_missing_required_key() {
        let yaml = "model_name: m\nnum_agents: 5\ntemperature: 0.5\nrandom_seed: 1\n";
        match ArenaConfig::from_yaml(yaml, "inline", &ConfigOverrides::default()) {
            Err(ConfigError::MissingKey(key)) => assert_eq!(key, "rounds_per_elimination"),
            other => panic!("expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_override_supplies_missing_key() {
        let yaml = "model_name: m\nnum_agents: 5\nrounds_per_elimination: 1\ntemperature: 0.5\n";
        let overrides = ConfigOverrides {
            random_seed: Some(9),
            total_rounds: Some(3),
            ..ConfigOverrides::default()
        };
        let config = ArenaConfig::from_yaml(yaml, "inline", &overrides).expect("valid");
        assert_eq!(config.random_seed, 9);
        assert_eq!(config.total_rounds, 3);
    }

    #[test]
    fn test_rule_violations() {
        let too_few = ArenaConfig::new("m", 2, 1, 0.5, 1);
        assert!(matches!(
            too_few.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "num_agents"
        ));

        let no_cadence = ArenaConfig::new("m", 5, 0, 0.5, 1);
        assert!(no_cadence.validate().is_err());

        let hot = ArenaConfig::new("m", 5, 1, 3.5, 1);
        assert!(matches!(
            hot.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "temperature"
        ));

        let low_floor = ArenaConfig::new("m", 5, 1, 0.5, 1).with_minimum_population(2);
        assert!(low_floor.validate().is_err());
    }

    #[test]
    fn test_wrong_type_and_unknown_key_are_parse_errors() {
        let yaml = format!("{}num_agent: 4\n", MINIMAL);
        assert!(matches!(
            ArenaConfig::from_yaml(&yaml, "typo.yaml", &ConfigOverrides::default()),
            Err(ConfigError::ParseError { .. })
        ));

        let yaml = MINIMAL.replace("random_seed: 42", "random_seed: forty-two");
        assert!(matches!(
            ArenaConfig::from_yaml(&yaml, "types.yaml", &ConfigOverrides::default()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_incomplete_personality_template() {
        let yaml = format!(
            "{}personality_template:\n  communication_styles: [concise]\n  ethical_stances: [strict]\n  social_strategies: [cooperative]\n",
            MINIMAL
        );
        assert!(matches!(
            ArenaConfig::from_yaml(&yaml, "inline", &ConfigOverrides::default()),
            Err(ConfigError::MissingTemplateField(_))
        ));
    }

    #[test]
    fn test_load_file_and_prompt_validation() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "{}prompts:\n  - {{name: default, version: 1}}\n  - {{name: debate, version: 3}}\n",
            MINIMAL
        )
        .expect("write");

        let config = ArenaConfig::load(file.path(), &ConfigOverrides::default()).expect("valid");
        assert_eq!(config.prompts.len(), 2);

        let library = PromptLibrary::builtin();
        assert!(matches!(
            config.validate_prompts(&library),
            Err(ConfigError::UnknownPrompt { ref name, version: 3 }) if name == "debate"
        ));

        let library = library.with_prompt("debate", 3, "Debate!").expect("new prompt");
        assert!(config.validate_prompts(&library).is_ok());
    }
}
