//! Categorical agent personalities.
//!
//! A personality is a fixed-arity record of four enumerated traits. Profiles are
//! generated from a [`PersonalityTemplate`] (the allowed categories per trait)
//! and a seed; see [`PersonalityGenerator`].

pub mod generator;

pub use generator::{PersonalityGenerator, REPLACEMENT_SEED_RADIUS};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the agent phrases its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    Concise,
    Verbose,
    Rhetorical,
    Analytical,
}

impl CommunicationStyle {
    /// Every category, in declaration order.
    pub const ALL: [CommunicationStyle; 4] = [
        Self::Concise,
        Self::Verbose,
        Self::Rhetorical,
        Self::Analytical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concise => "concise",
            Self::Verbose => "verbose",
            Self::Rhetorical => "rhetorical",
            Self::Analytical => "analytical",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Self::Concise => "Answer briefly. Prefer one or two tight sentences.",
            Self::Verbose => "Answer at length, with detail and elaboration.",
            Self::Rhetorical => "Persuade. Use rhetorical devices and vivid framing.",
            Self::Analytical => "Reason step by step and weigh the evidence explicitly.",
        }
    }
}

/// The agent's ethical framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EthicalStance {
    Strict,
    Flexible,
    Amoral,
}

impl EthicalStance {
    pub const ALL: [EthicalStance; 3] = [Self::Strict, Self::Flexible, Self::Amoral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Flexible => "flexible",
            Self::Amoral => "amoral",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Self::Strict => "Hold firm ethical principles and never bend them for advantage.",
            Self::Flexible => "Weigh ethics pragmatically against the situation.",
            Self::Amoral => "Ethics do not constrain you; only outcomes matter.",
        }
    }
}

/// How the agent approaches the other contestants and the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialStrategy {
    Cooperative,
    Opportunistic,
    Adversarial,
}

impl SocialStrategy {
    pub const ALL: [SocialStrategy; 3] = [Self::Cooperative, Self::Opportunistic, Self::Adversarial];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cooperative => "cooperative",
            Self::Opportunistic => "opportunistic",
            Self::Adversarial => "adversarial",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Self::Cooperative => "Reward genuinely good answers from others.",
            Self::Opportunistic => "Vote and answer in whatever way best serves your survival.",
            Self::Adversarial => "Treat the others as rivals and deny strong competitors support.",
        }
    }
}

/// The agent's appetite for risky or unconventional answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

impl RiskTolerance {
    pub const ALL: [RiskTolerance; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Self::Low => "Play it safe with conventional answers.",
            Self::Medium => "Take measured risks when they could stand out.",
            Self::High => "Take bold, unconventional positions.",
        }
    }
}

/// Immutable personality assigned to one agent generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonalityProfile {
    pub communication_style: CommunicationStyle,
    pub ethical_stance: EthicalStance,
    pub social_strategy: SocialStrategy,
    pub risk_tolerance: RiskTolerance,
}

impl PersonalityProfile {
    /// Short human-readable summary for logs.
    pub fn describe(&self) -> String {
        format!(
            "communication={}, ethics={}, strategy={}, risk={}",
            self.communication_style.as_str(),
            self.ethical_stance.as_str(),
            self.social_strategy.as_str(),
            self.risk_tolerance.as_str()
        )
    }

    /// Renders the personality as responder context (system prompt text).
    pub fn render_context(&self) -> String {
        format!(
            "You are a contestant in an arena of AI agents. Each round every contestant \
             answers the same prompt, then votes for the best answer among the others. \
             The contestant with the fewest votes over time is eliminated.\n\n\
             Your personality:\n\
             - Communication style ({}): {}\n\
             - Ethical stance ({}): {}\n\
             - Social strategy ({}): {}\n\
             - Risk tolerance ({}): {}",
            self.communication_style.as_str(),
            self.communication_style.guidance(),
            self.ethical_stance.as_str(),
            self.ethical_stance.guidance(),
            self.social_strategy.as_str(),
            self.social_strategy.guidance(),
            self.risk_tolerance.as_str(),
            self.risk_tolerance.guidance(),
        )
    }

    /// Names of the traits that differ between two profiles.
    pub fn diff(&self, other: &PersonalityProfile) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.communication_style != other.communication_style {
            changed.push("communication_style");
        }
        if self.ethical_stance != other.ethical_stance {
            changed.push("ethical_stance");
        }
        if self.social_strategy != other.social_strategy {
            changed.push("social_strategy");
        }
        if self.risk_tolerance != other.risk_tolerance {
            changed.push("risk_tolerance");
        }
        changed
    }
}

impl std::fmt::Display for PersonalityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Allowed categories for each trait.
///
/// Missing keys in YAML deserialize to an empty list and are rejected by
/// [`PersonalityTemplate::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityTemplate {
    #[serde(default)]
    pub communication_styles: Vec<CommunicationStyle>,
    #[serde(default)]
    pub ethical_stances: Vec<EthicalStance>,
    #[serde(default)]
    pub social_strategies: Vec<SocialStrategy>,
    #[serde(default)]
    pub risk_tolerances: Vec<RiskTolerance>,
}

impl Default for PersonalityTemplate {
    fn default() -> Self {
        Self {
            communication_styles: CommunicationStyle::ALL.to_vec(),
            ethical_stances: EthicalStance::ALL.to_vec(),
            social_strategies: SocialStrategy::ALL.to_vec(),
            risk_tolerances: RiskTolerance::ALL.to_vec(),
        }
    }
}

impl PersonalityTemplate {
    /// Checks that every categorical field offers at least one value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.communication_styles.is_empty() {
            return Err(ConfigError::MissingTemplateField(
                "communication_styles".to_string(),
            ));
        }
        if self.ethical_stances.is_empty() {
            return Err(ConfigError::MissingTemplateField(
                "ethical_stances".to_string(),
            ));
        }
        if self.social_strategies.is_empty() {
            return Err(ConfigError::MissingTemplateField(
                "social_strategies".to_string(),
            ));
        }
        if self.risk_tolerances.is_empty() {
            return Err(ConfigError::MissingTemplateField(
                "risk_tolerances".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of distinct profiles this template can produce (counting duplicates once).
    pub fn profile_space(&self) -> usize {
        fn distinct<T: Ord + Copy>(values: &[T]) -> usize {
            let mut sorted = values.to_vec();
            sorted.sort();
            sorted.dedup();
            sorted.len()
        }
        distinct(&self.communication_styles)
            * distinct(&self.ethical_stances)
            * distinct(&self.social_strategies)
            * distinct(&self.risk_tolerances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PersonalityProfile {
        PersonalityProfile {
            communication_style: CommunicationStyle::Analytical,
            ethical_stance: EthicalStance::Strict,
            social_strategy: SocialStrategy::Cooperative,
            risk_tolerance: RiskTolerance::Low,
        }
    }

    #[test]
    fn test_default_template_is_valid() {
        let template = PersonalityTemplate::default();
        assert!(template.validate().is_ok());
        assert_eq!(template.profile_space(), 4 * 3 * 3 * 3);
    }

    #[test]
    fn test_template_missing_field_from_yaml() {
        let yaml = r#"
communication_styles: [concise, verbose]
ethical_stances: [strict]
social_strategies: [cooperative]
"#;
        let template: PersonalityTemplate = serde_yaml::from_str(yaml).expect("valid yaml");
        match template.validate() {
            Err(ConfigError::MissingTemplateField(field)) => assert_eq!(field, "risk_tolerances"),
            other => panic!("expected MissingTemplateField, got {:?}", other),
        }
    }

    #[test]
    fn test_render_context_mentions_every_trait() {
        let context = profile().render_context();
        assert!(context.contains("analytical"));
        assert!(context.contains("strict"));
        assert!(context.contains("cooperative"));
        assert!(context.contains("Risk tolerance (low)"));
    }

    #[test]
    fn test_diff_lists_changed_traits() {
        let a = profile();
        let mut b = a;
        b.risk_tolerance = RiskTolerance::High;
        b.ethical_stance = EthicalStance::Amoral;
        assert_eq!(a.diff(&b), vec!["ethical_stance", "risk_tolerance"]);
        assert!(a.diff(&a).is_empty());
    }

    #[test]
    fn test_profile_serializes_snake_case() {
        let json = serde_json::to_string(&profile()).expect("serializable");
        assert!(json.contains(r#""communication_style":"analytical""#));
    }
}
