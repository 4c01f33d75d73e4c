//! Seeded personality generation.
//!
//! `generate(template, seed)` is a pure function. Initial agents draw
//! independent seeds per slot; replacements use a seed a small, bounded
//! distance away from the eliminated agent's seed. No traits are inherited
//! from the eliminated agent.

use rand::prelude::*;

use super::{PersonalityProfile, PersonalityTemplate};
use crate::error::ConfigError;
use crate::seed::{derive_seed, seeded_rng};

/// Maximum distance between an eliminated agent's seed and its successor's.
pub const REPLACEMENT_SEED_RADIUS: u64 = 16;

/// Bound on re-draws when a successor would duplicate its predecessor.
const MAX_SUCCESSOR_REDRAWS: u64 = 32;

/// Generates personalities from the arena's master seed.
#[derive(Debug, Clone, Copy)]
pub struct PersonalityGenerator {
    master_seed: u64,
}

impl PersonalityGenerator {
    /// Creates a generator bound to a master seed.
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Produces a profile from a template and a seed.
    ///
    /// The same `(template, seed)` pair always yields the same profile.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingTemplateField` if any trait has no categories.
    pub fn generate(
        template: &PersonalityTemplate,
        seed: u64,
    ) -> Result<PersonalityProfile, ConfigError> {
        template.validate()?;
        let mut rng = seeded_rng(seed);

        Ok(PersonalityProfile {
            communication_style: template.communication_styles
                [rng.random_range(0..template.communication_styles.len())],
            ethical_stance: template.ethical_stances
                [rng.random_range(0..template.ethical_stances.len())],
            social_strategy: template.social_strategies
                [rng.random_range(0..template.social_strategies.len())],
            risk_tolerance: template.risk_tolerances
                [rng.random_range(0..template.risk_tolerances.len())],
        })
    }

    /// Independent seed for the initial occupant of a roster slot.
    pub fn initial_seed(&self, slot: usize) -> u64 {
        derive_seed(self.master_seed, "personality/init", &[slot as u64])
    }

    /// Seed for a replacement: a bounded perturbation of the predecessor's seed.
    ///
    /// The offset is in `1..=REPLACEMENT_SEED_RADIUS` and depends only on the
    /// master seed and `(generation, slot, round)`.
    pub fn replacement_seed(
        &self,
        previous_seed: u64,
        generation: u32,
        slot: usize,
        round: u64,
    ) -> u64 {
        let draw = derive_seed(
            self.master_seed,
            "personality/replace",
            &[generation as u64, slot as u64, round],
        );
        previous_seed.wrapping_add(1 + draw % REPLACEMENT_SEED_RADIUS)
    }

    /// Generates the initial `(seed, profile)` for a slot.
    pub fn initial(
        &self,
        template: &PersonalityTemplate,
        slot: usize,
    ) -> Result<(u64, PersonalityProfile), ConfigError> {
        let seed = self.initial_seed(slot);
        Ok((seed, Self::generate(template, seed)?))
    }

    /// Generates the successor `(seed, profile)` for an eliminated agent.
    ///
    /// `generation` is the successor's generation number. If the nearby seed
    /// reproduces the predecessor's profile exactly, the seed is stepped
    /// forward (deterministically) until it does not, as long as the template
    /// allows more than one profile.
    pub fn successor(
        &self,
        template: &PersonalityTemplate,
        predecessor: &PersonalityProfile,
        previous_seed: u64,
        generation: u32,
        slot: usize,
        round: u64,
    ) -> Result<(u64, PersonalityProfile), ConfigError> {
        let mut seed = self.replacement_seed(previous_seed, generation, slot, round);
        let mut profile = Self::generate(template, seed)?;

        if template.profile_space() > 1 {
            for _ in 0..MAX_SUCCESSOR_REDRAWS {
                if profile != *predecessor {
                    break;
                }
                seed = seed.wrapping_add(1);
                profile = Self::generate(template, seed)?;
            }
        }

        Ok((seed, profile))
    }
}
