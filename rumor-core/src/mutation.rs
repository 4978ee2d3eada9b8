//! Mutation Generator: the telephone-game effect.
//!
//! Each retelling runs a fixed sequence of independent, probabilistic text
//! transformations. Two are open to every listener (uncertainty, location
//! vagueness); two are gated by personality (`dramatic`, `careful`).
//! The generator only rewrites text and never touches believability.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::{LocationSwap, MutationConfig};
use crate::lineage::{MutationMetadata, Transformation};
use crate::types::ReceiverPersonality;

/// The new wording plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// Mutated text.
    pub text: String,
    /// Which rules fired, and the text they started from.
    pub metadata: MutationMetadata,
}

/// Produces retold wordings from the configured phrase tables.
#[derive(Debug, Clone)]
pub struct MutationGenerator {
    config: MutationConfig,
}

impl MutationGenerator {
    /// Create a generator from its configuration.
    #[must_use]
    pub fn new(config: MutationConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Retell `source` as heard by a listener with `personality`.
    ///
    /// If no rule fires, an uncertainty phrase is applied anyway so the new
    /// variant always differs from its parent.
    pub fn generate<R: Rng>(
        &self,
        source: &str,
        personality: &ReceiverPersonality,
        rng: &mut R,
    ) -> MutationOutcome {
        let cfg = &self.config;
        let mut text = source.to_string();
        let mut applied = Vec::new();

        if roll(rng, cfg.uncertainty_chance) {
            if let Some(phrase) = cfg.uncertainty_phrases.choose(rng) {
                text = prefix(phrase, &text);
                applied.push(Transformation::Uncertainty);
            }
        }

        if roll(rng, cfg.location_chance) {
            if let Some(vaguer) = blur_location(&text, &cfg.location_swaps) {
                text = vaguer;
                applied.push(Transformation::LocationVagueness);
            }
        }

        if personality.dramatic && roll(rng, cfg.intensity_chance) {
            if let Some(phrase) = cfg.intensity_phrases.choose(rng) {
                text = prefix(phrase, &text);
                applied.push(Transformation::Intensity);
            }
        }

        if personality.careful && roll(rng, cfg.hedging_chance) {
            if let Some(phrase) = cfg.hedging_phrases.choose(rng) {
                text = prefix(phrase, &text);
                applied.push(Transformation::Hedging);
            }
        }

        if applied.is_empty() {
            if let Some(phrase) = cfg.uncertainty_phrases.choose(rng) {
                text = prefix(phrase, &text);
                applied.push(Transformation::Uncertainty);
            }
        }

        MutationOutcome {
            text,
            metadata: MutationMetadata {
                transformations: applied,
                original_text: source.to_string(),
                extra: BTreeMap::new(),
            },
        }
    }
}

impl Default for MutationGenerator {
    fn default() -> Self {
        Self::new(MutationConfig::default())
    }
}

/// Leading words that are lowered when a phrase is put in front of them.
const LEADING_WORDS: [&str; 7] = ["The", "A", "An", "This", "That", "Someone", "There"];

/// Put `phrase` in front of `text`, lowering a leading article.
fn prefix(phrase: &str, text: &str) -> String {
    match text.split_once(' ') {
        Some((first, rest)) if LEADING_WORDS.contains(&first) => {
            format!("{phrase} {} {rest}", first.to_lowercase())
        }
        _ => format!("{phrase} {text}"),
    }
}

fn roll<R: Rng>(rng: &mut R, chance: f64) -> bool {
    rng.gen_bool(chance.clamp(0.0, 1.0))
}

/// Replace the first whole-word occurrence of the first matching location
/// preposition. Returns `None` when nothing matches.
fn blur_location(text: &str, swaps: &[LocationSwap]) -> Option<String> {
    swaps.iter().find_map(|swap| {
        find_word(text, &swap.from).map(|start| {
            let end = start + swap.from.len();
            format!("{}{}{}", &text[..start], swap.to, &text[end..])
        })
    })
}

/// Byte offset of the first occurrence of `word` bounded by non-alphanumerics.
fn find_word(text: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    text.match_indices(word).map(|(i, _)| i).find(|&start| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        before.is_none_or(|c| !c.is_alphanumeric()) && after.is_none_or(|c| !c.is_alphanumeric())
    })
}
