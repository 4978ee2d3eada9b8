//! Configuration for the rumor engine.
//!
//! Maps directly to `rumor.toml`. Every field has a default, so an empty
//! file (or no file at all) yields the standard tuning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RumorError};
use crate::types::Severity;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RumorConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Belief calculator tuning.
    #[serde(default)]
    pub belief: BeliefConfig,
    /// Mutation generator tuning and phrase tables.
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Field validation limits.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Read-through cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl RumorConfig {
    /// Load configuration from a TOML string and validate it.
    ///
    /// # Errors
    /// Returns `RumorError::Config` if the TOML is invalid or the tuning is
    /// inconsistent.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| RumorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    /// Returns `RumorError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.belief.validate()?;
        self.mutation.validate()?;
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(RumorError::Config("cache.capacity must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seed for the service's random source. `None` seeds from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            rng_seed: None,
        }
    }
}

/// Per-severity multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityTuning {
    /// Scales time decay (higher forgets faster).
    pub decay_factor: f64,
    /// Scales mutation chance.
    pub mutation_factor: f64,
    /// Contribution of this severity to the impact score (0.0–1.0).
    pub impact_score: f64,
}

/// The five-row severity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityTable {
    /// Tuning for `trivial`.
    #[serde(default = "default_trivial")]
    pub trivial: SeverityTuning,
    /// Tuning for `minor`.
    #[serde(default = "default_minor")]
    pub minor: SeverityTuning,
    /// Tuning for `moderate`.
    #[serde(default = "default_moderate")]
    pub moderate: SeverityTuning,
    /// Tuning for `major`.
    #[serde(default = "default_major")]
    pub major: SeverityTuning,
    /// Tuning for `critical`.
    #[serde(default = "default_critical")]
    pub critical: SeverityTuning,
}

impl SeverityTable {
    /// Row for a severity.
    #[must_use]
    pub fn get(&self, severity: Severity) -> &SeverityTuning {
        match severity {
            Severity::Trivial => &self.trivial,
            Severity::Minor => &self.minor,
            Severity::Moderate => &self.moderate,
            Severity::Major => &self.major,
            Severity::Critical => &self.critical,
        }
    }
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            trivial: default_trivial(),
            minor: default_minor(),
            moderate: default_moderate(),
            major: default_major(),
            critical: default_critical(),
        }
    }
}

/// Impact score weights. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactWeights {
    /// Weight of the severity score.
    #[serde(default = "default_0_4")]
    pub severity: f64,
    /// Weight of the saturated spread count.
    #[serde(default = "default_0_5")]
    pub spread: f64,
    /// Weight of the average believability.
    #[serde(default = "default_0_1")]
    pub believability: f64,
    /// Spread count at which the spread term saturates.
    #[serde(default = "default_100_f64")]
    pub spread_saturation: f64,
}

impl Default for ImpactWeights {
    fn default() -> Self {
        Self {
            severity: 0.4,
            spread: 0.5,
            believability: 0.1,
            spread_saturation: 100.0,
        }
    }
}

/// Belief calculator constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefConfig {
    /// Base logarithmic decay rate.
    #[serde(default = "default_0_05")]
    pub base_decay: f64,
    /// Base believability loss of a contradiction.
    #[serde(default = "default_0_4")]
    pub base_contradiction: f64,
    /// Lower bound of the contradiction jitter.
    #[serde(default = "default_0_7")]
    pub contradiction_jitter_min: f64,
    /// Upper bound of the contradiction jitter.
    #[serde(default = "default_1_3")]
    pub contradiction_jitter_max: f64,
    /// Base believability gain of a reinforcement.
    #[serde(default = "default_0_3")]
    pub base_reinforcement: f64,
    /// How strongly current belief damps a reinforcement.
    #[serde(default = "default_0_5")]
    pub diminishing_returns: f64,
    /// Base per-retelling mutation chance.
    #[serde(default = "default_0_2")]
    pub base_mutation_chance: f64,
    /// Spread count that adds one full base rate to the mutation chance.
    #[serde(default = "default_50_f64")]
    pub mutation_spread_divisor: f64,
    /// Cap on the spread multiplier of the mutation chance.
    #[serde(default = "default_2_0")]
    pub mutation_spread_cap: f64,
    /// Believability lost per unit of listener skepticism.
    #[serde(default = "default_0_2")]
    pub skepticism_weight: f64,
    /// Believability gained per unit of teller credibility.
    #[serde(default = "default_0_1")]
    pub credibility_weight: f64,
    /// Per-severity multipliers.
    #[serde(default)]
    pub severity: SeverityTable,
    /// Impact score weights.
    #[serde(default)]
    pub impact: ImpactWeights,
    /// Named environmental decay multipliers.
    #[serde(default = "default_environment")]
    pub environment: BTreeMap<String, f64>,
}

impl BeliefConfig {
    fn validate(&self) -> Result<()> {
        let scalars = [
            ("base_decay", self.base_decay),
            ("base_contradiction", self.base_contradiction),
            ("contradiction_jitter_min", self.contradiction_jitter_min),
            ("contradiction_jitter_max", self.contradiction_jitter_max),
            ("base_reinforcement", self.base_reinforcement),
            ("diminishing_returns", self.diminishing_returns),
            ("base_mutation_chance", self.base_mutation_chance),
            ("mutation_spread_cap", self.mutation_spread_cap),
            ("skepticism_weight", self.skepticism_weight),
            ("credibility_weight", self.credibility_weight),
            ("impact.severity", self.impact.severity),
            ("impact.spread", self.impact.spread),
            ("impact.believability", self.impact.believability),
        ];
        for (name, value) in scalars {
            non_negative(&format!("belief.{name}"), value)?;
        }
        let weights = self.impact.severity + self.impact.spread + self.impact.believability;
        if (weights - 1.0).abs() > 1e-6 {
            return Err(RumorError::Config(format!(
                "belief.impact weights must sum to 1.0 (got {weights})"
            )));
        }
        if self.contradiction_jitter_min > self.contradiction_jitter_max {
            return Err(RumorError::Config(format!(
                "belief.contradiction_jitter_min ({}) exceeds contradiction_jitter_max ({})",
                self.contradiction_jitter_min, self.contradiction_jitter_max
            )));
        }
        let divisors = [
            ("mutation_spread_divisor", self.mutation_spread_divisor),
            ("impact.spread_saturation", self.impact.spread_saturation),
        ];
        for (name, value) in divisors {
            if !value.is_finite() || value <= 0.0 {
                return Err(RumorError::Config(format!(
                    "belief.{name} must be a positive number (got {value})"
                )));
            }
        }
        for severity in Severity::ALL {
            let row = self.severity.get(severity);
            non_negative(&format!("belief.severity.{severity}.decay_factor"), row.decay_factor)?;
            non_negative(&format!("belief.severity.{severity}.mutation_factor"), row.mutation_factor)?;
            if !(0.0..=1.0).contains(&row.impact_score) {
                return Err(RumorError::Config(format!(
                    "belief.severity.{severity}.impact_score must be within [0, 1]"
                )));
            }
        }
        for (name, value) in &self.environment {
            non_negative(&format!("belief.environment.{name}"), *value)?;
        }
        Ok(())
    }
}

/// Reject NaN, infinities and negatives.
fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RumorError::Config(format!(
            "{name} must be a finite non-negative number (got {value})"
        )))
    }
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            base_decay: 0.05,
            base_contradiction: 0.4,
            contradiction_jitter_min: 0.7,
            contradiction_jitter_max: 1.3,
            base_reinforcement: 0.3,
            diminishing_returns: 0.5,
            base_mutation_chance: 0.2,
            mutation_spread_divisor: 50.0,
            mutation_spread_cap: 2.0,
            skepticism_weight: 0.2,
            credibility_weight: 0.1,
            severity: SeverityTable::default(),
            impact: ImpactWeights::default(),
            environment: default_environment(),
        }
    }
}

/// A location preposition and the vaguer wording that replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSwap {
    /// Word to look for (whole-word match).
    pub from: String,
    /// Replacement wording.
    pub to: String,
}

/// Mutation generator chances and phrase tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Chance of prefixing an uncertainty phrase.
    #[serde(default = "default_0_4")]
    pub uncertainty_chance: f64,
    /// Chance of blurring a location preposition.
    #[serde(default = "default_0_3")]
    pub location_chance: f64,
    /// Chance of an intensity phrase when the listener is dramatic.
    #[serde(default = "default_0_5")]
    pub intensity_chance: f64,
    /// Chance of a hedging phrase when the listener is careful.
    #[serde(default = "default_0_5")]
    pub hedging_chance: f64,
    /// Uncertainty phrases.
    #[serde(default = "default_uncertainty_phrases")]
    pub uncertainty_phrases: Vec<String>,
    /// Location swaps, tried in order.
    #[serde(default = "default_location_swaps")]
    pub location_swaps: Vec<LocationSwap>,
    /// Intensity phrases.
    #[serde(default = "default_intensity_phrases")]
    pub intensity_phrases: Vec<String>,
    /// Hedging phrases.
    #[serde(default = "default_hedging_phrases")]
    pub hedging_phrases: Vec<String>,
}

impl MutationConfig {
    fn validate(&self) -> Result<()> {
        let chances = [
            ("uncertainty_chance", self.uncertainty_chance),
            ("location_chance", self.location_chance),
            ("intensity_chance", self.intensity_chance),
            ("hedging_chance", self.hedging_chance),
        ];
        for (name, value) in chances {
            if !(0.0..=1.0).contains(&value) {
                return Err(RumorError::Config(format!(
                    "mutation.{name} must be within [0, 1] (got {value})"
                )));
            }
        }
        if self.uncertainty_phrases.is_empty() {
            return Err(RumorError::Config(
                "mutation.uncertainty_phrases must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            uncertainty_chance: 0.4,
            location_chance: 0.3,
            intensity_chance: 0.5,
            hedging_chance: 0.5,
            uncertainty_phrases: default_uncertainty_phrases(),
            location_swaps: default_location_swaps(),
            intensity_phrases: default_intensity_phrases(),
            hedging_phrases: default_hedging_phrases(),
        }
    }
}

/// Field validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Max characters of rumor text.
    #[serde(default = "default_1000")]
    pub max_content_chars: usize,
    /// Max characters of an agent identifier.
    #[serde(default = "default_128")]
    pub max_agent_id_chars: usize,
    /// Max number of category tags.
    #[serde(default = "default_9")]
    pub max_categories: usize,
    /// Max page size accepted by listings.
    #[serde(default = "default_100_usize")]
    pub max_page_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 1000,
            max_agent_id_chars: 128,
            max_categories: 9,
            max_page_size: 100,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// Read-through cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the service wraps its repository in a cache.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Max cached aggregates (and, separately, list pages).
    #[serde(default = "default_256")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_0_05() -> f64 { 0.05 }
fn default_0_1() -> f64 { 0.1 }
fn default_0_2() -> f64 { 0.2 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_4() -> f64 { 0.4 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_7() -> f64 { 0.7 }
fn default_1_3() -> f64 { 1.3 }
fn default_2_0() -> f64 { 2.0 }
fn default_50_f64() -> f64 { 50.0 }
fn default_100_f64() -> f64 { 100.0 }
fn default_9() -> usize { 9 }
fn default_100_usize() -> usize { 100 }
fn default_128() -> usize { 128 }
fn default_256() -> usize { 256 }
fn default_1000() -> usize { 1000 }
fn default_5000() -> u64 { 5000 }

fn tuning(factor: f64, impact_score: f64) -> SeverityTuning {
    SeverityTuning { decay_factor: factor, mutation_factor: factor, impact_score }
}
fn default_trivial() -> SeverityTuning { tuning(1.5, 0.2) }
fn default_minor() -> SeverityTuning { tuning(1.2, 0.4) }
fn default_moderate() -> SeverityTuning { tuning(1.0, 0.6) }
fn default_major() -> SeverityTuning { tuning(0.8, 0.8) }
fn default_critical() -> SeverityTuning { tuning(0.6, 1.0) }

fn default_environment() -> BTreeMap<String, f64> {
    [
        ("active_conflict", 0.5),
        ("peaceful_period", 1.2),
        ("information_abundance", 1.3),
        ("social_stability", 1.1),
    ]
    .into_iter()
    .map(|(name, m)| (name.to_string(), m))
    .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
fn default_uncertainty_phrases() -> Vec<String> {
    strings(&["Allegedly,", "I heard that", "Word is that", "Rumor has it that", "Supposedly,"])
}
fn default_intensity_phrases() -> Vec<String> {
    strings(&["Definitely", "Absolutely", "Without a doubt"])
}
fn default_hedging_phrases() -> Vec<String> {
    strings(&["It might have been that", "Possibly", "Perhaps"])
}
fn default_location_swaps() -> Vec<LocationSwap> {
    [("at", "somewhere near"), ("in", "somewhere around"), ("near", "somewhere close to")]
        .into_iter()
        .map(|(from, to)| LocationSwap { from: from.to_string(), to: to.to_string() })
        .collect()
}
