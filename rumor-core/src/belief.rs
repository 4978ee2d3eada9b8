//! Belief Calculator: how credibility moves.
//!
//! Pure numeric functions, parameterized by severity and [`BeliefConfig`]:
//!
//!   decay(t, s)       = clamp01(base × decay_factor(s) × log10(t + 1))
//!   mutation(s, n)    = clamp01(base × mutation_factor(s) × min(cap, 1 + n / divisor))
//!   contradiction     = base × strength × credibility × U(jitter_min, jitter_max)
//!   reinforcement     = base × strength × credibility × (1 − belief × diminishing)
//!   spread belief     = clamp01(source + modifier − w_s × skepticism + w_c × credibility)
//!   impact            = w_sev × score(s) + w_spread × min(1, n / saturation) + w_bel × avg
//!
//! Logarithmic decay forgets quickly at first and then flattens; higher
//! severities resist both forgetting and mutation.

use rand::Rng;
use tracing::debug;

use crate::config::BeliefConfig;
use crate::types::{EnvironmentalFactors, Severity};

/// Clamp into [0, 1].
#[must_use]
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Believability lost after `days_inactive` days without reinforcement.
#[must_use]
pub fn decay(days_inactive: f64, severity: Severity, config: &BeliefConfig) -> f64 {
    let days = days_inactive.max(0.0);
    let factor = config.severity.get(severity).decay_factor;
    clamp01(config.base_decay * factor * (days + 1.0).log10())
}

/// Chance that a retelling mutates the wording, given how many times the
/// rumor has already been told.
#[must_use]
pub fn mutation_probability(severity: Severity, spread_count: usize, config: &BeliefConfig) -> f64 {
    let factor = config.severity.get(severity).mutation_factor;
    let saturation =
        (1.0 + spread_count as f64 / config.mutation_spread_divisor).min(config.mutation_spread_cap);
    clamp01(config.base_mutation_chance * factor * saturation)
}

/// Product of the configured multipliers for the active conditions.
#[must_use]
pub fn environmental_multiplier(factors: &EnvironmentalFactors, config: &BeliefConfig) -> f64 {
    factors
        .iter()
        .filter_map(|name| match config.environment.get(name) {
            Some(multiplier) => Some(*multiplier),
            None => {
                debug!(factor = name, "Ignoring unknown environmental factor");
                None
            }
        })
        .product()
}

/// Believability to subtract from every record after `days_elapsed` days.
#[must_use]
pub fn time_decay_amount(
    days_elapsed: f64,
    severity: Severity,
    factors: &EnvironmentalFactors,
    config: &BeliefConfig,
) -> f64 {
    decay(days_elapsed, severity, config) * environmental_multiplier(factors, config)
}

/// Believability removed by a contradicting source. Stochastic.
pub fn contradiction_effect<R: Rng>(
    strength: f64,
    source_credibility: f64,
    config: &BeliefConfig,
    rng: &mut R,
) -> f64 {
    let jitter = if config.contradiction_jitter_min < config.contradiction_jitter_max {
        rng.gen_range(config.contradiction_jitter_min..=config.contradiction_jitter_max)
    } else {
        config.contradiction_jitter_min
    };
    config.base_contradiction * strength * source_credibility * jitter
}

/// Boost offered by a reinforcing source before diminishing returns.
#[must_use]
pub fn reinforcement_boost(strength: f64, source_credibility: f64, config: &BeliefConfig) -> f64 {
    config.base_reinforcement * strength * source_credibility
}

/// The part of `raw_boost` that lands on a believer at `current` belief.
#[must_use]
pub fn diminished_boost(raw_boost: f64, current: f64, config: &BeliefConfig) -> f64 {
    raw_boost * (1.0 - current * config.diminishing_returns)
}

/// Believability of a freshly told listener.
#[must_use]
pub fn spread_believability(
    source_believability: f64,
    modifier: f64,
    skepticism: f64,
    source_credibility: f64,
    config: &BeliefConfig,
) -> f64 {
    clamp01(
        source_believability + modifier - config.skepticism_weight * skepticism
            + config.credibility_weight * source_credibility,
    )
}

/// Composite read-only impact metric in [0, 1].
#[must_use]
pub fn impact_score(
    severity: Severity,
    spread_count: usize,
    average_believability: f64,
    config: &BeliefConfig,
) -> f64 {
    let weights = &config.impact;
    let severity_score = config.severity.get(severity).impact_score;
    let reach = (spread_count as f64 / weights.spread_saturation).min(1.0);
    clamp01(
        weights.severity * severity_score
            + weights.spread * reach
            + weights.believability * average_believability,
    )
}
