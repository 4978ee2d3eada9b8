//! Diffusion Orchestrator: the [`Rumor`] aggregate root.
//!
//! A rumor owns its variant lineage and its belief ledger. Every operation
//! here is one atomic transition: all preconditions are checked before any
//! state changes, so a failed call leaves the aggregate untouched.
//!
//! The aggregate never performs I/O. The clock (`now`) and the random
//! source are passed in by the caller.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::belief;
use crate::config::BeliefConfig;
use crate::error::{Result, RumorError};
use crate::ledger::{BeliefLedger, SpreadRecord};
use crate::lineage::{LineageStore, Variant};
use crate::mutation::MutationGenerator;
use crate::types::{
    AgentId, Awareness, Category, EnvironmentalFactors, ImpactLevel, ReceiverPersonality, RumorId,
    RumorStatus, Severity, SocialContext, VariantId,
};
use crate::validation::{ValidationErrors, check_range, check_unit};

/// Validated input for [`Rumor::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRumor {
    /// The agent who starts the rumor.
    pub originator: AgentId,
    /// The original statement.
    pub text: String,
    /// Topic tags.
    pub categories: BTreeSet<Category>,
    /// Narrative weight.
    pub severity: Severity,
    /// Objective accuracy in [0, 1].
    pub truth_value: f64,
    /// Free-form properties.
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// A contradicting source was heard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionEvent {
    /// Strength of the counter-evidence.
    pub strength: f64,
    /// Credibility of the contradicting source.
    pub source_credibility: f64,
    /// Believability subtracted from every record.
    pub effect: f64,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// A reinforcing source was heard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinforcementEvent {
    /// Strength of the supporting evidence.
    pub strength: f64,
    /// Credibility of the reinforcing source.
    pub source_credibility: f64,
    /// Boost before diminishing returns.
    pub raw_boost: f64,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

/// Log of external events applied to a rumor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RumorHistory {
    /// Contradictions in order of application.
    #[serde(default)]
    pub contradictions: Vec<ContradictionEvent>,
    /// Reinforcements in order of application.
    #[serde(default)]
    pub reinforcements: Vec<ReinforcementEvent>,
    /// Number of time-decay passes applied.
    #[serde(default)]
    pub decay_applications: u32,
}

/// One retelling: who tells whom, what, and in which setting.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadRequest {
    /// The teller. Must already know the rumor.
    pub source: AgentId,
    /// The listener.
    pub target: AgentId,
    /// Wording to tell; defaults to the teller's current variant.
    pub variant: Option<VariantId>,
    /// Shift applied to the teller's believability, in [-1, 1].
    pub believability_modifier: f64,
    /// Whether the wording may change in the retelling.
    pub allow_mutation: bool,
    /// Setting of the retelling.
    pub context: SocialContext,
    /// The listener's traits.
    pub personality: ReceiverPersonality,
}

impl SpreadRequest {
    /// A plain retelling from `source` to `target` with default context.
    #[must_use]
    pub fn new(source: impl Into<AgentId>, target: impl Into<AgentId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            variant: None,
            believability_modifier: 0.0,
            allow_mutation: true,
            context: SocialContext::default(),
            personality: ReceiverPersonality::default(),
        }
    }

    /// Tell a specific variant.
    #[must_use]
    pub fn with_variant(mut self, variant: VariantId) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Shift the listener's believability.
    #[must_use]
    pub fn with_modifier(mut self, modifier: f64) -> Self {
        self.believability_modifier = modifier;
        self
    }

    /// Forbid mutation for this retelling.
    #[must_use]
    pub fn without_mutation(mut self) -> Self {
        self.allow_mutation = false;
        self
    }

    /// Replace the social context.
    #[must_use]
    pub fn with_context(mut self, context: SocialContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the listener's personality.
    #[must_use]
    pub fn with_personality(mut self, personality: ReceiverPersonality) -> Self {
        self.personality = personality;
        self
    }

    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_range(&mut errors, "believability_modifier", self.believability_modifier, -1.0, 1.0);
        check_unit(&mut errors, "source_credibility", self.context.source_credibility);
        check_unit(&mut errors, "skepticism", self.personality.skepticism);
        errors.into_result(())
    }
}

/// Result of a successful [`Rumor::spread`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadOutcome {
    /// The variant the listener received.
    pub variant: VariantId,
    /// Whether a new variant was created for this retelling.
    pub mutated: bool,
    /// The listener's new believability.
    pub believability: f64,
    /// The mutation probability that was in effect.
    pub mutation_probability: f64,
}

/// The rumor aggregate: one statement, its wordings, and who believes what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RumorRecord")]
pub struct Rumor {
    /// Unique identifier.
    pub id: RumorId,
    /// The agent who started it.
    pub originator: AgentId,
    /// The original statement.
    pub original_text: String,
    /// Topic tags.
    pub categories: BTreeSet<Category>,
    severity: Severity,
    truth_value: f64,
    status: RumorStatus,
    /// Free-form properties supplied at creation.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// When the rumor was created.
    pub created_at: DateTime<Utc>,
    /// When the last transition was applied.
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, advanced by repositories on update.
    pub version: u64,
    lineage: LineageStore,
    ledger: BeliefLedger,
    #[serde(default)]
    history: RumorHistory,
}

/// Stored shape of a [`Rumor`], checked before it becomes an aggregate.
#[derive(Deserialize)]
struct RumorRecord {
    id: RumorId,
    originator: AgentId,
    original_text: String,
    categories: BTreeSet<Category>,
    severity: Severity,
    truth_value: f64,
    status: RumorStatus,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    lineage: LineageStore,
    ledger: BeliefLedger,
    #[serde(default)]
    history: RumorHistory,
}

impl TryFrom<RumorRecord> for Rumor {
    type Error = RumorError;

    fn try_from(record: RumorRecord) -> Result<Self> {
        let mut errors = ValidationErrors::new();
        check_unit(&mut errors, "truth_value", record.truth_value);
        for spread in record.ledger.iter() {
            check_unit(&mut errors, "believability", spread.believability);
        }
        errors.into_result(())?;

        if let Some(orphan) = record
            .ledger
            .iter()
            .find(|spread| !record.lineage.contains(spread.variant))
        {
            return Err(RumorError::CorruptLineage(format!(
                "agent {} holds variant {} outside rumor {}",
                orphan.agent, orphan.variant, record.id
            )));
        }

        Ok(Self {
            id: record.id,
            originator: record.originator,
            original_text: record.original_text,
            categories: record.categories,
            severity: record.severity,
            truth_value: record.truth_value,
            status: record.status,
            properties: record.properties,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
            lineage: record.lineage,
            ledger: record.ledger,
            history: record.history,
        })
    }
}

impl Rumor {
    /// Start a rumor: the original wording plus the originator's full belief.
    #[must_use]
    pub fn create(new: NewRumor, now: DateTime<Utc>) -> Self {
        let lineage = LineageStore::with_root(new.text.clone(), new.originator.clone(), now);
        let mut ledger = BeliefLedger::new();
        ledger.record(SpreadRecord {
            agent: new.originator.clone(),
            variant: lineage.root().id,
            heard_from: None,
            believability: 1.0,
            timestamp: now,
        });

        let rumor = Self {
            id: RumorId::new(),
            originator: new.originator,
            original_text: new.text,
            categories: new.categories,
            severity: new.severity,
            truth_value: new.truth_value,
            status: RumorStatus::Active,
            properties: new.properties,
            created_at: now,
            updated_at: now,
            version: 0,
            lineage,
            ledger,
            history: RumorHistory::default(),
        };
        debug!(rumor = %rumor.id, originator = %rumor.originator, severity = %rumor.severity, "Rumor created");
        rumor
    }

    // ------------------------------------------------------------------
    // Read-only accessors
    // ------------------------------------------------------------------

    /// Narrative weight. Fixed at creation.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Objective accuracy. Fixed at creation and never shown to agents.
    #[must_use]
    pub fn truth_value(&self) -> f64 {
        self.truth_value
    }

    /// Listing status.
    #[must_use]
    pub fn status(&self) -> RumorStatus {
        self.status
    }

    /// Change the listing status.
    pub fn set_status(&mut self, status: RumorStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Every wording of the rumor.
    #[must_use]
    pub fn lineage(&self) -> &LineageStore {
        &self.lineage
    }

    /// Every spread record.
    #[must_use]
    pub fn ledger(&self) -> &BeliefLedger {
        &self.ledger
    }

    /// External events applied so far.
    #[must_use]
    pub fn history(&self) -> &RumorHistory {
        &self.history
    }

    /// Number of spread records.
    #[must_use]
    pub fn spread_count(&self) -> usize {
        self.ledger.len()
    }

    /// Number of wordings, the original included.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.lineage.len()
    }

    /// Mean believability over all spread records.
    #[must_use]
    pub fn average_believability(&self) -> f64 {
        self.ledger.average_believability()
    }

    /// Number of agents who have heard the rumor.
    #[must_use]
    pub fn distinct_agents(&self) -> usize {
        self.ledger.distinct_agents()
    }

    /// Whether `agent` has heard the rumor.
    #[must_use]
    pub fn awareness(&self, agent: &AgentId) -> Awareness {
        self.ledger.awareness(agent)
    }

    /// Shorthand for `awareness(agent) == Aware`.
    #[must_use]
    pub fn knows(&self, agent: &AgentId) -> bool {
        self.awareness(agent) == Awareness::Aware
    }

    /// The agent's latest spread record.
    #[must_use]
    pub fn current_record(&self, agent: &AgentId) -> Option<&SpreadRecord> {
        self.ledger.current(agent)
    }

    /// The wording the agent currently holds.
    #[must_use]
    pub fn current_variant(&self, agent: &AgentId) -> Option<&Variant> {
        self.current_record(agent).and_then(|r| self.lineage.get(r.variant))
    }

    /// How strongly the agent currently believes the rumor.
    #[must_use]
    pub fn believability_of(&self, agent: &AgentId) -> Option<f64> {
        self.current_record(agent).map(|r| r.believability)
    }

    /// The text the agent would repeat.
    #[must_use]
    pub fn content_known_by(&self, agent: &AgentId) -> Option<&str> {
        self.current_variant(agent).map(|v| v.text.as_str())
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Tell the rumor from one agent to another.
    ///
    /// A single uniform draw decides whether the wording mutates. The
    /// listener's believability starts from the teller's and is shifted by
    /// the modifier, the listener's skepticism and the teller's credibility.
    ///
    /// # Errors
    /// - [`RumorError::Validation`] for out-of-range numbers in the request;
    /// - [`RumorError::AgentUnaware`] if the teller has never heard it;
    /// - [`RumorError::ForeignVariant`] if the requested variant is not in
    ///   this rumor's lineage.
    pub fn spread<R: Rng>(
        &mut self,
        request: &SpreadRequest,
        config: &BeliefConfig,
        generator: &MutationGenerator,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<SpreadOutcome> {
        request.validate()?;

        let Some(source_record) = self.ledger.current(&request.source) else {
            warn!(rumor = %self.id, agent = %request.source, "Spread from unaware agent rejected");
            return Err(RumorError::AgentUnaware {
                rumor: self.id,
                agent: request.source.clone(),
            });
        };
        let source_believability = source_record.believability;
        let source_variant = request.variant.unwrap_or(source_record.variant);

        let Some(variant) = self.lineage.get(source_variant) else {
            warn!(rumor = %self.id, variant = %source_variant, "Spread of foreign variant rejected");
            return Err(RumorError::ForeignVariant {
                rumor: self.id,
                variant: source_variant,
            });
        };
        let source_text = variant.text.clone();

        let probability = belief::mutation_probability(self.severity, self.ledger.len(), config);
        let sample: f64 = rng.gen_range(0.0..1.0);
        let (carried, mutated) = if request.allow_mutation && sample < probability {
            let outcome = generator.generate(&source_text, &request.personality, rng);
            let id = self.lineage.append(
                source_variant,
                outcome.text,
                request.target.clone(),
                outcome.metadata,
                now,
            )?;
            (id, true)
        } else {
            (source_variant, false)
        };

        let believability = belief::spread_believability(
            source_believability,
            request.believability_modifier,
            request.personality.skepticism,
            request.context.source_credibility,
            config,
        );
        self.ledger.record(SpreadRecord {
            agent: request.target.clone(),
            variant: carried,
            heard_from: Some(request.source.clone()),
            believability,
            timestamp: now,
        });
        self.updated_at = now;

        debug!(
            rumor = %self.id,
            from = %request.source,
            to = %request.target,
            mutated,
            believability,
            probability,
            "Rumor spread"
        );

        Ok(SpreadOutcome {
            variant: carried,
            mutated,
            believability,
            mutation_probability: probability,
        })
    }

    /// Age every record by `days_elapsed` days under the given conditions.
    ///
    /// Negative elapsed time counts as zero. Returns the amount subtracted.
    ///
    /// # Errors
    /// Returns [`RumorError::Validation`] if `days_elapsed` is not finite.
    pub fn apply_time_decay(
        &mut self,
        days_elapsed: f64,
        factors: &EnvironmentalFactors,
        config: &BeliefConfig,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        if !days_elapsed.is_finite() {
            return Err(ValidationErrors::single("days_elapsed", "must be a finite number").into());
        }
        let amount = belief::time_decay_amount(days_elapsed, self.severity, factors, config);
        self.ledger.adjust_all(|b| b - amount);
        self.history.decay_applications = self.history.decay_applications.saturating_add(1);
        self.updated_at = now;
        debug!(rumor = %self.id, days = days_elapsed, amount, "Time decay applied");
        Ok(amount)
    }

    /// Apply counter-evidence to every record. Returns the amount subtracted.
    ///
    /// # Errors
    /// Returns [`RumorError::Validation`] if either input is outside [0, 1].
    pub fn contradict<R: Rng>(
        &mut self,
        strength: f64,
        source_credibility: f64,
        config: &BeliefConfig,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        check_event_inputs(strength, source_credibility)?;
        let effect = belief::contradiction_effect(strength, source_credibility, config, rng);
        self.ledger.adjust_all(|b| b - effect);
        self.history.contradictions.push(ContradictionEvent {
            strength,
            source_credibility,
            effect,
            timestamp: now,
        });
        self.updated_at = now;
        debug!(rumor = %self.id, strength, source_credibility, effect, "Rumor contradicted");
        Ok(effect)
    }

    /// Apply supporting evidence to every record, with diminishing returns
    /// for records that already believe strongly. Returns the raw boost.
    ///
    /// # Errors
    /// Returns [`RumorError::Validation`] if either input is outside [0, 1].
    pub fn reinforce(
        &mut self,
        strength: f64,
        source_credibility: f64,
        config: &BeliefConfig,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        check_event_inputs(strength, source_credibility)?;
        let raw = belief::reinforcement_boost(strength, source_credibility, config);
        self.ledger
            .adjust_all(|b| b + belief::diminished_boost(raw, b, config));
        self.history.reinforcements.push(ReinforcementEvent {
            strength,
            source_credibility,
            raw_boost: raw,
            timestamp: now,
        });
        self.updated_at = now;
        debug!(rumor = %self.id, strength, source_credibility, raw, "Rumor reinforced");
        Ok(raw)
    }

    /// Shift one agent's current believability by `delta`, clamped to
    /// [0, 1]. Only the agent's latest record changes. Returns the new value.
    ///
    /// # Errors
    /// - [`RumorError::Validation`] if `delta` is outside [-1, 1];
    /// - [`RumorError::AgentUnaware`] if the agent has never heard it.
    pub fn adjust_believability(
        &mut self,
        agent: &AgentId,
        delta: f64,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        let mut errors = ValidationErrors::new();
        check_range(&mut errors, "delta", delta, -1.0, 1.0);
        errors.into_result(())?;

        let Some(believability) = self.ledger.adjust_current(agent, delta) else {
            warn!(rumor = %self.id, agent = %agent, "Believability adjustment for unaware agent rejected");
            return Err(RumorError::AgentUnaware {
                rumor: self.id,
                agent: agent.clone(),
            });
        };
        self.updated_at = now;
        debug!(rumor = %self.id, agent = %agent, delta, believability, "Believability adjusted");
        Ok(believability)
    }

    /// Composite narrative weight in [0, 1].
    #[must_use]
    pub fn impact_score(&self, config: &BeliefConfig) -> f64 {
        belief::impact_score(
            self.severity,
            self.spread_count(),
            self.average_believability(),
            config,
        )
    }

    /// Bucketed [`impact_score`](Self::impact_score).
    #[must_use]
    pub fn impact_level(&self, config: &BeliefConfig) -> ImpactLevel {
        ImpactLevel::from_score(self.impact_score(config))
    }
}

fn check_event_inputs(strength: f64, source_credibility: f64) -> Result<()> {
    let mut errors = ValidationErrors::new();
    check_unit(&mut errors, "strength", strength);
    check_unit(&mut errors, "source_credibility", source_credibility);
    Ok(errors.into_result(())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MutationConfig;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn new_rumor(severity: Severity) -> NewRumor {
        NewRumor {
            originator: AgentId::from("ann"),
            text: "The baron hid gold at the mill".into(),
            categories: BTreeSet::from([Category::Political]),
            severity,
            truth_value: 0.8,
            properties: BTreeMap::new(),
        }
    }

    fn always_mutate() -> BeliefConfig {
        BeliefConfig {
            base_mutation_chance: 1.0,
            ..BeliefConfig::default()
        }
    }

    fn never_mutate() -> BeliefConfig {
        BeliefConfig {
            base_mutation_chance: 0.0,
            ..BeliefConfig::default()
        }
    }

    #[test]
    fn create_seeds_root_and_originator_record() {
        let now = Utc::now();
        let rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let ann = AgentId::from("ann");

        assert_eq!(rumor.spread_count(), 1);
        assert_eq!(rumor.variant_count(), 1);
        assert_eq!(rumor.believability_of(&ann), Some(1.0));
        assert_eq!(rumor.current_record(&ann).and_then(|r| r.heard_from.clone()), None);
        assert_eq!(rumor.content_known_by(&ann), Some("The baron hid gold at the mill"));
        assert_eq!(rumor.status(), RumorStatus::Active);
        assert_eq!(rumor.version, 0);
        assert!((rumor.truth_value() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn spread_without_mutation_carries_source_variant() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = rumor
            .spread(
                &SpreadRequest::new("ann", "bob").without_mutation(),
                &BeliefConfig::default(),
                &MutationGenerator::default(),
                &mut rng,
                now,
            )
            .expect("spread");

        assert!(!outcome.mutated);
        assert_eq!(outcome.variant, rumor.lineage().root().id);
        assert_eq!(rumor.spread_count(), 2);
        assert_eq!(rumor.variant_count(), 1);
        let bob = AgentId::from("bob");
        let record = rumor.current_record(&bob).expect("bob heard it");
        assert_eq!(record.heard_from, Some(AgentId::from("ann")));
        // 1.0 + 0 − 0.2·0.5 + 0.1·0.5
        assert!((record.believability - 0.95).abs() < 1e-12);
    }

    #[test]
    fn spread_with_mutation_attaches_child_variant() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Moderate), now);
        let mut rng = StdRng::seed_from_u64(2);
        let outcome = rumor
            .spread(
                &SpreadRequest::new("ann", "bob"),
                &always_mutate(),
                &MutationGenerator::default(),
                &mut rng,
                now,
            )
            .expect("spread");

        assert!(outcome.mutated);
        assert_eq!(rumor.variant_count(), 2);
        let child = rumor.lineage().get(outcome.variant).expect("child");
        assert_eq!(child.parent, Some(rumor.lineage().root().id));
        assert_eq!(child.creator, AgentId::from("bob"));
        assert_ne!(child.text, rumor.original_text);
        assert_eq!(rumor.current_variant(&AgentId::from("bob")).map(|v| v.id), Some(child.id));
    }

    #[test]
    fn retelling_chain_builds_a_tree() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Trivial), now);
        let mut rng = StdRng::seed_from_u64(3);
        let generator = MutationGenerator::new(MutationConfig::default());
        let cfg = always_mutate();
        rumor.spread(&SpreadRequest::new("ann", "bob"), &cfg, &generator, &mut rng, now).expect("a→b");
        rumor
            .spread(&SpreadRequest::new("bob", "cid"), &cfg, &generator, &mut rng, now + Duration::minutes(1))
            .expect("b→c");

        let cid_variant = rumor.current_variant(&AgentId::from("cid")).expect("cid variant").id;
        assert_eq!(rumor.lineage().depth(cid_variant).expect("depth"), 2);
    }

    #[test]
    fn spread_from_unaware_agent_is_rejected_without_change() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let before = rumor.clone();
        let err = rumor
            .spread(
                &SpreadRequest::new("zed", "bob"),
                &always_mutate(),
                &MutationGenerator::default(),
                &mut StdRng::seed_from_u64(4),
                now + Duration::hours(1),
            )
            .unwrap_err();
        assert!(matches!(err, RumorError::AgentUnaware { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(rumor, before);
    }

    #[test]
    fn spread_of_foreign_variant_is_rejected_without_change() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let before = rumor.clone();
        let err = rumor
            .spread(
                &SpreadRequest::new("ann", "bob").with_variant(VariantId::new()),
                &never_mutate(),
                &MutationGenerator::default(),
                &mut StdRng::seed_from_u64(5),
                now,
            )
            .unwrap_err();
        assert!(matches!(err, RumorError::ForeignVariant { .. }));
        assert_eq!(rumor, before);
    }

    #[test]
    fn out_of_range_modifier_is_a_validation_error() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let err = rumor
            .spread(
                &SpreadRequest::new("ann", "bob").with_modifier(1.5),
                &never_mutate(),
                &MutationGenerator::default(),
                &mut StdRng::seed_from_u64(6),
                now,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(rumor.spread_count(), 1);
    }

    #[test]
    fn thirty_days_of_decay_on_trivial_rumor() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Trivial), now);
        let amount = rumor
            .apply_time_decay(30.0, &EnvironmentalFactors::none(), &BeliefConfig::default(), now)
            .expect("decay");
        assert!((amount - 0.1118).abs() < 1e-3);
        let ann = rumor.believability_of(&AgentId::from("ann")).expect("ann");
        assert!((ann - (1.0 - amount)).abs() < 1e-12);
        assert_eq!(rumor.history().decay_applications, 1);
    }

    #[test]
    fn decay_clamps_at_zero() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Trivial), now);
        let cfg = BeliefConfig {
            base_decay: 5.0,
            ..BeliefConfig::default()
        };
        rumor
            .apply_time_decay(1000.0, &EnvironmentalFactors::none(), &cfg, now)
            .expect("decay");
        assert_eq!(rumor.believability_of(&AgentId::from("ann")), Some(0.0));
        assert!(rumor.apply_time_decay(f64::NAN, &EnvironmentalFactors::none(), &cfg, now).is_err());
    }

    #[test]
    fn contradict_then_reinforce_stays_in_bounds() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Major), now);
        let cfg = BeliefConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let effect = rumor.contradict(1.0, 1.0, &cfg, &mut rng, now).expect("contradict");
        assert!((0.28 - 1e-12..=0.52 + 1e-12).contains(&effect));
        let after_contradiction = rumor.believability_of(&AgentId::from("ann")).expect("ann");
        rumor.reinforce(1.0, 1.0, &cfg, now).expect("reinforce");
        let after = rumor.believability_of(&AgentId::from("ann")).expect("ann");
        assert!(after > after_contradiction);
        assert!((0.0..=1.0).contains(&after));
        assert_eq!(rumor.history().contradictions.len(), 1);
        assert_eq!(rumor.history().reinforcements.len(), 1);
    }

    #[test]
    fn event_inputs_are_validated() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let cfg = BeliefConfig::default();
        let err = rumor.reinforce(2.0, 0.5, &cfg, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = rumor
            .contradict(0.5, -0.1, &cfg, &mut StdRng::seed_from_u64(8), now)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(rumor.history().reinforcements.is_empty());
    }

    #[test]
    fn impact_of_fresh_critical_rumor() {
        let now = Utc::now();
        let rumor = Rumor::create(new_rumor(Severity::Critical), now);
        let cfg = BeliefConfig::default();
        // 0.4·1.0 + 0.5·0.01 + 0.1·1.0
        assert!((rumor.impact_score(&cfg) - 0.505).abs() < 1e-12);
        assert_eq!(rumor.impact_level(&cfg), ImpactLevel::Moderate);
    }

    #[test]
    fn aggregate_survives_json_round_trip() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        rumor
            .spread(
                &SpreadRequest::new("ann", "bob"),
                &always_mutate(),
                &MutationGenerator::default(),
                &mut StdRng::seed_from_u64(9),
                now,
            )
            .expect("spread");
        let json = serde_json::to_string(&rumor).expect("serialize");
        let back: Rumor = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.id, rumor.id);
        assert_eq!(back.lineage(), rumor.lineage());
        assert_eq!(back.spread_count(), 2);
        let bob = AgentId::from("bob");
        let delta = back.believability_of(&bob).zip(rumor.believability_of(&bob)).map(|(a, b)| (a - b).abs());
        assert!(delta.is_some_and(|d| d < 1e-12));
    }

    #[test]
    fn adjust_believability_moves_one_agent_and_clamps() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        rumor
            .spread(
                &SpreadRequest::new("ann", "bob").without_mutation(),
                &never_mutate(),
                &MutationGenerator::default(),
                &mut StdRng::seed_from_u64(10),
                now,
            )
            .expect("spread");
        let ann = AgentId::from("ann");
        let bob = AgentId::from("bob");
        let later = now + Duration::minutes(5);

        let lowered = rumor.adjust_believability(&bob, -0.25, later).expect("adjust");
        assert!((lowered - 0.70).abs() < 1e-12);
        assert_eq!(rumor.believability_of(&ann), Some(1.0));
        assert_eq!(rumor.updated_at, later);

        let raised = rumor.adjust_believability(&ann, 0.5, later).expect("adjust");
        assert!((raised - 1.0).abs() < f64::EPSILON);
        let floored = rumor.adjust_believability(&bob, -1.0, later).expect("adjust");
        assert!(floored.abs() < f64::EPSILON);
        assert_eq!(rumor.spread_count(), 2);
    }

    #[test]
    fn adjust_believability_rejects_unaware_agent_and_bad_delta() {
        let now = Utc::now();
        let mut rumor = Rumor::create(new_rumor(Severity::Minor), now);
        let before = rumor.clone();

        let err = rumor
            .adjust_believability(&AgentId::from("zed"), 0.1, now + Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, RumorError::AgentUnaware { .. }));
        let err = rumor
            .adjust_believability(&AgentId::from("ann"), f64::NAN, now)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = rumor
            .adjust_believability(&AgentId::from("ann"), 1.5, now)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(rumor, before);
    }

    #[test]
    fn stored_rumor_with_bad_numbers_is_rejected() {
        let rumor = Rumor::create(new_rumor(Severity::Minor), Utc::now());
        let json = serde_json::to_value(&rumor).expect("serialize");

        let mut truth = json.clone();
        truth["truth_value"] = serde_json::json!(1.5);
        assert!(serde_json::from_value::<Rumor>(truth).is_err());

        let mut belief = json.clone();
        belief["ledger"][0]["believability"] = serde_json::json!(-0.2);
        assert!(serde_json::from_value::<Rumor>(belief).is_err());

        let back: Rumor = serde_json::from_value(json).expect("untouched record loads");
        assert_eq!(back.id, rumor.id);
        assert_eq!(back.ledger(), rumor.ledger());
    }

    #[test]
    fn stored_rumor_with_orphan_record_is_rejected() {
        let rumor = Rumor::create(new_rumor(Severity::Minor), Utc::now());
        let mut json = serde_json::to_value(&rumor).expect("serialize");
        json["ledger"][0]["variant"] = serde_json::to_value(VariantId::new()).expect("id");
        let err = serde_json::from_value::<Rumor>(json).unwrap_err();
        assert!(err.to_string().contains("outside rumor"), "{err}");
    }
}
