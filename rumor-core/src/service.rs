//! Rumor service: the calling layer around the orchestrator.
//!
//! Every mutating call follows the same cycle: take the rumor's lock, load
//! it, apply one [`Rumor`] transition, and write it back through the
//! repository's version check. Calls on different rumors run in parallel;
//! calls on the same rumor are serialized.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::CachedRepository;
use crate::config::RumorConfig;
use crate::error::{ErrorKind, Result, RumorError};
use crate::metrics::{CounterSnapshot, RumorCounters};
use crate::mutation::MutationGenerator;
use crate::persistence::SqliteRepository;
use crate::repository::{InMemoryRepository, ListQuery, RumorPage, RumorRepository, RumorStatistics};
use crate::rumor::{Rumor, SpreadOutcome, SpreadRequest};
use crate::types::{AgentId, Category, EnvironmentalFactors, ImpactLevel, RumorId, RumorStatus, Severity};
use crate::validation::{DefaultValidator, RawRumorInput, ValidationErrors, Validator, check_unit};

/// Read-only impact figures for one rumor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactReport {
    /// The rumor scored.
    pub rumor: RumorId,
    /// Composite score in [0, 1].
    pub score: f64,
    /// Bucketed score.
    pub level: ImpactLevel,
    /// The rumor's severity.
    pub severity: Severity,
    /// Spread records so far.
    pub spread_count: usize,
    /// Distinct agents who heard it.
    pub distinct_agents: usize,
    /// Wordings so far.
    pub variant_count: usize,
    /// Mean believability over all records.
    pub average_believability: f64,
}

/// What one agent knows of one rumor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRumorView {
    /// The rumor.
    pub rumor: RumorId,
    /// The wording the agent holds.
    pub content: String,
    /// How strongly the agent believes it.
    pub believability: f64,
    /// Who told the agent; `None` for the originator.
    pub heard_from: Option<AgentId>,
    /// When the agent last heard it.
    pub heard_at: DateTime<Utc>,
    /// The rumor's severity.
    pub severity: Severity,
}

/// Facade that composes validation, storage and the diffusion engine.
pub struct RumorService<R, V = DefaultValidator> {
    repository: R,
    validator: V,
    config: RumorConfig,
    generator: MutationGenerator,
    rng: Mutex<StdRng>,
    locks: DashMap<RumorId, Arc<Mutex<()>>>,
    counters: Arc<RumorCounters>,
}

impl<R, V> std::fmt::Debug for RumorService<R, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumorService")
            .field("locked_rumors", &self.locks.len())
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl RumorService<CachedRepository<InMemoryRepository>> {
    /// A service over a cached in-memory repository.
    ///
    /// # Errors
    /// Returns [`RumorError::Config`] if `config` does not validate.
    pub fn in_memory(config: RumorConfig) -> Result<Self> {
        let counters = Arc::new(RumorCounters::new());
        let repository = CachedRepository::new(InMemoryRepository::new(), &config.cache, Arc::clone(&counters));
        let validator = DefaultValidator::new(config.validation.clone());
        Self::with_counters(repository, validator, config, counters)
    }
}

impl RumorService<CachedRepository<SqliteRepository>> {
    /// A service over a cached SQLite database at `path`.
    ///
    /// # Errors
    /// Returns [`RumorError::Config`] if `config` does not validate, or
    /// [`RumorError::Database`] if the database cannot be opened.
    pub fn sqlite<P: AsRef<Path>>(path: P, config: RumorConfig) -> Result<Self> {
        config.validate()?;
        let counters = Arc::new(RumorCounters::new());
        let store = SqliteRepository::open(path, &config.persistence)?;
        let repository = CachedRepository::new(store, &config.cache, Arc::clone(&counters));
        let validator = DefaultValidator::new(config.validation.clone());
        Self::with_counters(repository, validator, config, counters)
    }
}

impl<R: RumorRepository, V: Validator> RumorService<R, V> {
    /// Compose a service from its parts.
    ///
    /// # Errors
    /// Returns [`RumorError::Config`] if `config` does not validate.
    pub fn new(repository: R, validator: V, config: RumorConfig) -> Result<Self> {
        Self::with_counters(repository, validator, config, Arc::new(RumorCounters::new()))
    }

    /// Compose a service that reports into shared `counters`.
    ///
    /// # Errors
    /// Returns [`RumorError::Config`] if `config` does not validate.
    pub fn with_counters(
        repository: R,
        validator: V,
        config: RumorConfig,
        counters: Arc<RumorCounters>,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.general.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            repository,
            validator,
            generator: MutationGenerator::new(config.mutation.clone()),
            config,
            rng: Mutex::new(rng),
            locks: DashMap::new(),
            counters,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RumorConfig {
        &self.config
    }

    /// The underlying repository.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Current counter values.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Validate input and start a new rumor.
    ///
    /// # Errors
    /// Returns [`RumorError::Validation`] for bad input, or a storage error.
    pub fn create(&self, input: RawRumorInput) -> Result<Rumor> {
        let new = self.validator.validate_create_fields(input)?;
        let rumor = Rumor::create(new, Utc::now());
        self.repository.create(&rumor)?;
        RumorCounters::bump(&self.counters.rumors_created);
        info!(
            rumor = %rumor.id,
            originator = %rumor.originator,
            severity = %rumor.severity(),
            "Rumor started"
        );
        Ok(rumor)
    }

    /// Tell a rumor from one agent to another.
    ///
    /// # Errors
    /// Returns a validation error for bad agent ids or numbers,
    /// [`RumorError::RumorNotFound`], any precondition failure of
    /// [`Rumor::spread`], or [`RumorError::VersionConflict`].
    pub fn spread(&self, id: RumorId, mut request: SpreadRequest) -> Result<SpreadOutcome> {
        request.source = self.validator.validate_agent_id("source", request.source.as_str())?;
        request.target = self.validator.validate_agent_id("target", request.target.as_str())?;
        let outcome = self.transition(id, |rumor, rng, now| {
            rumor.spread(&request, &self.config.belief, &self.generator, rng, now)
        })?;
        RumorCounters::bump(&self.counters.spreads);
        if outcome.mutated {
            RumorCounters::bump(&self.counters.mutations);
        }
        Ok(outcome)
    }

    /// Age a rumor by `days_elapsed` days. Returns the amount subtracted.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`], a validation error, or
    /// [`RumorError::VersionConflict`].
    pub fn apply_time_decay(
        &self,
        id: RumorId,
        days_elapsed: f64,
        factors: &EnvironmentalFactors,
    ) -> Result<f64> {
        let amount = self.transition(id, |rumor, _, now| {
            rumor.apply_time_decay(days_elapsed, factors, &self.config.belief, now)
        })?;
        RumorCounters::bump(&self.counters.decay_passes);
        Ok(amount)
    }

    /// Apply counter-evidence. Returns the amount subtracted.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`], a validation error, or
    /// [`RumorError::VersionConflict`].
    pub fn contradict(&self, id: RumorId, strength: f64, source_credibility: f64) -> Result<f64> {
        let effect = self.transition(id, |rumor, rng, now| {
            rumor.contradict(strength, source_credibility, &self.config.belief, rng, now)
        })?;
        RumorCounters::bump(&self.counters.contradictions);
        Ok(effect)
    }

    /// Apply supporting evidence. Returns the raw boost.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`], a validation error, or
    /// [`RumorError::VersionConflict`].
    pub fn reinforce(&self, id: RumorId, strength: f64, source_credibility: f64) -> Result<f64> {
        let boost = self.transition(id, |rumor, _, now| {
            rumor.reinforce(strength, source_credibility, &self.config.belief, now)
        })?;
        RumorCounters::bump(&self.counters.reinforcements);
        Ok(boost)
    }

    /// Shift one agent's current believability by `delta`. Returns the new
    /// value.
    ///
    /// # Errors
    /// Returns a validation error for a bad agent id or delta,
    /// [`RumorError::RumorNotFound`], [`RumorError::AgentUnaware`], or
    /// [`RumorError::VersionConflict`].
    pub fn adjust_believability(&self, id: RumorId, agent: &str, delta: f64) -> Result<f64> {
        let agent = self.validator.validate_agent_id("agent", agent)?;
        self.transition(id, |rumor, _, now| rumor.adjust_believability(&agent, delta, now))
    }

    /// Change a rumor's listing status.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`] or [`RumorError::VersionConflict`].
    pub fn set_status(&self, id: RumorId, status: RumorStatus) -> Result<Rumor> {
        self.transition(id, |rumor, _, now| {
            rumor.set_status(status, now);
            Ok(())
        })?;
        self.get(id)
    }

    /// Remove a rumor. Returns whether it existed.
    ///
    /// # Errors
    /// Returns a storage error if the delete fails.
    pub fn delete(&self, id: RumorId) -> Result<bool> {
        let lock = self.lock_for(id);
        let existed = {
            let _guard = lock.lock();
            self.repository.delete(id)?
        };
        self.locks.remove(&id);
        if existed {
            info!(rumor = %id, "Rumor deleted");
        }
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Load a rumor.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`] if it does not exist.
    pub fn get(&self, id: RumorId) -> Result<Rumor> {
        self.repository
            .get_by_id(id)?
            .ok_or(RumorError::RumorNotFound(id))
            .inspect_err(|e| self.record_failure(e))
    }

    /// Score a rumor's narrative impact.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`] if it does not exist.
    pub fn impact(&self, id: RumorId) -> Result<ImpactReport> {
        let rumor = self.get(id)?;
        let belief = &self.config.belief;
        let score = rumor.impact_score(belief);
        Ok(ImpactReport {
            rumor: id,
            score,
            level: ImpactLevel::from_score(score),
            severity: rumor.severity(),
            spread_count: rumor.spread_count(),
            distinct_agents: rumor.distinct_agents(),
            variant_count: rumor.variant_count(),
            average_believability: rumor.average_believability(),
        })
    }

    /// List rumors newest first.
    ///
    /// # Errors
    /// Returns a validation error for a zero page or an oversized page.
    pub fn list(&self, query: &ListQuery) -> Result<RumorPage> {
        let mut errors = ValidationErrors::new();
        if query.page == 0 {
            errors.push("page", "pages start at 1");
        }
        let max = self.config.validation.max_page_size;
        if query.page_size == 0 || query.page_size > max {
            errors.push("page_size", format!("must be within [1, {max}]"));
        }
        errors.into_result(())?;
        self.repository.list(query)
    }

    /// Aggregate figures over every stored rumor.
    ///
    /// # Errors
    /// Returns a storage error if the rumors cannot be read.
    pub fn statistics(&self) -> Result<RumorStatistics> {
        self.repository.statistics()
    }

    /// Active rumors `agent` knows, strongest belief first. A non-empty
    /// `categories` keeps only rumors tagged with at least one of them.
    ///
    /// # Errors
    /// Returns a validation error for a bad agent id or threshold, or a
    /// storage error.
    pub fn rumors_for_agent(
        &self,
        agent: &str,
        min_believability: f64,
        categories: &[Category],
        limit: usize,
    ) -> Result<Vec<AgentRumorView>> {
        let agent = self.validator.validate_agent_id("agent", agent)?;
        let mut errors = ValidationErrors::new();
        check_unit(&mut errors, "min_believability", min_believability);
        errors.into_result(())?;

        let page_size = self.config.validation.max_page_size.max(1);
        let mut views = Vec::new();
        let mut query = ListQuery::first(page_size)
            .status(RumorStatus::Active)
            .categories(categories.iter().copied());
        loop {
            let page = self.repository.list(&query)?;
            for rumor in &page.items {
                let Some(record) = rumor.current_record(&agent) else {
                    continue;
                };
                if record.believability < min_believability {
                    continue;
                }
                views.push(AgentRumorView {
                    rumor: rumor.id,
                    content: rumor.content_known_by(&agent).unwrap_or_default().to_string(),
                    believability: record.believability,
                    heard_from: record.heard_from.clone(),
                    heard_at: record.timestamp,
                    severity: rumor.severity(),
                });
            }
            if query.offset() + page.items.len() >= page.total || page.items.is_empty() {
                break;
            }
            query.page += 1;
        }

        views.sort_by_key(|v| std::cmp::Reverse(OrderedFloat(v.believability)));
        views.truncate(limit);
        debug!(agent = %agent, found = views.len(), "Collected rumors known by agent");
        Ok(views)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_for(&self, id: RumorId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().value().clone()
    }

    /// Drop the lock entry of a rumor that turned out not to exist, unless
    /// another caller is holding or waiting on it.
    fn release_missing(&self, id: RumorId) {
        self.locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn record_failure(&self, err: &RumorError) {
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::InvalidState => {
                RumorCounters::bump(&self.counters.precondition_failures);
            }
            ErrorKind::Conflict => RumorCounters::bump(&self.counters.version_conflicts),
            _ => {}
        }
    }

    /// Load, apply `op`, and persist under the rumor's lock.
    fn transition<T>(
        &self,
        id: RumorId,
        op: impl FnOnce(&mut Rumor, &mut StdRng, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let lock = self.lock_for(id);
        let guard = lock.lock();

        let mut rumor = match self.get(id) {
            Ok(rumor) => rumor,
            Err(err) => {
                drop(guard);
                drop(lock);
                if matches!(err, RumorError::RumorNotFound(_)) {
                    self.release_missing(id);
                }
                return Err(err);
            }
        };
        let value = {
            let mut rng = self.rng.lock();
            op(&mut rumor, &mut *rng, Utc::now())
        }
        .inspect_err(|e| self.record_failure(e))?;
        self.repository
            .update(&mut rumor)
            .inspect_err(|e| self.record_failure(e))?;
        Ok(value)
    }
}
