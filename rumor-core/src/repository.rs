//! Storage abstraction for rumor aggregates.
//!
//! A repository loads and stores whole [`Rumor`]s. Updates are guarded by
//! an optimistic version check: the write succeeds only if the stored
//! version equals the aggregate's, and then advances it by one.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RumorError};
use crate::rumor::Rumor;
use crate::types::{Category, RumorId, RumorStatus, Severity};

/// Filter and page selection for [`RumorRepository::list`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: usize,
    /// Items per page.
    pub page_size: usize,
    /// Only rumors with this status.
    pub status: Option<RumorStatus>,
    /// Case-insensitive substring of the original text.
    pub search: Option<String>,
    /// Only rumors tagged with at least one of these. Empty means any.
    #[serde(default)]
    pub categories: BTreeSet<Category>,
    /// Only rumors at least this severe.
    #[serde(default)]
    pub min_severity: Option<Severity>,
    /// Only rumors whose truth value is at least this.
    #[serde(default)]
    pub min_truth: Option<OrderedFloat<f64>>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            status: None,
            search: None,
            categories: BTreeSet::new(),
            min_severity: None,
            min_truth: None,
        }
    }
}

impl ListQuery {
    /// First page of `page_size` items.
    #[must_use]
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Select a page (builder style).
    #[must_use]
    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Filter by status (builder style).
    #[must_use]
    pub fn status(mut self, status: RumorStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by text (builder style).
    #[must_use]
    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    /// Filter by category tags (builder style). Repeated calls accumulate.
    #[must_use]
    pub fn categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories.extend(categories);
        self
    }

    /// Filter by minimum severity (builder style).
    #[must_use]
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Filter by minimum truth value (builder style).
    #[must_use]
    pub fn min_truth(mut self, truth: f64) -> Self {
        self.min_truth = Some(OrderedFloat(truth));
        self
    }

    /// Number of items skipped before this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.page_size)
    }

    /// The lowercased search needle, if any non-blank one was given.
    #[must_use]
    pub fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether `rumor` passes every filter.
    #[must_use]
    pub fn matches(&self, rumor: &Rumor) -> bool {
        self.status.is_none_or(|s| rumor.status() == s)
            && self
                .needle()
                .is_none_or(|n| rumor.original_text.to_lowercase().contains(&n))
            && (self.categories.is_empty() || !self.categories.is_disjoint(&rumor.categories))
            && self.min_severity.is_none_or(|s| rumor.severity() >= s)
            && self.min_truth.is_none_or(|t| rumor.truth_value() >= t.0)
    }
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct RumorPage {
    /// Rumors on this page, newest first.
    pub items: Vec<Rumor>,
    /// Number of rumors matching the filters across all pages.
    pub total: usize,
    /// The page that was requested.
    pub page: usize,
    /// The page size that was requested.
    pub page_size: usize,
}

impl RumorPage {
    /// Number of pages needed for `total` items.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }
}

/// Aggregate figures over every stored rumor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RumorStatistics {
    /// Stored rumors.
    pub total_rumors: usize,
    /// Rumors with status `active`.
    pub active_rumors: usize,
    /// Rumor count per severity.
    pub severity_distribution: BTreeMap<Severity, usize>,
    /// Rumor count per category tag.
    pub category_distribution: BTreeMap<Category, usize>,
    /// Mean truth value.
    pub average_truth_value: f64,
    /// Mean of each rumor's average believability.
    pub average_believability: f64,
    /// Mean spread count per rumor.
    pub average_spread_count: f64,
    /// Variants across all rumors.
    pub total_variants: usize,
    /// Spread records across all rumors.
    pub total_spreads: usize,
}

impl RumorStatistics {
    /// Compute statistics over `rumors`.
    pub fn from_rumors<'a>(rumors: impl IntoIterator<Item = &'a Rumor>) -> Self {
        let mut stats = Self::default();
        let mut truth = 0.0;
        let mut belief = 0.0;
        for rumor in rumors {
            stats.total_rumors += 1;
            if rumor.status() == RumorStatus::Active {
                stats.active_rumors += 1;
            }
            *stats.severity_distribution.entry(rumor.severity()).or_default() += 1;
            for category in &rumor.categories {
                *stats.category_distribution.entry(*category).or_default() += 1;
            }
            truth += rumor.truth_value();
            belief += rumor.average_believability();
            stats.total_variants += rumor.variant_count();
            stats.total_spreads += rumor.spread_count();
        }
        if stats.total_rumors > 0 {
            let n = stats.total_rumors as f64;
            stats.average_truth_value = truth / n;
            stats.average_believability = belief / n;
            stats.average_spread_count = stats.total_spreads as f64 / n;
        }
        stats
    }
}

/// Durable storage for rumor aggregates.
pub trait RumorRepository: Send + Sync {
    /// Load a rumor.
    ///
    /// # Errors
    /// Returns a storage error if the rumor cannot be read.
    fn get_by_id(&self, id: RumorId) -> Result<Option<Rumor>>;

    /// Store a new rumor.
    ///
    /// # Errors
    /// Returns [`RumorError::VersionConflict`] if the id is already taken.
    fn create(&self, rumor: &Rumor) -> Result<()>;

    /// Replace a stored rumor and advance `rumor.version` by one.
    ///
    /// # Errors
    /// Returns [`RumorError::RumorNotFound`] if nothing is stored under the
    /// id, or [`RumorError::VersionConflict`] if another writer got there
    /// first. `rumor.version` is left unchanged on error.
    fn update(&self, rumor: &mut Rumor) -> Result<()>;

    /// Remove a rumor. Returns whether it existed.
    ///
    /// # Errors
    /// Returns a storage error if the delete fails.
    fn delete(&self, id: RumorId) -> Result<bool>;

    /// List rumors newest first.
    ///
    /// # Errors
    /// Returns a storage error if the listing fails.
    fn list(&self, query: &ListQuery) -> Result<RumorPage>;

    /// Aggregate figures over every stored rumor.
    ///
    /// # Errors
    /// Returns a storage error if the rumors cannot be read.
    fn statistics(&self) -> Result<RumorStatistics>;
}

/// Newest first, ties broken by id so listings are stable.
pub(crate) fn newest_first(a: &Rumor, b: &Rumor) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Process-local repository backed by a hash map.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rumors: RwLock<HashMap<RumorId, Rumor>>,
}

impl InMemoryRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rumors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rumors.read().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rumors.read().is_empty()
    }
}

impl RumorRepository for InMemoryRepository {
    fn get_by_id(&self, id: RumorId) -> Result<Option<Rumor>> {
        Ok(self.rumors.read().get(&id).cloned())
    }

    fn create(&self, rumor: &Rumor) -> Result<()> {
        let mut rumors = self.rumors.write();
        if let Some(existing) = rumors.get(&rumor.id) {
            return Err(RumorError::VersionConflict {
                rumor: rumor.id,
                expected: rumor.version,
                found: existing.version,
            });
        }
        rumors.insert(rumor.id, rumor.clone());
        debug!(rumor = %rumor.id, "Stored new rumor");
        Ok(())
    }

    fn update(&self, rumor: &mut Rumor) -> Result<()> {
        let mut rumors = self.rumors.write();
        let stored = rumors.get_mut(&rumor.id).ok_or(RumorError::RumorNotFound(rumor.id))?;
        if stored.version != rumor.version {
            return Err(RumorError::VersionConflict {
                rumor: rumor.id,
                expected: rumor.version,
                found: stored.version,
            });
        }
        rumor.version += 1;
        *stored = rumor.clone();
        debug!(rumor = %rumor.id, version = rumor.version, "Updated rumor");
        Ok(())
    }

    fn delete(&self, id: RumorId) -> Result<bool> {
        Ok(self.rumors.write().remove(&id).is_some())
    }

    fn list(&self, query: &ListQuery) -> Result<RumorPage> {
        let rumors = self.rumors.read();
        let mut matching: Vec<&Rumor> = rumors.values().filter(|r| query.matches(r)).collect();
        matching.sort_by(|a, b| newest_first(a, b));
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.page_size)
            .cloned()
            .collect();
        Ok(RumorPage {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    fn statistics(&self) -> Result<RumorStatistics> {
        Ok(RumorStatistics::from_rumors(self.rumors.read().values()))
    }
}

/// Behaviour every repository must share, run against each implementation.
#[cfg(test)]
pub(crate) mod contract {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::rumor::NewRumor;
    use crate::types::AgentId;

    pub(crate) fn rumor(text: &str, severity: Severity, minutes: i64) -> Rumor {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid date");
        Rumor::create(
            NewRumor {
                originator: AgentId::from("ann"),
                text: text.to_string(),
                categories: BTreeSet::from([Category::Gossip]),
                severity,
                truth_value: 0.5,
                properties: BTreeMap::new(),
            },
            base + Duration::minutes(minutes),
        )
    }

    pub(crate) fn tagged(text: &str, severity: Severity, category: Category, truth: f64, minutes: i64) -> Rumor {
        let mut new = rumor(text, severity, minutes);
        new.categories = BTreeSet::from([category]);
        let mut json = serde_json::to_value(&new).expect("serialize");
        json["truth_value"] = serde_json::json!(truth);
        serde_json::from_value(json).expect("deserialize")
    }

    pub(crate) fn crud(repo: &dyn RumorRepository) {
        let mut r = rumor("The baron hid gold", Severity::Minor, 0);
        repo.create(&r).expect("create");
        assert!(repo.create(&r).is_err(), "duplicate create must fail");

        let loaded = repo.get_by_id(r.id).expect("get").expect("stored");
        assert_eq!(loaded.id, r.id);
        assert_eq!(loaded.lineage(), r.lineage());

        r.set_status(RumorStatus::Inactive, Utc::now());
        repo.update(&mut r).expect("update");
        assert_eq!(r.version, 1);
        let loaded = repo.get_by_id(r.id).expect("get").expect("stored");
        assert_eq!(loaded.status(), RumorStatus::Inactive);
        assert_eq!(loaded.version, 1);

        assert!(repo.delete(r.id).expect("delete"));
        assert!(!repo.delete(r.id).expect("delete again"));
        assert!(repo.get_by_id(r.id).expect("get").is_none());
    }

    pub(crate) fn stale_update(repo: &dyn RumorRepository) {
        let r = rumor("The mill is haunted", Severity::Trivial, 0);
        repo.create(&r).expect("create");
        let mut first = r.clone();
        let mut second = r;
        repo.update(&mut first).expect("first writer");
        let err = repo.update(&mut second).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(second.version, 0);

        let mut ghost = rumor("Nobody stored me", Severity::Trivial, 0);
        let err = repo.update(&mut ghost).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    pub(crate) fn listing(repo: &dyn RumorRepository) {
        let texts = ["Wolves near the ford", "The baron fled", "BARON owes the guild", "Rain tomorrow"];
        for (i, text) in texts.iter().enumerate() {
            repo.create(&rumor(text, Severity::Moderate, i as i64)).expect("create");
        }

        let page = repo.list(&ListQuery::first(3)).expect("list");
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages(), 2);
        let first: Vec<&str> = page.items.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(first, vec!["Rain tomorrow", "BARON owes the guild", "The baron fled"]);

        let second = repo.list(&ListQuery::first(3).page(2)).expect("list");
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].original_text, "Wolves near the ford");

        let found = repo.list(&ListQuery::first(10).search("baron")).expect("search");
        assert_eq!(found.total, 2);

        let none = repo.list(&ListQuery::first(10).status(RumorStatus::Inactive)).expect("status");
        assert_eq!(none.total, 0);
    }

    pub(crate) fn filtered_listing(repo: &dyn RumorRepository) {
        let fixtures = [
            ("Troops gather at the pass", Severity::Major, Category::Military, 0.9),
            ("The mayor takes bribes", Severity::Moderate, Category::Political, 0.25),
            ("The baker's wife left him", Severity::Trivial, Category::Personal, 0.75),
            ("The king will raise taxes", Severity::Critical, Category::Political, 0.5),
        ];
        for (i, (text, severity, category, truth)) in fixtures.into_iter().enumerate() {
            repo.create(&tagged(text, severity, category, truth, i as i64)).expect("create");
        }
        let texts = |query: ListQuery| -> Vec<String> {
            repo.list(&query)
                .expect("list")
                .items
                .into_iter()
                .map(|r| r.original_text)
                .collect()
        };

        assert_eq!(
            texts(ListQuery::first(10).categories([Category::Political])),
            vec!["The king will raise taxes", "The mayor takes bribes"]
        );
        assert_eq!(
            texts(ListQuery::first(10).categories([Category::Military, Category::Personal])),
            vec!["The baker's wife left him", "Troops gather at the pass"]
        );
        assert_eq!(
            texts(ListQuery::first(10).min_severity(Severity::Major)),
            vec!["The king will raise taxes", "Troops gather at the pass"]
        );
        assert_eq!(
            texts(ListQuery::first(10).min_truth(0.5)),
            vec!["The king will raise taxes", "The baker's wife left him", "Troops gather at the pass"]
        );
        assert_eq!(
            texts(
                ListQuery::first(10)
                    .categories([Category::Political])
                    .min_severity(Severity::Moderate)
                    .min_truth(0.3)
            ),
            vec!["The king will raise taxes"]
        );

        let paged = repo
            .list(&ListQuery::first(1).page(2).min_truth(0.5))
            .expect("list");
        assert_eq!(paged.total, 3);
        assert_eq!(paged.items[0].original_text, "The baker's wife left him");
    }

    pub(crate) fn statistics(repo: &dyn RumorRepository) {
        assert_eq!(repo.statistics().expect("stats"), RumorStatistics::default());
        repo.create(&rumor("a", Severity::Minor, 0)).expect("create");
        repo.create(&rumor("b", Severity::Critical, 1)).expect("create");
        let stats = repo.statistics().expect("stats");
        assert_eq!(stats.total_rumors, 2);
        assert_eq!(stats.active_rumors, 2);
        assert_eq!(stats.severity_distribution.get(&Severity::Critical), Some(&1));
        assert_eq!(stats.category_distribution.get(&Category::Gossip), Some(&2));
        assert!((stats.average_truth_value - 0.5).abs() < 1e-12);
        assert!((stats.average_believability - 1.0).abs() < 1e-12);
        assert_eq!(stats.total_spreads, 2);
    }
}
