//! Runtime counters for the rumor engine.
//!
//! Lock-free `AtomicU64` counters bumped in the hot path by the service
//! and the cache, read through [`RumorCounters::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for engine events since startup.
#[derive(Debug, Default)]
pub struct RumorCounters {
    /// Rumors created.
    pub rumors_created: AtomicU64,
    /// Successful spreads.
    pub spreads: AtomicU64,
    /// Spreads that produced a new variant.
    pub mutations: AtomicU64,
    /// Time-decay passes applied.
    pub decay_passes: AtomicU64,
    /// Contradictions applied.
    pub contradictions: AtomicU64,
    /// Reinforcements applied.
    pub reinforcements: AtomicU64,
    /// Operations rejected for a missing rumor, variant or unaware agent.
    pub precondition_failures: AtomicU64,
    /// Updates rejected by the optimistic version check.
    pub version_conflicts: AtomicU64,
    /// Reads served from the cache.
    pub cache_hits: AtomicU64,
    /// Reads that fell through to storage.
    pub cache_misses: AtomicU64,
}

impl RumorCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rumors_created: AtomicU64::new(0),
            spreads: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
            decay_passes: AtomicU64::new(0),
            contradictions: AtomicU64::new(0),
            reinforcements: AtomicU64::new(0),
            precondition_failures: AtomicU64::new(0),
            version_conflicts: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Add one to `counter`.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            rumors_created: load(&self.rumors_created),
            spreads: load(&self.spreads),
            mutations: load(&self.mutations),
            decay_passes: load(&self.decay_passes),
            contradictions: load(&self.contradictions),
            reinforcements: load(&self.reinforcements),
            precondition_failures: load(&self.precondition_failures),
            version_conflicts: load(&self.version_conflicts),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Rumors created.
    pub rumors_created: u64,
    /// Successful spreads.
    pub spreads: u64,
    /// Spreads that produced a new variant.
    pub mutations: u64,
    /// Time-decay passes applied.
    pub decay_passes: u64,
    /// Contradictions applied.
    pub contradictions: u64,
    /// Reinforcements applied.
    pub reinforcements: u64,
    /// Rejected preconditions.
    pub precondition_failures: u64,
    /// Rejected stale updates.
    pub version_conflicts: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
}

impl CounterSnapshot {
    /// Fraction of cached reads that hit, or 0.0 before any read.
    #[must_use]
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("rumors_created", "Rumors created", self.rumors_created),
            ("spreads", "Successful spreads", self.spreads),
            ("mutations", "Spreads that created a variant", self.mutations),
            ("decay_passes", "Time-decay passes applied", self.decay_passes),
            ("contradictions", "Contradictions applied", self.contradictions),
            ("reinforcements", "Reinforcements applied", self.reinforcements),
            ("precondition_failures", "Rejected preconditions", self.precondition_failures),
            ("version_conflicts", "Stale updates rejected", self.version_conflicts),
            ("cache_hits", "Reads served from cache", self.cache_hits),
            ("cache_misses", "Reads that reached storage", self.cache_misses),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP rumor_{name}_total {help}\n# TYPE rumor_{name}_total counter\nrumor_{name}_total {value}\n"
            ));
        }
        out
    }
}
