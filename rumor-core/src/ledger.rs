//! Belief Ledger: who has heard which wording, and how much they believe it.
//!
//! Records are never removed. An agent's current belief is its record with
//! the latest timestamp; ties go to the record appended last.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Awareness, VariantId};

/// One agent's knowledge-and-belief snapshot at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadRecord {
    /// The hearer.
    pub agent: AgentId,
    /// The wording the hearer received.
    pub variant: VariantId,
    /// Who told them; `None` for the originator's own record.
    pub heard_from: Option<AgentId>,
    /// How strongly the hearer believes it (0.0–1.0).
    pub believability: f64,
    /// When the record was made.
    pub timestamp: DateTime<Utc>,
}

/// Append-only collection of spread records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeliefLedger {
    records: Vec<SpreadRecord>,
}

impl BeliefLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Believability is clamped to [0, 1].
    pub fn record(&mut self, mut record: SpreadRecord) {
        record.believability = record.believability.clamp(0.0, 1.0);
        self.records.push(record);
    }

    /// Number of records (the rumor's spread count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SpreadRecord> {
        self.records.iter()
    }

    /// Every record for one agent, oldest first.
    pub fn history_of<'a, 'b>(
        &'a self,
        agent: &'b AgentId,
    ) -> impl Iterator<Item = &'a SpreadRecord> + use<'a, 'b> {
        self.records.iter().filter(move |r| &r.agent == agent)
    }

    /// The agent's current belief state.
    #[must_use]
    pub fn current(&self, agent: &AgentId) -> Option<&SpreadRecord> {
        self.current_index(agent).map(|i| &self.records[i])
    }

    /// Shift the agent's current believability by `delta`, clamped to
    /// [0, 1]. Returns the new value, or `None` if the agent has no record.
    pub fn adjust_current(&mut self, agent: &AgentId, delta: f64) -> Option<f64> {
        let index = self.current_index(agent)?;
        let record = &mut self.records[index];
        record.believability = (record.believability + delta).clamp(0.0, 1.0);
        Some(record.believability)
    }

    // `max_by_key` keeps the last of equal keys, so later appends win ties.
    fn current_index(&self, agent: &AgentId) -> Option<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| &r.agent == agent)
            .max_by_key(|(_, r)| r.timestamp)
            .map(|(i, _)| i)
    }

    /// Whether the agent has heard the rumor.
    #[must_use]
    pub fn awareness(&self, agent: &AgentId) -> Awareness {
        if self.history_of(agent).next().is_some() {
            Awareness::Aware
        } else {
            Awareness::Unaware
        }
    }

    /// Number of distinct agents with at least one record.
    #[must_use]
    pub fn distinct_agents(&self) -> usize {
        self.records.iter().map(|r| &r.agent).collect::<HashSet<_>>().len()
    }

    /// Mean believability over all records (0.0 when empty).
    #[must_use]
    pub fn average_believability(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().map(|r| r.believability).sum::<f64>() / self.records.len() as f64
    }

    /// Rewrite every record's believability through `f`, clamping the result.
    pub fn adjust_all(&mut self, mut f: impl FnMut(f64) -> f64) {
        for record in &mut self.records {
            record.believability = f(record.believability).clamp(0.0, 1.0);
        }
    }
}
