//! Core type definitions for the rumor engine.
//!
//! Identifiers, the categorical enums that classify a rumor, and the
//! explicit context structs read by `spread`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a rumor aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RumorId(pub Uuid);

impl RumorId {
    /// Create a new random rumor ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RumorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a variant within a rumor's lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(pub Uuid);

impl VariantId {
    /// Create a new random variant ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VariantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RumorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a social agent (NPC, player, faction spokesperson).
///
/// Agents are modelled elsewhere; the engine only compares identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Wrap an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A string did not name a known label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseLabelError {
    /// Which label set was being parsed.
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

/// Narrative weight of a rumor, ordered from least to most consequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Idle gossip.
    Trivial,
    /// Interesting but not consequential.
    Minor,
    /// Could affect a reputation.
    Moderate,
    /// Could affect relationships or alliances.
    Major,
    /// Could trigger major world events.
    Critical,
}

impl Severity {
    /// All five levels in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Trivial,
        Self::Minor,
        Self::Moderate,
        Self::Major,
        Self::Critical,
    ];

    /// Canonical lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == needle)
            .ok_or_else(|| ParseLabelError {
                kind: "severity",
                value: s.to_string(),
            })
    }
}

/// Topic tag of a rumor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Rulers, councils, succession.
    Political,
    /// A named individual's private life.
    Personal,
    /// Community standing and customs.
    Social,
    /// Armies, raids, fortifications.
    Military,
    /// Trade, prices, harvests.
    Economic,
    /// Temples, heresies, omens.
    Religious,
    /// Old events retold.
    Historical,
    /// Pure chatter.
    Gossip,
    /// Anything else.
    Other,
}

impl Category {
    /// Every category.
    pub const ALL: [Self; 9] = [
        Self::Political,
        Self::Personal,
        Self::Social,
        Self::Military,
        Self::Economic,
        Self::Religious,
        Self::Historical,
        Self::Gossip,
        Self::Other,
    ];

    /// Canonical lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Political => "political",
            Self::Personal => "personal",
            Self::Social => "social",
            Self::Military => "military",
            Self::Economic => "economic",
            Self::Religious => "religious",
            Self::Historical => "historical",
            Self::Gossip => "gossip",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| ParseLabelError {
                kind: "category",
                value: s.to_string(),
            })
    }
}

/// Listing status of a rumor. Managed by the storage layer, never by the
/// numeric operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RumorStatus {
    /// Still circulating.
    #[default]
    Active,
    /// Retired from circulation.
    Inactive,
}

impl RumorStatus {
    /// Canonical lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RumorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RumorStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(ParseLabelError {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// An agent's relationship to a rumor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Awareness {
    /// The agent has no spread record.
    Unaware,
    /// The agent has heard the rumor at least once.
    Aware,
}

/// Categorical bucket of an impact score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// Score below 0.2.
    Minimal,
    /// Score in [0.2, 0.4).
    Low,
    /// Score in [0.4, 0.6).
    Moderate,
    /// Score in [0.6, 0.8).
    High,
    /// Score of 0.8 or more.
    Critical,
}

impl ImpactLevel {
    /// Bucket an impact score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Moderate
        } else if score >= 0.2 {
            Self::Low
        } else {
            Self::Minimal
        }
    }
}

// ---------------------------------------------------------------------------
// Spread context
// ---------------------------------------------------------------------------

/// Social setting of a single retelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialContext {
    /// How credible the teller is to the listener (0.0–1.0).
    pub source_credibility: f64,
    /// Fields the engine does not read (location type, time of day, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SocialContext {
    /// Context with the given source credibility and no extra fields.
    #[must_use]
    pub fn with_credibility(source_credibility: f64) -> Self {
        Self {
            source_credibility,
            extra: BTreeMap::new(),
        }
    }
}

impl Default for SocialContext {
    fn default() -> Self {
        Self::with_credibility(0.5)
    }
}

/// Personality traits of the listener that shape belief and retelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverPersonality {
    /// Resistance to believing hearsay (0 = gullible, 1 = skeptic).
    pub skepticism: f64,
    /// Embellishes stories when retelling them.
    #[serde(default)]
    pub dramatic: bool,
    /// Hedges stories when retelling them.
    #[serde(default)]
    pub careful: bool,
    /// Traits the engine does not read.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ReceiverPersonality {
    /// A listener with the given skepticism and no flags set.
    #[must_use]
    pub fn with_skepticism(skepticism: f64) -> Self {
        Self {
            skepticism,
            dramatic: false,
            careful: false,
            extra: BTreeMap::new(),
        }
    }
}

impl Default for ReceiverPersonality {
    fn default() -> Self {
        Self::with_skepticism(0.5)
    }
}

/// Named world conditions active while a rumor ages.
///
/// Each name is looked up in the configured modifier table; unknown names
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentalFactors(BTreeSet<String>);

impl EnvironmentalFactors {
    /// No active conditions.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Add an active condition (builder style).
    #[must_use]
    pub fn with(mut self, factor: impl Into<String>) -> Self {
        self.0.insert(factor.into());
        self
    }

    /// Iterate over the active condition names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether no condition is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for EnvironmentalFactors {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
