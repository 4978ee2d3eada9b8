//! Lineage Store: how a rumor's wording has mutated.
//!
//! Variants live in a flat arena and point at their parent by ID. The first
//! entry is always the parentless original; every later entry attaches to a
//! variant that already exists, so the arena is a tree by construction.
//! The invariant is re-checked when a lineage is deserialized.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RumorError};
use crate::types::{AgentId, VariantId};

/// Which transformation rule fired while retelling a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    /// An uncertainty phrase was prefixed.
    Uncertainty,
    /// A location preposition was made vaguer.
    LocationVagueness,
    /// An intensity phrase was prefixed.
    Intensity,
    /// A hedging phrase was prefixed.
    Hedging,
}

/// Traceability data attached to a mutated variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationMetadata {
    /// Rules applied, in order.
    pub transformations: Vec<Transformation>,
    /// Text of the parent variant before mutation.
    pub original_text: String,
    /// Free-form annotations.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One wording of a rumor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique identifier.
    pub id: VariantId,
    /// The wording.
    pub text: String,
    /// The variant this one was retold from; `None` for the original.
    pub parent: Option<VariantId>,
    /// Agent whose retelling produced this wording.
    pub creator: AgentId,
    /// How the wording was produced; `None` for the original.
    pub mutation: Option<MutationMetadata>,
    /// When the variant was created.
    pub created_at: DateTime<Utc>,
}

impl Variant {
    /// Whether this is the original, parentless wording.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Append-only arena of variants forming a tree rooted at the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Variant>", into = "Vec<Variant>")]
pub struct LineageStore {
    variants: Vec<Variant>,
}

impl LineageStore {
    /// Start a lineage from the original wording.
    #[must_use]
    pub fn with_root(text: impl Into<String>, creator: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            variants: vec![Variant {
                id: VariantId::new(),
                text: text.into(),
                parent: None,
                creator,
                mutation: None,
                created_at: now,
            }],
        }
    }

    /// The original wording.
    #[must_use]
    pub fn root(&self) -> &Variant {
        // Non-empty by construction and by `TryFrom`.
        &self.variants[0]
    }

    /// Look up a variant.
    #[must_use]
    pub fn get(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Whether the variant belongs to this lineage.
    #[must_use]
    pub fn contains(&self, id: VariantId) -> bool {
        self.get(id).is_some()
    }

    /// Number of variants, the original included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Always `false`: a lineage holds at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Variants in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    /// Attach a new wording under an existing variant.
    ///
    /// # Errors
    /// Returns [`RumorError::VariantNotFound`] if `parent` is not in this
    /// lineage; nothing is appended in that case.
    pub fn append(
        &mut self,
        parent: VariantId,
        text: impl Into<String>,
        creator: AgentId,
        mutation: MutationMetadata,
        now: DateTime<Utc>,
    ) -> Result<VariantId> {
        if !self.contains(parent) {
            return Err(RumorError::VariantNotFound(parent));
        }
        let id = VariantId::new();
        self.variants.push(Variant {
            id,
            text: text.into(),
            parent: Some(parent),
            creator,
            mutation: Some(mutation),
            created_at: now,
        });
        Ok(id)
    }

    /// Direct descendants of a variant.
    pub fn children(&self, id: VariantId) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(move |v| v.parent == Some(id))
    }

    /// The chain from `id` up to the root, starting with `id` itself.
    ///
    /// # Errors
    /// Returns [`RumorError::VariantNotFound`] if `id` is not in this lineage.
    pub fn ancestry(&self, id: VariantId) -> Result<Vec<&Variant>> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let variant = self.get(current).ok_or(RumorError::VariantNotFound(current))?;
            chain.push(variant);
            cursor = variant.parent;
        }
        Ok(chain)
    }

    /// Number of retellings between `id` and the original (root is 0).
    ///
    /// # Errors
    /// Returns [`RumorError::VariantNotFound`] if `id` is not in this lineage.
    pub fn depth(&self, id: VariantId) -> Result<usize> {
        Ok(self.ancestry(id)?.len() - 1)
    }
}

impl TryFrom<Vec<Variant>> for LineageStore {
    type Error = RumorError;

    fn try_from(variants: Vec<Variant>) -> Result<Self> {
        let Some(first) = variants.first() else {
            return Err(RumorError::CorruptLineage("lineage has no root variant".into()));
        };
        if !first.is_root() {
            return Err(RumorError::CorruptLineage(format!(
                "first variant {} has a parent",
                first.id
            )));
        }
        // Each parent must appear earlier in the arena, which also rules out cycles.
        let mut seen = HashSet::with_capacity(variants.len());
        for variant in &variants {
            match variant.parent {
                None if !seen.is_empty() => {
                    return Err(RumorError::CorruptLineage(format!(
                        "second root variant {}",
                        variant.id
                    )));
                }
                Some(parent) if !seen.contains(&parent) => {
                    return Err(RumorError::CorruptLineage(format!(
                        "variant {} references unknown parent {parent}",
                        variant.id
                    )));
                }
                _ => {}
            }
            if !seen.insert(variant.id) {
                return Err(RumorError::CorruptLineage(format!(
                    "duplicate variant id {}",
                    variant.id
                )));
            }
        }
        Ok(Self { variants })
    }
}

impl From<LineageStore> for Vec<Variant> {
    fn from(store: LineageStore) -> Self {
        store.variants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage() -> LineageStore {
        LineageStore::with_root("The baron hid gold at the mill", AgentId::from("miller"), Utc::now())
    }

    fn metadata(original: &str) -> MutationMetadata {
        MutationMetadata {
            transformations: vec![Transformation::Uncertainty],
            original_text: original.to_string(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn root_has_no_parent() {
        let store = lineage();
        assert_eq!(store.len(), 1);
        assert!(store.root().is_root());
        assert!(store.root().mutation.is_none());
    }

    #[test]
    fn append_links_to_parent() {
        let mut store = lineage();
        let root = store.root().id;
        let child = store
            .append(root, "Allegedly, the baron hid gold", AgentId::from("smith"), metadata("x"), Utc::now())
            .expect("append");
        let grandchild = store
            .append(child, "Definitely the baron hid gold", AgentId::from("bard"), metadata("y"), Utc::now())
            .expect("append");

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(child).and_then(|v| v.parent), Some(root));
        assert_eq!(store.depth(grandchild).expect("depth"), 2);
        let chain: Vec<VariantId> = store.ancestry(grandchild).expect("ancestry").iter().map(|v| v.id).collect();
        assert_eq!(chain, vec![grandchild, child, root]);
        assert_eq!(store.children(root).count(), 1);
    }

    #[test]
    fn append_to_unknown_parent_is_rejected() {
        let mut store = lineage();
        let stranger = VariantId::new();
        let err = store
            .append(stranger, "text", AgentId::from("smith"), metadata("x"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RumorError::VariantNotFound(id) if id == stranger));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deserialization_rejects_orphans() {
        let store = lineage();
        let mut raw: Vec<Variant> = store.into();
        raw.push(Variant {
            id: VariantId::new(),
            text: "orphan".into(),
            parent: Some(VariantId::new()),
            creator: AgentId::from("ghost"),
            mutation: None,
            created_at: Utc::now(),
        });
        let json = serde_json::to_string(&raw).expect("serialize");
        let result: std::result::Result<LineageStore, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }

    #[test]
    fn deserialization_rejects_empty_lineage() {
        let result: std::result::Result<LineageStore, _> = serde_json::from_str("[]");
        assert!(result.is_err());
    }

    #[test]
    fn serde_round_trip_preserves_tree() {
        let mut store = lineage();
        let root = store.root().id;
        store
            .append(root, "I heard that the baron hid gold", AgentId::from("smith"), metadata("x"), Utc::now())
            .expect("append");
        let json = serde_json::to_string(&store).expect("serialize");
        let back: LineageStore = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, store);
    }
}
