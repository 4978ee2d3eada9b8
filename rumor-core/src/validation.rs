//! Field validation for rumor input.
//!
//! Raw input arrives as loosely typed strings and numbers. A [`Validator`]
//! turns it into a typed [`NewRumor`] or reports every problem it found,
//! not just the first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::rumor::NewRumor;
use crate::types::{AgentId, Category, Severity};

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

/// Every field problem found in one input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// No errors yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    /// Record a problem with `field`.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Whether no problem was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of problems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The recorded problems in order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether `field` has at least one problem.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// `Ok(value)` if nothing was recorded, otherwise `Err(self)`.
    ///
    /// # Errors
    /// Returns `self` when it holds at least one problem.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check that a number is finite and within `[min, max]`.
pub fn check_range(errors: &mut ValidationErrors, field: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() {
        errors.push(field, "must be a finite number");
    } else if !(min..=max).contains(&value) {
        errors.push(field, format!("must be within [{min}, {max}] (got {value})"));
    }
}

/// Check that a number is finite and within `[0, 1]`.
pub fn check_unit(errors: &mut ValidationErrors, field: &str, value: f64) {
    check_range(errors, field, value, 0.0, 1.0);
}

/// Unvalidated creation input, as a calling layer would receive it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRumorInput {
    /// Identifier of the agent who starts the rumor.
    pub originator: String,
    /// The original statement.
    pub content: String,
    /// Category labels; empty means `other`.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Severity label.
    pub severity: String,
    /// Objective accuracy in [0, 1].
    pub truth_value: f64,
    /// Free-form properties stored with the rumor.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Field validation used before a rumor is created or acted upon.
pub trait Validator: Send + Sync {
    /// Validate and normalize creation input.
    ///
    /// # Errors
    /// Returns every field problem found.
    fn validate_create_fields(&self, input: RawRumorInput) -> Result<NewRumor, ValidationErrors>;

    /// Parse a severity label.
    ///
    /// # Errors
    /// Returns a `severity` field error for unknown labels.
    fn validate_severity(&self, value: &str) -> Result<Severity, ValidationErrors>;

    /// Parse category labels. An empty list normalizes to `{other}`.
    ///
    /// # Errors
    /// Returns a `categories` field error for unknown labels or too many tags.
    fn validate_categories(&self, values: &[String]) -> Result<BTreeSet<Category>, ValidationErrors>;

    /// Check an agent identifier.
    ///
    /// # Errors
    /// Returns a field error named `field` for empty or oversized identifiers.
    fn validate_agent_id(&self, field: &str, value: &str) -> Result<AgentId, ValidationErrors>;
}

/// Validator driven by `[validation]` limits.
#[derive(Debug, Clone, Default)]
pub struct DefaultValidator {
    config: ValidationConfig,
}

impl DefaultValidator {
    /// Create a validator with the given limits.
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// The limits in use.
    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    fn check_content(&self, errors: &mut ValidationErrors, content: &str) {
        let chars = content.chars().count();
        if content.trim().is_empty() {
            errors.push("content", "must not be empty");
        } else if chars > self.config.max_content_chars {
            errors.push(
                "content",
                format!(
                    "too long: {chars} chars (max: {})",
                    self.config.max_content_chars
                ),
            );
        }
    }
}

impl Validator for DefaultValidator {
    fn validate_create_fields(&self, input: RawRumorInput) -> Result<NewRumor, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let originator = self
            .validate_agent_id("originator", &input.originator)
            .map_err(|e| errors.0.extend(e.0))
            .ok();
        self.check_content(&mut errors, &input.content);
        let severity = self
            .validate_severity(&input.severity)
            .map_err(|e| errors.0.extend(e.0))
            .ok();
        let categories = self
            .validate_categories(&input.categories)
            .map_err(|e| errors.0.extend(e.0))
            .ok();
        check_unit(&mut errors, "truth_value", input.truth_value);

        match (originator, severity, categories) {
            (Some(originator), Some(severity), Some(categories)) if errors.is_empty() => Ok(NewRumor {
                originator,
                text: input.content.trim().to_string(),
                categories,
                severity,
                truth_value: input.truth_value,
                properties: input.properties,
            }),
            _ => Err(errors),
        }
    }

    fn validate_severity(&self, value: &str) -> Result<Severity, ValidationErrors> {
        value.parse::<Severity>().map_err(|e| {
            let allowed: Vec<&str> = Severity::ALL.iter().map(|s| s.as_str()).collect();
            ValidationErrors::single("severity", format!("{e}; expected one of {}", allowed.join(", ")))
        })
    }

    fn validate_categories(&self, values: &[String]) -> Result<BTreeSet<Category>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if values.len() > self.config.max_categories {
            errors.push(
                "categories",
                format!("too many tags: {} (max: {})", values.len(), self.config.max_categories),
            );
        }
        let mut categories = BTreeSet::new();
        for value in values {
            match value.parse::<Category>() {
                Ok(category) => {
                    categories.insert(category);
                }
                Err(e) => errors.push("categories", e.to_string()),
            }
        }
        if categories.is_empty() && errors.is_empty() {
            categories.insert(Category::Other);
        }
        errors.into_result(categories)
    }

    fn validate_agent_id(&self, field: &str, value: &str) -> Result<AgentId, ValidationErrors> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationErrors::single(field, "must not be empty"));
        }
        let chars = trimmed.chars().count();
        if chars > self.config.max_agent_id_chars {
            return Err(ValidationErrors::single(
                field,
                format!("too long: {chars} chars (max: {})", self.config.max_agent_id_chars),
            ));
        }
        Ok(AgentId::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RawRumorInput {
        RawRumorInput {
            originator: "miller".into(),
            content: "The baron hid gold at the mill".into(),
            categories: vec!["Political".into(), "gossip".into()],
            severity: "minor".into(),
            truth_value: 0.8,
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_input_is_normalized() {
        let new = DefaultValidator::default().validate_create_fields(input()).expect("valid");
        assert_eq!(new.originator, AgentId::from("miller"));
        assert_eq!(new.severity, Severity::Minor);
        assert!(new.categories.contains(&Category::Political));
        assert!(new.categories.contains(&Category::Gossip));
    }

    #[test]
    fn empty_categories_become_other() {
        let validator = DefaultValidator::default();
        let categories = validator.validate_categories(&[]).expect("valid");
        assert_eq!(categories.into_iter().collect::<Vec<_>>(), vec![Category::Other]);
    }

    #[test]
    fn every_bad_field_is_reported() {
        let raw = RawRumorInput {
            originator: "  ".into(),
            content: String::new(),
            categories: vec!["weather".into()],
            severity: "apocalyptic".into(),
            truth_value: 1.5,
            properties: BTreeMap::new(),
        };
        let errors = DefaultValidator::default().validate_create_fields(raw).unwrap_err();
        for field in ["originator", "content", "categories", "severity", "truth_value"] {
            assert!(errors.has_field(field), "missing error for {field}: {errors}");
        }
    }

    #[test]
    fn content_length_limit_counts_chars() {
        let validator = DefaultValidator::new(ValidationConfig {
            max_content_chars: 5,
            ..ValidationConfig::default()
        });
        let mut raw = input();
        raw.content = "ééééé".into();
        assert!(validator.validate_create_fields(raw.clone()).is_ok());
        raw.content = "éééééé".into();
        assert!(validator.validate_create_fields(raw).unwrap_err().has_field("content"));
    }

    #[test]
    fn nan_is_rejected() {
        let mut errors = ValidationErrors::new();
        check_unit(&mut errors, "strength", f64::NAN);
        check_range(&mut errors, "modifier", -1.0, -1.0, 1.0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.to_string(), "strength: must be a finite number");
    }
}
