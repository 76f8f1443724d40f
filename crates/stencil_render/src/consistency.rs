//! Cross-document consistency checks.
//!
//! Documents are rendered independently, so nothing in the template layer
//! stops `values.yaml` and `security_group.tf` from naming the same resource
//! differently. Constraints declare which `(document, variable)` locations
//! must agree; the checker compares the values each document actually
//! exposed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use stencil_context::{IdentifierRule, REDACTED};
use stencil_templates::RenderedDocument;
use thiserror::Error;
use tracing::debug;

/// A variable as written into one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub document: String,
    pub variable: String,
}

impl Location {
    pub fn new(document: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            variable: variable.into(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.document, self.variable)
    }
}

/// Locations that must carry the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyConstraint {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<IdentifierRule>,
}

impl ConsistencyConstraint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            locations: Vec::new(),
            rule: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a location.
    pub fn at(mut self, document: impl Into<String>, variable: impl Into<String>) -> Self {
        self.locations.push(Location::new(document, variable));
        self
    }

    pub fn with_rule(mut self, rule: IdentifierRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn documents(&self) -> BTreeSet<&str> {
        self.locations.iter().map(|l| l.document.as_str()).collect()
    }
}

/// The value seen at one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedValue {
    pub location: Location,
    pub value: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("constraint '{constraint}' has diverging values: {}", list(.values))]
    Divergent {
        constraint: String,
        values: Vec<ObservedValue>,
    },

    #[error("constraint '{constraint}': {document} never references '{variable}'")]
    NotExposed {
        constraint: String,
        document: String,
        variable: String,
    },

    #[error("constraint '{constraint}': value {value:?} of '{variable}' is not a valid {rule}: {reason}")]
    RuleViolation {
        constraint: String,
        variable: String,
        value: String,
        rule: IdentifierRule,
        reason: String,
    },
}

fn list(values: &[ObservedValue]) -> String {
    values
        .iter()
        .map(|v| format!("{} = {:?}", v.location, v.value))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConsistencyError {
    pub fn constraint(&self) -> &str {
        match self {
            ConsistencyError::Divergent { constraint, .. }
            | ConsistencyError::NotExposed { constraint, .. }
            | ConsistencyError::RuleViolation { constraint, .. } => constraint,
        }
    }
}

/// Checks rendered documents against a list of constraints.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker<'a> {
    constraints: &'a [ConsistencyConstraint],
    marker: String,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(constraints: &'a [ConsistencyConstraint]) -> Self {
        Self {
            constraints,
            marker: REDACTED.to_string(),
        }
    }

    pub fn with_redaction_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Check every constraint whose documents all rendered.
    ///
    /// Constraints touching a document in `failed` are skipped; that
    /// document's own errors already explain the failure.
    pub fn check(
        &self,
        documents: &BTreeMap<String, RenderedDocument>,
        failed: &BTreeSet<String>,
    ) -> Vec<ConsistencyError> {
        let mut errors = Vec::new();

        for constraint in self.constraints {
            if constraint.documents().iter().any(|d| failed.contains(*d)) {
                debug!("Skipping constraint {}: a document failed", constraint.id);
                continue;
            }
            errors.extend(self.check_one(constraint, documents));
        }

        errors
    }

    fn check_one(
        &self,
        constraint: &ConsistencyConstraint,
        documents: &BTreeMap<String, RenderedDocument>,
    ) -> Vec<ConsistencyError> {
        let mut observed = Vec::new();
        let mut missing = Vec::new();
        let mut sensitive = false;

        for location in &constraint.locations {
            let exposure = documents
                .get(&location.document)
                .and_then(|doc| doc.exposures_of(&location.variable).next());
            match exposure {
                Some(exposure) => {
                    sensitive |= exposure.sensitive;
                    observed.push(ObservedValue {
                        location: location.clone(),
                        value: exposure.value.clone(),
                    });
                }
                None => missing.push(ConsistencyError::NotExposed {
                    constraint: constraint.id.clone(),
                    document: location.document.clone(),
                    variable: location.variable.clone(),
                }),
            }
        }

        if !missing.is_empty() {
            return missing;
        }

        let distinct: BTreeSet<&str> = observed.iter().map(|o| o.value.as_str()).collect();
        if distinct.len() > 1 {
            if sensitive {
                for o in &mut observed {
                    o.value = self.marker.clone();
                }
            }
            return vec![ConsistencyError::Divergent {
                constraint: constraint.id.clone(),
                values: observed,
            }];
        }

        let (Some(rule), Some(first)) = (constraint.rule, observed.first()) else {
            return Vec::new();
        };
        match rule.check(&first.value) {
            Ok(()) => Vec::new(),
            Err(reason) => vec![ConsistencyError::RuleViolation {
                constraint: constraint.id.clone(),
                variable: first.location.variable.clone(),
                value: if sensitive {
                    self.marker.clone()
                } else {
                    first.value.clone()
                },
                rule,
                reason,
            }],
        }
    }
}
