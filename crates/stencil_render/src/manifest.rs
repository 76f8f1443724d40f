//! Template set definitions.
//!
//! A template set is the unit of rendering: an ordered list of documents
//! plus the consistency constraints between them. Sets are plain data and
//! can be loaded from YAML.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stencil_templates::OutputFormat;

use crate::consistency::ConsistencyConstraint;
use crate::error::{RenderError, RenderResult};

/// One template of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDocument {
    /// Document name, also the output file name (e.g. "values.yaml")
    pub name: String,
    /// Output format; inferred from the name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    /// Template text
    pub source: String,
}

impl TemplateDocument {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: None,
            source: source.into(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Declared format, else the one implied by the file extension, else plain.
    pub fn format(&self) -> OutputFormat {
        self.format
            .or_else(|| OutputFormat::from_file_name(&self.name))
            .unwrap_or(OutputFormat::Plain)
    }
}

/// Documents rendered together from one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSet {
    /// Unique identifier (e.g. "mysql")
    pub id: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Documents in render order
    pub documents: Vec<TemplateDocument>,
    /// Locations that must agree across documents
    #[serde(default)]
    pub constraints: Vec<ConsistencyConstraint>,
}

impl TemplateSet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            documents: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_document(mut self, document: TemplateDocument) -> Self {
        self.documents.push(document);
        self
    }

    pub fn with_constraint(mut self, constraint: ConsistencyConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn document(&self, name: &str) -> Option<&TemplateDocument> {
        self.documents.iter().find(|d| d.name == name)
    }

    /// Parse a set from YAML. The result is not validated.
    pub fn from_yaml_str(yaml: &str) -> RenderResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RenderError::InvalidTemplateSet {
            set: "<yaml>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> RenderResult<String> {
        serde_yaml::to_string(self).map_err(|e| RenderError::InvalidTemplateSet {
            set: self.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Check the set's structure, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<RenderError>> {
        let mut errors = Vec::new();
        let mut invalid = |reason: String| {
            errors.push(RenderError::InvalidTemplateSet {
                set: self.id.clone(),
                reason,
            })
        };

        if self.id.trim().is_empty() {
            invalid("id must not be empty".to_string());
        }
        if self.documents.is_empty() {
            invalid("no documents".to_string());
        }

        let mut names = BTreeSet::new();
        for document in &self.documents {
            if document.name.trim().is_empty() {
                invalid("document name must not be empty".to_string());
            } else if !names.insert(document.name.as_str()) {
                invalid(format!("duplicate document '{}'", document.name));
            }
        }

        let mut constraint_ids = BTreeSet::new();
        for constraint in &self.constraints {
            if !constraint_ids.insert(constraint.id.as_str()) {
                invalid(format!("duplicate constraint '{}'", constraint.id));
            }
            if constraint.locations.len() < 2 {
                invalid(format!(
                    "constraint '{}' needs at least two locations",
                    constraint.id
                ));
            }
            for location in &constraint.locations {
                if !names.contains(location.document.as_str()) {
                    invalid(format!(
                        "constraint '{}' refers to unknown document '{}'",
                        constraint.id, location.document
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
