//! Built-in template sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use stencil_context::IdentifierRule;
use tracing::debug;

use crate::consistency::ConsistencyConstraint;
use crate::error::RenderError;
use crate::manifest::{TemplateDocument, TemplateSet};

const MYSQL_VALUES: &str = include_str!("../templates/mysql/values.yaml");
const MYSQL_SECURITY_GROUP: &str = include_str!("../templates/mysql/security_group.tf");

/// Template sets available by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    sets: BTreeMap<String, Arc<TemplateSet>>,
}

impl TemplateCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the sets shipped with the crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .sets
            .insert("mysql".to_string(), Arc::new(mysql_set()));
        catalog
    }

    pub fn get(&self, id: &str) -> Option<Arc<TemplateSet>> {
        self.sets.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Add a set after validating it. An existing set with the same id is
    /// replaced.
    pub fn register(&mut self, set: TemplateSet) -> Result<(), Vec<RenderError>> {
        set.validate()?;
        debug!("Registering template set {}", set.id);
        self.sets.insert(set.id.clone(), Arc::new(set));
        Ok(())
    }
}

/// Helm values plus security group rules for a self-hosted MySQL database.
fn mysql_set() -> TemplateSet {
    const VALUES: &str = "values.yaml";
    const SECURITY_GROUP: &str = "security_group.tf";

    TemplateSet::new("mysql")
        .with_description("Self-hosted MySQL on Kubernetes with cloud security group rules")
        .with_document(TemplateDocument::new(VALUES, MYSQL_VALUES))
        .with_document(TemplateDocument::new(SECURITY_GROUP, MYSQL_SECURITY_GROUP))
        .with_constraint(
            ConsistencyConstraint::new("sanitized_name")
                .with_description("Application name labels the release and tags the rules")
                .at(VALUES, "sanitized_name")
                .at(SECURITY_GROUP, "sanitized_name")
                .with_rule(IdentifierRule::DnsLabel),
        )
        .with_constraint(
            ConsistencyConstraint::new("database_id")
                .at(VALUES, "id")
                .at(SECURITY_GROUP, "id")
                .with_rule(IdentifierRule::LabelValue),
        )
        .with_constraint(
            ConsistencyConstraint::new("environment_id")
                .at(VALUES, "environment_id")
                .at(SECURITY_GROUP, "environment_id")
                .with_rule(IdentifierRule::LabelValue),
        )
        .with_constraint(
            ConsistencyConstraint::new("database_port")
                .with_description("The service port is the port the rules open")
                .at(VALUES, "database_port")
                .at(SECURITY_GROUP, "database_port"),
        )
}
