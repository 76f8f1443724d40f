//! Resolved render context.
//!
//! A [`ResolvedContext`] maps variable names to typed values. It is built
//! once per render and never mutated afterwards; per-document variations are
//! expressed as new contexts via [`ResolvedContext::with_override`].

use std::collections::BTreeMap;

use crate::secret::REDACTED;
use crate::value::Value;

/// A single context entry.
#[derive(Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub value: Value,
    /// Sensitive entries are redacted from diagnostics and logs.
    pub sensitive: bool,
}

impl std::fmt::Debug for ContextEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.sensitive {
            write!(f, "{}", REDACTED)
        } else {
            write!(f, "{:?}", self.value)
        }
    }
}

/// Immutable mapping from variable name to typed value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolvedContext {
    entries: BTreeMap<String, ContextEntry>,
}

impl ResolvedContext {
    /// Start building a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn entry(&self, name: &str) -> Option<&ContextEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.sensitive)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Textual forms of every sensitive value, for redaction.
    pub fn secret_texts(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.sensitive)
            .map(|e| e.value.to_text())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Copy of this context with one entry replaced or added.
    ///
    /// The sensitivity tag of an existing entry is kept.
    pub fn with_override(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let sensitive = self.is_sensitive(&name);
        let mut entries = self.entries.clone();
        entries.insert(
            name,
            ContextEntry {
                value: value.into(),
                sensitive,
            },
        );
        Self { entries }
    }
}

impl std::fmt::Debug for ResolvedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Builder for [`ResolvedContext`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    entries: BTreeMap<String, ContextEntry>,
}

impl ContextBuilder {
    pub fn insert(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(
            name.into(),
            ContextEntry {
                value: value.into(),
                sensitive: false,
            },
        );
        self
    }

    /// Insert a value tagged as secret material.
    pub fn insert_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(
            name.into(),
            ContextEntry {
                value: Value::String(value.into()),
                sensitive: true,
            },
        );
        self
    }

    pub fn build(self) -> ResolvedContext {
        ResolvedContext {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lookup() {
        let ctx = ResolvedContext::builder()
            .insert("sanitized_name", "app1db")
            .insert("database_disk_size_in_gib", 10u32)
            .insert("publicly_accessible", true)
            .build();

        assert_eq!(ctx.get("sanitized_name"), Some(&Value::from("app1db")));
        assert_eq!(ctx.get("database_disk_size_in_gib").and_then(Value::as_i64), Some(10));
        assert!(ctx.get("missing").is_none());
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let ctx = ResolvedContext::builder()
            .insert("database_login", "admin")
            .insert_secret("database_password", "s3cr3t-pw")
            .build();

        let debug = format!("{:?}", ctx);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("s3cr3t-pw"));
        assert!(debug.contains(REDACTED));
        assert_eq!(ctx.secret_texts(), vec!["s3cr3t-pw".to_string()]);
    }

    #[test]
    fn test_override_keeps_original() {
        let base = ResolvedContext::builder().insert("cluster_id", "c-1").build();
        let changed = base.with_override("cluster_id", "c-2");

        assert_eq!(base.get("cluster_id"), Some(&Value::from("c-1")));
        assert_eq!(changed.get("cluster_id"), Some(&Value::from("c-2")));
    }

    #[test]
    fn test_override_keeps_sensitivity() {
        let base = ResolvedContext::builder()
            .insert_secret("database_password", "a")
            .build();
        let changed = base.with_override("database_password", "b");
        assert!(changed.is_sensitive("database_password"));
    }
}
