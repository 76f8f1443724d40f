//! Failure report of a render.

use std::collections::BTreeMap;

use serde_json::json;

use crate::error::RenderError;
use crate::redact::Redactor;
use crate::state::RenderTrace;

/// Every error of a failed render, with its trace.
///
/// All text produced from a report goes through its [`Redactor`], so secret
/// values that ended up in error messages are masked.
#[derive(Clone)]
pub struct RenderReport {
    set_id: String,
    errors: Vec<RenderError>,
    trace: RenderTrace,
    redactor: Redactor,
}

impl RenderReport {
    pub fn new(
        set_id: impl Into<String>,
        errors: Vec<RenderError>,
        trace: RenderTrace,
        redactor: Redactor,
    ) -> Self {
        Self {
            set_id: set_id.into(),
            errors,
            trace,
            redactor,
        }
    }

    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    pub fn errors(&self) -> &[RenderError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn trace(&self) -> &RenderTrace {
        &self.trace
    }

    pub fn is_cancelled(&self) -> bool {
        self.errors.iter().any(|e| matches!(e, RenderError::Cancelled))
    }

    /// One redacted line per error.
    pub fn diagnostics(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| self.redactor.redact(&e.to_string()))
            .collect()
    }

    /// Error counts per category.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for error in &self.errors {
            *counts.entry(error.category()).or_insert(0) += 1;
        }
        counts
    }

    /// Structured, redacted form of the report.
    pub fn to_json(&self) -> serde_json::Value {
        let errors: Vec<_> = self
            .errors
            .iter()
            .map(|e| {
                json!({
                    "category": e.category(),
                    "document": e.document(),
                    "message": e.to_string(),
                })
            })
            .collect();

        self.redactor.redact_json(&json!({
            "set_id": self.set_id,
            "render_id": self.trace.render_id.to_string(),
            "started_at": self.trace.started_at.to_rfc3339(),
            "error_count": self.errors.len(),
            "errors": errors,
        }))
    }
}

impl std::fmt::Display for RenderReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Render of '{}' failed with {} error(s)",
            self.set_id,
            self.errors.len()
        )?;
        for line in self.diagnostics() {
            write!(f, "\n  - {}", line)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RenderReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderReport")
            .field("set_id", &self.set_id)
            .field("render_id", &self.trace.render_id)
            .field("errors", &self.diagnostics())
            .finish()
    }
}

impl std::error::Error for RenderReport {}
