//! Error types for rendering.

use stencil_context::FieldViolation;
use stencil_templates::{OutputFormat, ResolutionError, SyntaxError};
use thiserror::Error;

use crate::consistency::ConsistencyError;

/// Result type alias for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// One failure found during a render.
///
/// A failed render carries every error it found, so each variant holds a
/// single diagnostic rather than a list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Invalid request: {0}")]
    Validation(FieldViolation),

    #[error("Syntax error: {0}")]
    Syntax(SyntaxError),

    #[error("Resolution error: {0}")]
    Resolution(ResolutionError),

    #[error("Consistency error: {0}")]
    Consistency(ConsistencyError),

    #[error("Invalid {format} output in {document}: {reason}")]
    Output {
        document: String,
        format: OutputFormat,
        reason: String,
    },

    #[error("Invalid template set '{set}': {reason}")]
    InvalidTemplateSet { set: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Render task for {document} failed: {reason}")]
    TaskFailed { document: String, reason: String },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Render cancelled")]
    Cancelled,
}

impl RenderError {
    /// Short category name, used in logs and reports.
    pub fn category(&self) -> &'static str {
        match self {
            RenderError::Validation(_) => "validation",
            RenderError::Syntax(_) => "syntax",
            RenderError::Resolution(_) => "resolution",
            RenderError::Consistency(_) => "consistency",
            RenderError::Output { .. } => "output",
            RenderError::InvalidTemplateSet { .. } => "template_set",
            RenderError::Configuration(_) => "configuration",
            RenderError::TaskFailed { .. } => "task",
            RenderError::Publish(_) => "publish",
            RenderError::Cancelled => "cancelled",
        }
    }

    /// Template the error belongs to, if any.
    pub fn document(&self) -> Option<&str> {
        match self {
            RenderError::Syntax(e) => Some(&e.template),
            RenderError::Resolution(e) => Some(&e.template),
            RenderError::Output { document, .. } | RenderError::TaskFailed { document, .. } => {
                Some(document)
            }
            _ => None,
        }
    }
}

impl From<FieldViolation> for RenderError {
    fn from(err: FieldViolation) -> Self {
        RenderError::Validation(err)
    }
}

impl From<SyntaxError> for RenderError {
    fn from(err: SyntaxError) -> Self {
        RenderError::Syntax(err)
    }
}

impl From<ResolutionError> for RenderError {
    fn from(err: ResolutionError) -> Self {
        RenderError::Resolution(err)
    }
}

impl From<ConsistencyError> for RenderError {
    fn from(err: ConsistencyError) -> Self {
        RenderError::Consistency(err)
    }
}

impl From<stencil_templates::TemplateError> for RenderError {
    fn from(err: stencil_templates::TemplateError) -> Self {
        RenderError::Configuration(err.to_string())
    }
}
