//! Error types for template parsing and rendering.

use stencil_context::ValueKind;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while preparing or rendering a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("{} syntax error(s): {}", .0.len(), join(.0))]
    Syntax(Vec<SyntaxError>),

    #[error("{} resolution error(s): {}", .0.len(), join(.0))]
    Resolution(Vec<ResolutionError>),
}

fn join<T: std::fmt::Display>(errors: &[T]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A malformed template, located at the offending tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{template}:{line}:{column}: {kind}")]
pub struct SyntaxError {
    pub template: String,
    pub line: usize,
    pub column: usize,
    pub kind: SyntaxErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    #[error("unclosed tag, expected '{expected}'")]
    UnclosedTag { expected: String },

    #[error("empty variable name")]
    EmptyVariable,

    #[error("invalid variable name '{name}'")]
    InvalidVariableName { name: String },

    #[error("unknown directive '{name}'")]
    UnknownDirective { name: String },

    #[error("'{directive}' without matching 'if'")]
    UnmatchedDirective { directive: String },

    #[error("duplicate 'else' in conditional block")]
    DuplicateElse,

    #[error("'if' block is never closed")]
    UnclosedIf,

    #[error("conditional nesting deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("unsupported expression '{expression}'")]
    UnsupportedExpression { expression: String },

    #[error("invalid literal '{literal}'")]
    InvalidLiteral { literal: String },
}

/// A variable that could not be resolved or inserted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{template}:{line}:{column}: variable '{variable}' {kind}")]
pub struct ResolutionError {
    pub template: String,
    pub variable: String,
    pub line: usize,
    pub column: usize,
    pub kind: ResolutionErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    #[error("is not defined in the context")]
    Missing,

    #[error("has type {found}, expected {expected}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    #[error("cannot be represented here: {reason}")]
    Unrepresentable { reason: String },
}

impl ResolutionError {
    pub fn is_missing(&self) -> bool {
        matches!(self.kind, ResolutionErrorKind::Missing)
    }
}
