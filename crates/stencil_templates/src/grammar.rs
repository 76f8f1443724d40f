//! Template grammar configuration.

use serde::{Deserialize, Serialize};

use crate::error::{TemplateError, TemplateResult};

/// Default maximum depth of nested conditional blocks.
pub const DEFAULT_MAX_NESTING: usize = 4;

/// Delimiters and limits of the template language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Grammar {
    pub variable_start: String,
    pub variable_end: String,
    pub directive_start: String,
    pub directive_end: String,
    pub max_nesting: usize,
}

impl Default for Grammar {
    fn default() -> Self {
        Self {
            variable_start: "{{".to_string(),
            variable_end: "}}".to_string(),
            directive_start: "{%".to_string(),
            directive_end: "%}".to_string(),
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    pub fn with_variable_delimiters(
        mut self,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.variable_start = start.into();
        self.variable_end = end.into();
        self
    }

    pub fn with_directive_delimiters(
        mut self,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.directive_start = start.into();
        self.directive_end = end.into();
        self
    }

    /// Check that the delimiters can be told apart.
    pub fn validate(&self) -> TemplateResult<()> {
        let delimiters = [
            ("variable_start", &self.variable_start),
            ("variable_end", &self.variable_end),
            ("directive_start", &self.directive_start),
            ("directive_end", &self.directive_end),
        ];
        for (name, value) in delimiters {
            if value.trim().is_empty() {
                return Err(TemplateError::InvalidGrammar(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }
        if self.variable_start.starts_with(self.directive_start.as_str())
            || self.directive_start.starts_with(self.variable_start.as_str())
        {
            return Err(TemplateError::InvalidGrammar(
                "variable and directive start delimiters overlap".to_string(),
            ));
        }
        if self.max_nesting == 0 {
            return Err(TemplateError::InvalidGrammar(
                "max_nesting must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
