//! Renderer configuration.

use serde::{Deserialize, Serialize};
use stencil_context::REDACTED;
use stencil_templates::Grammar;

use crate::error::{RenderError, RenderResult};

/// Options controlling a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOptions {
    /// Render documents concurrently in `render_and_publish`
    pub parallel: bool,
    /// Check each document parses in its output format
    pub validate_output: bool,
    /// Replacement for secret values in diagnostics
    pub redaction_marker: String,
    /// Template delimiters and nesting limit
    pub grammar: Grammar,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            validate_output: true,
            redaction_marker: REDACTED.to_string(),
            grammar: Grammar::default(),
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_output_validation(mut self, validate: bool) -> Self {
        self.validate_output = validate;
        self
    }

    pub fn with_redaction_marker(mut self, marker: impl Into<String>) -> Self {
        self.redaction_marker = marker.into();
        self
    }

    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Parse options from YAML; missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> RenderResult<Self> {
        let options: Self = serde_yaml::from_str(yaml)
            .map_err(|e| RenderError::Configuration(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_yaml(&self) -> RenderResult<String> {
        serde_yaml::to_string(self).map_err(|e| RenderError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.redaction_marker.is_empty() {
            return Err(RenderError::Configuration(
                "redaction_marker must not be empty".to_string(),
            ));
        }
        self.grammar.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RenderOptions::default();
        assert!(options.parallel);
        assert!(options.validate_output);
        assert_eq!(options.redaction_marker, "[REDACTED]");
        assert_eq!(options.grammar.max_nesting, 4);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let options = RenderOptions::from_yaml_str(
            "parallel: false\ngrammar:\n  max_nesting: 2\n",
        )
        .unwrap();
        assert!(!options.parallel);
        assert!(options.validate_output);
        assert_eq!(options.grammar.max_nesting, 2);
        assert_eq!(options.grammar.variable_start, "{{");
    }

    #[test]
    fn test_invalid_yaml_options() {
        assert!(matches!(
            RenderOptions::from_yaml_str("paralel: true\n"),
            Err(RenderError::Configuration(_))
        ));
        assert!(RenderOptions::from_yaml_str("redaction_marker: ''\n").is_err());
        assert!(RenderOptions::from_yaml_str("grammar:\n  max_nesting: 0\n").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let options = RenderOptions::new()
            .with_parallel(false)
            .with_redaction_marker("***");
        let yaml = options.to_yaml().unwrap();
        assert_eq!(RenderOptions::from_yaml_str(&yaml).unwrap(), options);
    }
}
