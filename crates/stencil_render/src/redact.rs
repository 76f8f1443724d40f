//! Redaction of secret literals from diagnostics.

use serde_json::Value as JsonValue;
use stencil_context::REDACTED;

/// Replaces known secret strings with a marker.
///
/// Secrets are matched literally, longest first, so a secret that contains
/// another secret is never partially revealed.
#[derive(Clone)]
pub struct Redactor {
    secrets: Vec<String>,
    marker: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), REDACTED)
    }
}

impl Redactor {
    pub fn new<I, S>(secrets: I, marker: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self {
            secrets,
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), &self.marker))
    }

    /// Redact every string inside a JSON value.
    pub fn redact_json(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.redact(s)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.redact_json(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .field("marker", &self.marker)
            .finish()
    }
}
