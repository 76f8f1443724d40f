//! Rendered output and format checks.

use std::collections::BTreeMap;

use serde::Deserialize;
use stencil_templates::{OutputFormat, RenderedDocument};

use crate::error::RenderError;
use crate::state::RenderTrace;

/// Documents of a successful render, ordered by name.
#[derive(Debug, Clone)]
pub struct RenderedManifests {
    set_id: String,
    documents: BTreeMap<String, RenderedDocument>,
    trace: RenderTrace,
}

impl RenderedManifests {
    pub(crate) fn new(
        set_id: impl Into<String>,
        documents: BTreeMap<String, RenderedDocument>,
        trace: RenderTrace,
    ) -> Self {
        Self {
            set_id: set_id.into(),
            documents,
            trace,
        }
    }

    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    pub fn get(&self, name: &str) -> Option<&RenderedDocument> {
        self.documents.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.documents.get(name).map(|d| d.text.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RenderedDocument)> {
        self.documents.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn trace(&self) -> &RenderTrace {
        &self.trace
    }

    /// Document name to text.
    pub fn into_texts(self) -> BTreeMap<String, String> {
        self.documents
            .into_iter()
            .map(|(name, doc)| (name, doc.text))
            .collect()
    }
}

/// Check that a rendered document is well-formed in its format.
pub fn validate_output(document: &RenderedDocument) -> Result<(), RenderError> {
    let result = match document.format {
        OutputFormat::Yaml => check_yaml(&document.text),
        OutputFormat::Json => serde_json::from_str::<serde_json::Value>(&document.text)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        OutputFormat::Hcl => check_hcl(&document.text),
        OutputFormat::Plain => Ok(()),
    };

    result.map_err(|reason| RenderError::Output {
        document: document.name.clone(),
        format: document.format,
        reason,
    })
}

fn check_yaml(text: &str) -> Result<(), String> {
    for doc in serde_yaml::Deserializer::from_str(text) {
        serde_yaml::Value::deserialize(doc).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Structural check of HCL: strings and comments terminated, heredocs
/// closed, and brackets balanced outside of them.
fn check_hcl(text: &str) -> Result<(), String> {
    let chars: Vec<char> = text.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\n' => line += 1,
            '#' => i = line_end(&chars, i),
            '/' if next == Some('/') => i = line_end(&chars, i),
            '/' if next == Some('*') => {
                let start = line;
                loop {
                    i += 1;
                    match chars.get(i) {
                        None => return Err(format!("unterminated comment opened on line {}", start)),
                        Some('\n') => line += 1,
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 1;
                            break;
                        }
                        Some(_) => {}
                    }
                }
            }
            '"' => i = scan_string(&chars, i + 1, &mut line)?,
            '<' if next == Some('<') => {
                if let Some(end) = scan_heredoc(&chars, i + 2, &mut line)? {
                    i = end;
                }
            }
            '{' | '[' | '(' => stack.push((c, line)),
            '}' | ']' | ')' => {
                let expected = match c {
                    '}' => '{',
                    ']' => '[',
                    _ => '(',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, opened)) => {
                        return Err(format!(
                            "'{}' on line {} closes '{}' opened on line {}",
                            c, line, open, opened
                        ))
                    }
                    None => return Err(format!("unmatched '{}' on line {}", c, line)),
                }
            }
            _ => {}
        }
        i += 1;
    }

    match stack.pop() {
        Some((open, opened)) => Err(format!("'{}' opened on line {} is never closed", open, opened)),
        None => Ok(()),
    }
}

/// Index of the newline ending the current line, or of the last character.
fn line_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() && chars[i + 1] != '\n' {
        i += 1;
    }
    i
}

/// Scan a quoted string starting after the opening quote; returns the index
/// of the closing quote. Interpolations (`${...}`, `%{...}`) may nest braces.
fn scan_string(chars: &[char], start: usize, line: &mut usize) -> Result<usize, String> {
    let opened = *line;
    let mut i = start;
    loop {
        match chars.get(i) {
            None | Some('\n') => return Err(format!("unterminated string on line {}", opened)),
            Some('\\') => i += 2,
            Some('"') => return Ok(i),
            Some(&c @ ('$' | '%')) => {
                if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&'{') {
                    i += 3;
                } else if chars.get(i + 1) == Some(&'{') {
                    let mut depth = 1;
                    i += 2;
                    while depth > 0 {
                        match chars.get(i) {
                            None => {
                                return Err(format!(
                                    "unterminated interpolation in string on line {}",
                                    opened
                                ))
                            }
                            Some('{') => depth += 1,
                            Some('}') => depth -= 1,
                            Some('\n') => *line += 1,
                            Some(_) => {}
                        }
                        i += 1;
                    }
                } else {
                    i += 1;
                }
            }
            Some(_) => i += 1,
        }
    }
}

/// Scan a heredoc whose `<<` ends just before `start`. Returns the index of
/// the last character of the terminator line, or `None` when `<<` is not
/// followed by a heredoc marker.
fn scan_heredoc(chars: &[char], start: usize, line: &mut usize) -> Result<Option<usize>, String> {
    let mut i = start;
    if chars.get(i) == Some(&'-') {
        i += 1;
    }
    let marker_start = i;
    while chars
        .get(i)
        .map_or(false, |c| c.is_ascii_alphanumeric() || *c == '_')
    {
        i += 1;
    }
    let marker: String = chars[marker_start..i].iter().collect();
    if marker.is_empty() || !marker.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Ok(None);
    }

    let opened = *line;
    let mut cursor = if chars.get(i) == Some(&'\n') {
        i - 1
    } else {
        line_end(chars, i)
    };
    loop {
        // `cursor` sits on the last character of a line; step onto the next.
        if cursor + 1 >= chars.len() {
            return Err(format!(
                "heredoc '{}' opened on line {} is never terminated",
                marker, opened
            ));
        }
        let line_start = if chars[cursor + 1] == '\n' { cursor + 2 } else { cursor + 1 };
        *line += 1;
        if line_start >= chars.len() {
            return Err(format!(
                "heredoc '{}' opened on line {} is never terminated",
                marker, opened
            ));
        }
        let end = if chars[line_start] == '\n' {
            line_start
        } else {
            line_end(chars, line_start)
        };
        let content: String = chars[line_start..=end]
            .iter()
            .filter(|c| **c != '\n')
            .collect();
        if content.trim() == marker {
            return Ok(Some(end));
        }
        cursor = end;
    }
}
