//! Output formats and slot-aware value escaping.
//!
//! Where a placeholder sits in the document decides how its value must be
//! written. Every scalar goes through [`classify`] and [`render_value`]; no
//! value is ever inserted without them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use stencil_context::{Value, ValueKind};

use crate::error::ResolutionErrorKind;

static HEREDOC_OPENER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<-?([A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap());

const YAML_BLOCK_INDICATORS: &[&str] = &["|", "|-", "|+", ">", ">-", ">+"];

/// YAML 1.1 spellings of booleans that YAML 1.2 parsers read as strings.
const YAML_11_BOOLEANS: &[&str] = &["y", "n", "yes", "no", "on", "off"];

/// Format of a rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Hcl,
    Json,
    /// No escaping; values are written verbatim.
    Plain,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Hcl => "hcl",
            OutputFormat::Json => "json",
            OutputFormat::Plain => "plain",
        }
    }

    /// Guess the format from a document file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "tf" | "hcl" => Some(OutputFormat::Hcl),
            "json" => Some(OutputFormat::Json),
            "txt" | "conf" | "cnf" => Some(OutputFormat::Plain),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Double,
    Single,
}

/// Syntactic position of a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Inside an open string literal.
    Quoted(QuoteStyle),
    /// Inside a YAML block scalar or an HCL heredoc.
    Block {
        /// Indentation applied to continuation lines.
        indent: usize,
        /// Heredoc terminator, for HCL.
        marker: Option<String>,
        /// The placeholder is alone on its line.
        standalone: bool,
    },
    /// Anywhere else.
    Bare {
        /// Glued to surrounding text, e.g. `{{ size }}Gi`.
        embedded: bool,
    },
}

/// Classify the slot of a placeholder from the output written before it and
/// the first character of the template text that follows it.
pub fn classify(format: OutputFormat, preceding: &str, following: Option<char>) -> Slot {
    let current_line = preceding.rsplit('\n').next().unwrap_or_default();
    let standalone = current_line.chars().all(char::is_whitespace)
        && following.map_or(true, |c| c == '\n' || c == '\r');

    let block = match format {
        OutputFormat::Yaml => yaml_block_parent(preceding).then_some(None),
        OutputFormat::Hcl => open_heredoc(preceding).map(Some),
        OutputFormat::Json | OutputFormat::Plain => None,
    };
    if let Some(marker) = block {
        return Slot::Block {
            indent: leading_whitespace(current_line),
            marker,
            standalone,
        };
    }

    match line_state(format, current_line) {
        LineState::Quoted(style) => return Slot::Quoted(style),
        LineState::Comment => return Slot::Bare { embedded: false },
        LineState::Code => {}
    }

    let glued_before = current_line
        .chars()
        .last()
        .is_some_and(|c| !c.is_whitespace() && !"[{,".contains(c));
    let glued_after = following.is_some_and(|c| !c.is_whitespace() && !",]}#".contains(c));
    Slot::Bare {
        embedded: glued_before || glued_after,
    }
}

/// Render `value` for `slot`, escaped for `format`.
pub fn render_value(
    format: OutputFormat,
    slot: &Slot,
    value: &Value,
) -> Result<String, ResolutionErrorKind> {
    let text = value.to_text();
    if format == OutputFormat::Plain {
        return Ok(text);
    }

    match slot {
        Slot::Quoted(QuoteStyle::Single) => yaml_single_quoted(&text),
        Slot::Quoted(QuoteStyle::Double) => match format {
            OutputFormat::Hcl => Ok(hcl_escape(&text)),
            OutputFormat::Json => json_escape(&text),
            _ => Ok(yaml_double_escape(&text)),
        },
        Slot::Block {
            indent,
            marker,
            standalone,
        } => {
            if *standalone && value.kind() != ValueKind::String {
                return Err(ResolutionErrorKind::TypeMismatch {
                    expected: ValueKind::String,
                    found: value.kind(),
                });
            }
            block_text(format, &text, *indent, marker.as_deref())
        }
        Slot::Bare { embedded } => match value {
            Value::Boolean(_) | Value::Integer(_) => Ok(text),
            Value::String(s) => match format {
                OutputFormat::Yaml => yaml_bare(s, *embedded),
                OutputFormat::Hcl => {
                    if *embedded {
                        Err(unrepresentable("string glued to unquoted HCL text"))
                    } else {
                        Ok(format!("\"{}\"", hcl_escape(s)))
                    }
                }
                OutputFormat::Json => {
                    if *embedded {
                        Err(unrepresentable("string glued to unquoted JSON text"))
                    } else {
                        json_escape(s).map(|inner| format!("\"{}\"", inner))
                    }
                }
                OutputFormat::Plain => Ok(text),
            },
        },
    }
}

fn unrepresentable(reason: &str) -> ResolutionErrorKind {
    ResolutionErrorKind::Unrepresentable {
        reason: reason.to_string(),
    }
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// Whether the current line sits inside a YAML block scalar.
///
/// Walks up through ever less indented lines. Content lines of a block may
/// be indented deeper than its first line, so the walk only stops at a line
/// ending with a block indicator or at column zero.
fn yaml_block_parent(preceding: &str) -> bool {
    let mut lines = preceding.rsplit('\n');
    let Some(current) = lines.next() else {
        return false;
    };
    let mut indent = leading_whitespace(current);

    for line in lines {
        if indent == 0 {
            return false;
        }
        if line.trim().is_empty() {
            continue;
        }
        let line_indent = leading_whitespace(line);
        if line_indent < indent {
            if line
                .split_whitespace()
                .last()
                .is_some_and(|token| YAML_BLOCK_INDICATORS.contains(&token))
            {
                return true;
            }
            indent = line_indent;
        }
    }
    false
}

/// Terminator of the HCL heredoc still open at the end of `preceding`.
fn open_heredoc(preceding: &str) -> Option<String> {
    let complete = match preceding.rfind('\n') {
        Some(end) => &preceding[..end],
        None => return None,
    };

    let mut open: Option<String> = None;
    for line in complete.split('\n') {
        if open.is_some() {
            if open.as_deref() == Some(line.trim()) {
                open = None;
            }
        } else {
            open = HEREDOC_OPENER
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
        }
    }
    open
}

/// Where the end of the current line stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Code,
    Quoted(QuoteStyle),
    /// Inside a YAML comment.
    Comment,
}

fn line_state(format: OutputFormat, line: &str) -> LineState {
    if format == OutputFormat::Plain {
        return LineState::Code;
    }

    let yaml = format == OutputFormat::Yaml;
    let mut state: Option<QuoteStyle> = None;
    let mut previous: Option<char> = None;
    let mut escaped = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            None => {
                if yaml && c == '#' && previous.map_or(true, char::is_whitespace) {
                    return LineState::Comment;
                }
                // In YAML a quote only opens a scalar after a separator; `it's` is plain.
                let can_open =
                    !yaml || previous.map_or(true, |p| ":-[{,?".contains(p) || p.is_whitespace());
                if c == '"' && can_open {
                    state = Some(QuoteStyle::Double);
                } else if c == '\'' && yaml && can_open {
                    state = Some(QuoteStyle::Single);
                }
            }
            Some(QuoteStyle::Double) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    state = None;
                }
            }
            Some(QuoteStyle::Single) => {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                    } else {
                        state = None;
                    }
                }
            }
        }
        previous = Some(c);
    }

    state.map_or(LineState::Code, LineState::Quoted)
}

fn yaml_double_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn yaml_single_quoted(s: &str) -> Result<String, ResolutionErrorKind> {
    if s.contains(['\n', '\r']) {
        return Err(unrepresentable("line break inside a single-quoted YAML scalar"));
    }
    if s.chars().any(char::is_control) {
        return Err(unrepresentable("control character inside a single-quoted YAML scalar"));
    }
    Ok(s.replace('\'', "''"))
}

fn hcl_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    hcl_escape_templates(&out)
}

fn hcl_escape_templates(s: &str) -> String {
    s.replace("${", "$${").replace("%{", "%%{")
}

fn json_escape(s: &str) -> Result<String, ResolutionErrorKind> {
    let quoted = serde_json::to_string(s).map_err(|e| unrepresentable(&e.to_string()))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

fn yaml_bare(s: &str, embedded: bool) -> Result<String, ResolutionErrorKind> {
    if embedded {
        if !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c))
        {
            return Ok(s.to_string());
        }
        return Err(unrepresentable("string glued to plain YAML text must be alphanumeric"));
    }

    if is_plain_yaml_safe(s) {
        Ok(s.to_string())
    } else {
        Ok(format!("\"{}\"", yaml_double_escape(s)))
    }
}

/// Whether `s` reads back as the very same string when written as a plain
/// YAML scalar, under both YAML 1.2 and YAML 1.1 resolution rules, in block
/// and in flow context.
fn is_plain_yaml_safe(s: &str) -> bool {
    if s.is_empty() || s.trim() != s || s.contains(['\n', '\r', '\t']) {
        return false;
    }
    if s.contains([',', '[', ']', '{', '}']) {
        return false;
    }
    if YAML_11_BOOLEANS.contains(&s.to_ascii_lowercase().as_str()) {
        return false;
    }
    if s.starts_with(|c: char| c.is_ascii_digit() || c == '+' || c == '-' || c == '.')
        && s.chars().all(|c| c.is_ascii_digit() || "_:.+-eE".contains(c))
    {
        return false;
    }
    matches!(
        serde_yaml::from_str::<serde_yaml::Value>(s),
        Ok(serde_yaml::Value::String(ref parsed)) if parsed == s
    )
}

fn block_text(
    format: OutputFormat,
    text: &str,
    indent: usize,
    marker: Option<&str>,
) -> Result<String, ResolutionErrorKind> {
    let text = text.trim_end_matches(['\n', '\r']);

    if let Some(marker) = marker {
        if text.lines().any(|line| line.trim() == marker) {
            return Err(unrepresentable("value contains the heredoc terminator"));
        }
    }

    let padding = " ".repeat(indent);
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&padding);
            }
        }
        out.push_str(line);
    }

    Ok(match format {
        OutputFormat::Hcl => hcl_escape_templates(&out),
        _ => out,
    })
}
