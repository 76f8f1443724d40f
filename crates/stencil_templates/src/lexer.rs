//! Splits template source into text, variable and directive tokens.

use regex::Regex;

use crate::ast::Span;
use crate::error::{SyntaxError, SyntaxErrorKind, TemplateError, TemplateResult};
use crate::grammar::Grammar;

/// Whitespace control marker placed immediately inside a delimiter.
pub const TRIM_MARKER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text(String),
    /// Trimmed body of a variable tag.
    Variable(String),
    /// Trimmed body of a directive tag.
    Directive(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Maps byte offsets to line and column.
pub(crate) struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    pub(crate) fn span(&self, offset: usize) -> Span {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..offset].chars().count() + 1;
        Span::new(line, column)
    }
}

/// Tokenizer for one grammar.
#[derive(Debug, Clone)]
pub struct Lexer {
    grammar: Grammar,
    tag_start: Regex,
}

impl Lexer {
    pub fn new(grammar: &Grammar) -> TemplateResult<Self> {
        grammar.validate()?;
        let pattern = format!(
            "{}|{}",
            regex::escape(&grammar.variable_start),
            regex::escape(&grammar.directive_start)
        );
        let tag_start =
            Regex::new(&pattern).map_err(|e| TemplateError::InvalidGrammar(e.to_string()))?;
        Ok(Self {
            grammar: grammar.clone(),
            tag_start,
        })
    }

    /// Tokenize `source`, applying whitespace control markers.
    ///
    /// An unclosed tag ends tokenization; everything before it is still
    /// returned so the parser can report further problems.
    pub fn tokenize(&self, template: &str, source: &str) -> (Vec<Token>, Vec<SyntaxError>) {
        let index = LineIndex::new(source);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        let mut pos = 0;
        let mut trim_next = false;

        while pos < source.len() {
            let Some(start) = self.tag_start.find_at(source, pos) else {
                push_text(&mut tokens, &index, source, pos, source.len(), trim_next, false);
                break;
            };

            let is_variable = start.as_str() == self.grammar.variable_start;
            let end_delimiter = if is_variable {
                &self.grammar.variable_end
            } else {
                &self.grammar.directive_end
            };

            let mut body_start = start.end();
            let trim_before = source[body_start..].starts_with(TRIM_MARKER);
            if trim_before {
                body_start += TRIM_MARKER.len_utf8();
            }

            push_text(&mut tokens, &index, source, pos, start.start(), trim_next, trim_before);

            let Some(relative_end) = source[body_start..].find(end_delimiter.as_str()) else {
                let span = index.span(start.start());
                errors.push(SyntaxError {
                    template: template.to_string(),
                    line: span.line,
                    column: span.column,
                    kind: SyntaxErrorKind::UnclosedTag {
                        expected: end_delimiter.clone(),
                    },
                });
                break;
            };

            let tag_end = body_start + relative_end;
            let mut body_end = tag_end;
            let trim_after = body_end > body_start && source[..body_end].ends_with(TRIM_MARKER);
            if trim_after {
                body_end -= TRIM_MARKER.len_utf8();
            }

            let body = source[body_start..body_end].trim().to_string();
            tokens.push(Token {
                kind: if is_variable {
                    TokenKind::Variable(body)
                } else {
                    TokenKind::Directive(body)
                },
                span: index.span(start.start()),
            });

            pos = tag_end + end_delimiter.len();
            trim_next = trim_after;
        }

        (tokens, errors)
    }
}

fn push_text(
    tokens: &mut Vec<Token>,
    index: &LineIndex<'_>,
    source: &str,
    from: usize,
    to: usize,
    trim_start: bool,
    trim_end: bool,
) {
    let raw = &source[from..to];
    let mut text = raw;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if text.is_empty() {
        return;
    }
    let offset = if trim_start {
        from + raw.len() - raw.trim_start().len()
    } else {
        from
    };
    tokens.push(Token {
        kind: TokenKind::Text(text.to_string()),
        span: index.span(offset),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Vec<SyntaxError>) {
        Lexer::new(&Grammar::default())
            .unwrap()
            .tokenize("test", source)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn test_tokenize_mixed() {
        let (tokens, errors) = lex("size: {{ database_disk_size_in_gib }}Gi\n{% if x %}a{% endif %}");
        assert!(errors.is_empty());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Text("size: ".into()),
                TokenKind::Variable("database_disk_size_in_gib".into()),
                TokenKind::Text("Gi\n".into()),
                TokenKind::Directive("if x".into()),
                TokenKind::Text("a".into()),
                TokenKind::Directive("endif".into()),
            ]
        );
        assert_eq!(tokens[1].span, Span::new(1, 7));
        assert_eq!(tokens[3].span, Span::new(2, 1));
    }

    #[test]
    fn test_trim_markers() {
        let (tokens, _) = lex("a:\n  {%- if x -%}\n  b\n{%- endif %}");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Text("a:".into()),
                TokenKind::Directive("if x".into()),
                TokenKind::Text("b".into()),
                TokenKind::Directive("endif".into()),
            ]
        );
        assert_eq!(tokens[2].span, Span::new(3, 3));
    }

    #[test]
    fn test_unclosed_tag() {
        let (tokens, errors) = lex("name: {{ sanitized_name\nother: x");
        assert_eq!(kinds(&tokens), vec![TokenKind::Text("name: ".into())]);
        assert_eq!(errors.len(), 1);
        assert_eq!((errors[0].line, errors[0].column), (1, 7));
        assert!(matches!(errors[0].kind, SyntaxErrorKind::UnclosedTag { .. }));
    }

    #[test]
    fn test_custom_delimiters() {
        let grammar = Grammar::default()
            .with_variable_delimiters("<<", ">>")
            .with_directive_delimiters("<%", "%>");
        let lexer = Lexer::new(&grammar).unwrap();
        let (tokens, errors) = lexer.tokenize("t", "x: << a >> {{ literal }}");
        assert!(errors.is_empty());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Text("x: ".into()),
                TokenKind::Variable("a".into()),
                TokenKind::Text(" {{ literal }}".into()),
            ]
        );
    }

    #[test]
    fn test_columns_count_characters() {
        let (tokens, _) = lex("é: {{ v }}");
        assert_eq!(tokens[1].span, Span::new(1, 4));
    }
}
