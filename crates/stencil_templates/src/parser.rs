//! Builds a [`TemplateAst`] from tokens.
//!
//! The parser does not stop at the first problem: an unknown directive or a
//! bad expression is recorded and parsing resumes, so one pass reports every
//! syntax error in the template.

use std::sync::LazyLock;

use regex::Regex;
use stencil_context::Value;
use tracing::debug;

use crate::ast::{CompareOp, Condition, Conditional, Node, Span, TemplateAst, VariableRef};
use crate::error::{SyntaxError, SyntaxErrorKind, TemplateResult};
use crate::grammar::Grammar;
use crate::lexer::{Lexer, Token, TokenKind};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// An open `if` block.
struct Frame {
    /// `None` when the condition failed to parse.
    condition: Option<Condition>,
    span: Span,
    then_branch: Vec<Node>,
    else_branch: Option<Vec<Node>>,
}

impl Frame {
    fn current(&mut self) -> &mut Vec<Node> {
        match &mut self.else_branch {
            Some(nodes) => nodes,
            None => &mut self.then_branch,
        }
    }
}

/// Template parser for one grammar.
#[derive(Debug, Clone)]
pub struct Parser {
    grammar: Grammar,
    lexer: Lexer,
}

impl Parser {
    pub fn new(grammar: Grammar) -> TemplateResult<Self> {
        let lexer = Lexer::new(&grammar)?;
        Ok(Self { grammar, lexer })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Parse a template, returning every syntax error found.
    pub fn parse(&self, name: &str, source: &str) -> Result<TemplateAst, Vec<SyntaxError>> {
        let (tokens, mut errors) = self.lexer.tokenize(name, source);
        let mut state = ParseState {
            template: name,
            max_nesting: self.grammar.max_nesting,
            root: Vec::new(),
            stack: Vec::new(),
            errors: Vec::new(),
        };

        for token in tokens {
            state.accept(token);
        }
        let nodes = state.finish();

        // Report in source order; unclosed `if`s are only found at the end.
        let mut parse_errors = std::mem::take(&mut state.errors);
        parse_errors.append(&mut errors);
        parse_errors.sort_by_key(|e| (e.line, e.column));

        if parse_errors.is_empty() {
            debug!("Parsed template {} ({} top-level nodes)", name, nodes.len());
            Ok(TemplateAst::new(name, nodes))
        } else {
            debug!("Template {} has {} syntax error(s)", name, parse_errors.len());
            Err(parse_errors)
        }
    }
}

struct ParseState<'a> {
    template: &'a str,
    max_nesting: usize,
    root: Vec<Node>,
    stack: Vec<Frame>,
    errors: Vec<SyntaxError>,
}

impl ParseState<'_> {
    fn error(&mut self, span: Span, kind: SyntaxErrorKind) {
        self.errors.push(SyntaxError {
            template: self.template.to_string(),
            line: span.line,
            column: span.column,
            kind,
        });
    }

    fn current(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => frame.current(),
            None => &mut self.root,
        }
    }

    fn accept(&mut self, token: Token) {
        match token.kind {
            TokenKind::Text(text) => self.current().push(Node::Text(text)),
            TokenKind::Variable(body) => {
                if body.is_empty() {
                    self.error(token.span, SyntaxErrorKind::EmptyVariable);
                } else if !IDENTIFIER.is_match(&body) {
                    self.error(token.span, SyntaxErrorKind::InvalidVariableName { name: body });
                } else {
                    self.current().push(Node::Variable(VariableRef {
                        name: body,
                        span: token.span,
                    }));
                }
            }
            TokenKind::Directive(body) => self.directive(&body, token.span),
        }
    }

    fn directive(&mut self, body: &str, span: Span) {
        let (keyword, rest) = match body.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (body, ""),
        };

        match keyword {
            "if" => {
                if self.stack.len() >= self.max_nesting {
                    let max = self.max_nesting;
                    self.error(span, SyntaxErrorKind::NestingTooDeep { max });
                }
                let condition = match parse_condition(rest, span) {
                    Ok(condition) => Some(condition),
                    Err(kind) => {
                        self.error(span, kind);
                        None
                    }
                };
                self.stack.push(Frame {
                    condition,
                    span,
                    then_branch: Vec::new(),
                    else_branch: None,
                });
            }
            "else" | "endif" if !rest.is_empty() => {
                self.error(
                    span,
                    SyntaxErrorKind::UnsupportedExpression {
                        expression: body.to_string(),
                    },
                );
            }
            "else" => match self.stack.last().map(|frame| frame.else_branch.is_some()) {
                None => self.error(
                    span,
                    SyntaxErrorKind::UnmatchedDirective {
                        directive: "else".to_string(),
                    },
                ),
                Some(true) => self.error(span, SyntaxErrorKind::DuplicateElse),
                Some(false) => {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.else_branch = Some(Vec::new());
                    }
                }
            },
            "endif" => match self.stack.pop() {
                None => self.error(
                    span,
                    SyntaxErrorKind::UnmatchedDirective {
                        directive: "endif".to_string(),
                    },
                ),
                Some(frame) => {
                    if let Some(condition) = frame.condition {
                        let node = Node::Conditional(Conditional {
                            condition,
                            span: frame.span,
                            then_branch: frame.then_branch,
                            else_branch: frame.else_branch,
                        });
                        self.current().push(node);
                    }
                }
            },
            other => self.error(
                span,
                SyntaxErrorKind::UnknownDirective {
                    name: other.to_string(),
                },
            ),
        }
    }

    fn finish(&mut self) -> Vec<Node> {
        let unclosed: Vec<Span> = self.stack.drain(..).map(|frame| frame.span).collect();
        for span in unclosed {
            self.error(span, SyntaxErrorKind::UnclosedIf);
        }
        std::mem::take(&mut self.root)
    }
}

/// Parse the expression of an `if` directive.
fn parse_condition(expression: &str, span: Span) -> Result<Condition, SyntaxErrorKind> {
    let unsupported = || SyntaxErrorKind::UnsupportedExpression {
        expression: expression.to_string(),
    };
    let variable = |name: &str| -> Result<VariableRef, SyntaxErrorKind> {
        let name = name.trim();
        if IDENTIFIER.is_match(name) {
            Ok(VariableRef {
                name: name.to_string(),
                span,
            })
        } else {
            Err(unsupported())
        }
    };

    if let Some((lhs, op, rhs)) = split_comparison(expression) {
        return Ok(Condition::Compare {
            variable: variable(lhs)?,
            op,
            literal: parse_literal(rhs.trim())?,
        });
    }

    if let Some(rest) = expression.strip_prefix('!') {
        return Ok(Condition::Not(variable(rest)?));
    }
    if let Some(rest) = expression.strip_prefix("not") {
        if rest.starts_with(char::is_whitespace) {
            return Ok(Condition::Not(variable(rest)?));
        }
    }

    variable(expression).map(Condition::Truthy)
}

fn split_comparison(expression: &str) -> Option<(&str, CompareOp, &str)> {
    let eq = expression.find("==").map(|i| (i, CompareOp::Eq));
    let ne = expression.find("!=").map(|i| (i, CompareOp::Ne));
    let (index, op) = match (eq, ne) {
        (Some(a), Some(b)) => {
            if a.0 < b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&expression[..index], op, &expression[index + 2..]))
}

fn parse_literal(literal: &str) -> Result<Value, SyntaxErrorKind> {
    let invalid = || SyntaxErrorKind::InvalidLiteral {
        literal: literal.to_string(),
    };

    for quote in ['"', '\''] {
        if let Some(rest) = literal.strip_prefix(quote) {
            let inner = rest.strip_suffix(quote).ok_or_else(invalid)?;
            if inner.contains(quote) {
                return Err(invalid());
            }
            return Ok(Value::String(inner.to_string()));
        }
    }

    match literal {
        "true" => Ok(Value::Boolean(true)),
        "false" => Ok(Value::Boolean(false)),
        _ => literal.parse::<i64>().map(Value::Integer).map_err(|_| invalid()),
    }
}
