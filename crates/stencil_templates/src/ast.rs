//! Template syntax tree.
//!
//! The grammar is closed: a template is a sequence of literal text, variable
//! references and conditional blocks. Conditionals are always balanced once
//! parsed.

use std::collections::BTreeSet;

use stencil_context::Value;

/// 1-based position in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A reference to a context variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableRef {
    pub name: String,
    pub span: Span,
}

/// Comparison operator in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// Condition of an `if` directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// `var`
    Truthy(VariableRef),
    /// `not var` or `!var`
    Not(VariableRef),
    /// `var == literal` or `var != literal`
    Compare {
        variable: VariableRef,
        op: CompareOp,
        literal: Value,
    },
}

impl Condition {
    pub fn variable(&self) -> &VariableRef {
        match self {
            Condition::Truthy(var) | Condition::Not(var) => var,
            Condition::Compare { variable, .. } => variable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conditional {
    pub condition: Condition,
    pub span: Span,
    pub then_branch: Vec<Node>,
    pub else_branch: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Text(String),
    Variable(VariableRef),
    Conditional(Conditional),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateAst {
    pub name: String,
    pub nodes: Vec<Node>,
}

impl TemplateAst {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    /// Every variable reference in source order, including conditions and
    /// both branches of every conditional.
    pub fn references(&self) -> Vec<&VariableRef> {
        let mut refs = Vec::new();
        collect_references(&self.nodes, &mut refs);
        refs
    }

    /// Distinct referenced variable names.
    pub fn variable_names(&self) -> BTreeSet<&str> {
        self.references().into_iter().map(|r| r.name.as_str()).collect()
    }

    /// Whether the template contains no directives at all.
    pub fn is_literal(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Text(_)))
    }
}

fn collect_references<'a>(nodes: &'a [Node], refs: &mut Vec<&'a VariableRef>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Variable(var) => refs.push(var),
            Node::Conditional(cond) => {
                refs.push(cond.condition.variable());
                collect_references(&cond.then_branch, refs);
                if let Some(else_branch) = &cond.else_branch {
                    collect_references(else_branch, refs);
                }
            }
        }
    }
}
