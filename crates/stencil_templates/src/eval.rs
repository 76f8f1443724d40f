//! Conditional evaluation and branch selection.

use stencil_context::{ResolvedContext, Value, ValueKind};

use crate::ast::{CompareOp, Condition, Node, VariableRef};
use crate::error::{ResolutionError, ResolutionErrorKind};

/// A node that survived branch selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected<'a> {
    Text(&'a str),
    Variable(&'a VariableRef),
}

/// Evaluates conditions of one template against a context.
pub struct Evaluator<'a> {
    template: &'a str,
    context: &'a ResolvedContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(template: &'a str, context: &'a ResolvedContext) -> Self {
        Self { template, context }
    }

    /// Evaluate a single condition.
    ///
    /// A missing variable is an error, never a default branch.
    pub fn evaluate(&self, condition: &Condition) -> Result<bool, ResolutionError> {
        match condition {
            Condition::Truthy(var) => self.boolean(var),
            Condition::Not(var) => self.boolean(var).map(|b| !b),
            Condition::Compare {
                variable,
                op,
                literal,
            } => {
                let value = self.lookup(variable)?;
                if value.kind() != literal.kind() {
                    return Err(self.mismatch(variable, literal.kind(), value.kind()));
                }
                Ok(match op {
                    CompareOp::Eq => value == literal,
                    CompareOp::Ne => value != literal,
                })
            }
        }
    }

    /// Flatten `nodes` into the text and variables of the taken branches.
    ///
    /// Every failing condition is reported; its block is left out and
    /// selection carries on with the rest of the template.
    pub fn select<'n>(&self, nodes: &'n [Node]) -> (Vec<Selected<'n>>, Vec<ResolutionError>) {
        let mut selected = Vec::new();
        let mut errors = Vec::new();
        self.select_into(nodes, &mut selected, &mut errors);
        (selected, errors)
    }

    fn select_into<'n>(
        &self,
        nodes: &'n [Node],
        selected: &mut Vec<Selected<'n>>,
        errors: &mut Vec<ResolutionError>,
    ) {
        for node in nodes {
            match node {
                Node::Text(text) => selected.push(Selected::Text(text)),
                Node::Variable(var) => selected.push(Selected::Variable(var)),
                Node::Conditional(cond) => match self.evaluate(&cond.condition) {
                    Ok(true) => self.select_into(&cond.then_branch, selected, errors),
                    Ok(false) => {
                        if let Some(else_branch) = &cond.else_branch {
                            self.select_into(else_branch, selected, errors);
                        }
                    }
                    Err(e) => errors.push(e),
                },
            }
        }
    }

    fn lookup(&self, var: &VariableRef) -> Result<&'a Value, ResolutionError> {
        self.context.get(&var.name).ok_or_else(|| ResolutionError {
            template: self.template.to_string(),
            variable: var.name.clone(),
            line: var.span.line,
            column: var.span.column,
            kind: ResolutionErrorKind::Missing,
        })
    }

    fn boolean(&self, var: &VariableRef) -> Result<bool, ResolutionError> {
        let value = self.lookup(var)?;
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(var, ValueKind::Boolean, value.kind()))
    }

    fn mismatch(&self, var: &VariableRef, expected: ValueKind, found: ValueKind) -> ResolutionError {
        ResolutionError {
            template: self.template.to_string(),
            variable: var.name.clone(),
            line: var.span.line,
            column: var.span.column,
            kind: ResolutionErrorKind::TypeMismatch { expected, found },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::grammar::Grammar;
    use crate::parser::Parser;

    fn context() -> ResolvedContext {
        ResolvedContext::builder()
            .insert("publicly_accessible", true)
            .insert("is_test_cluster", false)
            .insert("database_kind", "mysql")
            .insert("database_port", 3306i64)
            .build()
    }

    fn var(name: &str) -> VariableRef {
        VariableRef {
            name: name.to_string(),
            span: Span::new(1, 1),
        }
    }

    fn texts(selected: &[Selected<'_>]) -> String {
        selected
            .iter()
            .map(|s| match s {
                Selected::Text(t) => t.to_string(),
                Selected::Variable(v) => format!("<{}>", v.name),
            })
            .collect()
    }

    #[test]
    fn test_evaluate_conditions() {
        let ctx = context();
        let eval = Evaluator::new("t", &ctx);

        assert_eq!(eval.evaluate(&Condition::Truthy(var("publicly_accessible"))), Ok(true));
        assert_eq!(eval.evaluate(&Condition::Not(var("is_test_cluster"))), Ok(true));
        assert_eq!(
            eval.evaluate(&Condition::Compare {
                variable: var("database_kind"),
                op: CompareOp::Eq,
                literal: Value::from("mysql"),
            }),
            Ok(true)
        );
        assert_eq!(
            eval.evaluate(&Condition::Compare {
                variable: var("database_port"),
                op: CompareOp::Ne,
                literal: Value::Integer(3306),
            }),
            Ok(false)
        );
    }

    #[test]
    fn test_type_mismatch() {
        let ctx = context();
        let eval = Evaluator::new("t", &ctx);

        let err = eval.evaluate(&Condition::Truthy(var("database_kind"))).unwrap_err();
        assert_eq!(
            err.kind,
            ResolutionErrorKind::TypeMismatch {
                expected: ValueKind::Boolean,
                found: ValueKind::String
            }
        );

        let err = eval
            .evaluate(&Condition::Compare {
                variable: var("database_port"),
                op: CompareOp::Eq,
                literal: Value::from("3306"),
            })
            .unwrap_err();
        assert!(matches!(err.kind, ResolutionErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_condition_variable_is_an_error() {
        let ctx = context();
        let err = Evaluator::new("t", &ctx)
            .evaluate(&Condition::Truthy(var("activate_backups")))
            .unwrap_err();
        assert!(err.is_missing());
        assert_eq!(err.variable, "activate_backups");
    }

    #[test]
    fn test_select_branches() {
        let parser = Parser::new(Grammar::default()).unwrap();
        let ast = parser
            .parse(
                "t",
                "{% if publicly_accessible %}A{% else %}B{% endif %}-{% if is_test_cluster %}C{% else %}D {{ x }}{% endif %}",
            )
            .unwrap();
        let ctx = context();
        let (selected, errors) = Evaluator::new("t", &ctx).select(&ast.nodes);
        assert!(errors.is_empty());
        assert_eq!(texts(&selected), "A-D <x>");
    }

    #[test]
    fn test_select_collects_every_failing_condition() {
        let parser = Parser::new(Grammar::default()).unwrap();
        let ast = parser
            .parse("t", "{% if a %}x{% endif %}{% if database_kind %}y{% endif %}z")
            .unwrap();
        let ctx = context();
        let (selected, errors) = Evaluator::new("t", &ctx).select(&ast.nodes);
        assert_eq!(texts(&selected), "z");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].is_missing());
        assert!(!errors[1].is_missing());
    }
}
