//! Variable substitution into selected template nodes.

use std::collections::BTreeSet;

use stencil_context::{ResolvedContext, REDACTED};
use tracing::debug;

use crate::ast::{Span, TemplateAst};
use crate::error::{ResolutionError, ResolutionErrorKind};
use crate::eval::{Evaluator, Selected};
use crate::format::{classify, render_value, OutputFormat};

/// An adjacent placeholder counts as glued text when classifying slots.
const ADJACENT_PLACEHOLDER: char = '{';

/// A variable value written into a document.
#[derive(Clone, PartialEq, Eq)]
pub struct Exposure {
    pub variable: String,
    pub span: Span,
    /// Value text before escaping.
    pub value: String,
    pub sensitive: bool,
}

impl std::fmt::Debug for Exposure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = if self.sensitive { REDACTED } else { self.value.as_str() };
        f.debug_struct("Exposure")
            .field("variable", &self.variable)
            .field("span", &self.span)
            .field("value", &value)
            .finish()
    }
}

/// Final text of one template.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub name: String,
    pub format: OutputFormat,
    pub text: String,
    pub exposures: Vec<Exposure>,
    /// Literal secret strings present in `text`, raw and escaped.
    pub secrets: Vec<String>,
}

impl RenderedDocument {
    pub fn exposures_of<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a Exposure> + 'a {
        self.exposures.iter().filter(move |e| e.variable == variable)
    }

    pub fn exposes(&self, variable: &str) -> bool {
        self.exposures_of(variable).next().is_some()
    }

    /// Document text with every secret replaced by `marker`.
    pub fn redacted_text(&self, marker: &str) -> String {
        let mut secrets: Vec<&String> = self.secrets.iter().collect();
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets
            .into_iter()
            .fold(self.text.clone(), |text, secret| text.replace(secret.as_str(), marker))
    }
}

impl std::fmt::Debug for RenderedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedDocument")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("text", &self.redacted_text(REDACTED))
            .field("exposures", &self.exposures)
            .finish()
    }
}

/// Every variable the template references, in any branch, that the context
/// lacks. Each name is reported once, at its first reference.
pub fn missing_variables(ast: &TemplateAst, context: &ResolvedContext) -> Vec<ResolutionError> {
    let mut seen = BTreeSet::new();
    ast.references()
        .into_iter()
        .filter(|var| !context.contains(&var.name) && seen.insert(var.name.as_str()))
        .map(|var| ResolutionError {
            template: ast.name.clone(),
            variable: var.name.clone(),
            line: var.span.line,
            column: var.span.column,
            kind: ResolutionErrorKind::Missing,
        })
        .collect()
}

/// Writes selected nodes out in one format.
#[derive(Debug, Clone, Copy)]
pub struct Substitutor {
    format: OutputFormat,
}

impl Substitutor {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Concatenate the selection, inserting every value exactly once.
    ///
    /// Inserted values are never scanned again, so a value containing
    /// template syntax comes out verbatim.
    pub fn substitute(
        &self,
        template: &str,
        selected: &[Selected<'_>],
        context: &ResolvedContext,
    ) -> Result<RenderedDocument, Vec<ResolutionError>> {
        let mut text = String::new();
        let mut exposures = Vec::new();
        let mut secrets: Vec<String> = Vec::new();
        let mut errors = Vec::new();

        for (i, item) in selected.iter().enumerate() {
            let var = match item {
                Selected::Text(t) => {
                    text.push_str(t);
                    continue;
                }
                Selected::Variable(var) => var,
            };

            let error = |kind| ResolutionError {
                template: template.to_string(),
                variable: var.name.clone(),
                line: var.span.line,
                column: var.span.column,
                kind,
            };

            let Some(entry) = context.entry(&var.name) else {
                errors.push(error(ResolutionErrorKind::Missing));
                continue;
            };

            let following = match selected.get(i + 1) {
                Some(Selected::Text(t)) => t.chars().next(),
                Some(Selected::Variable(_)) => Some(ADJACENT_PLACEHOLDER),
                None => None,
            };
            let slot = classify(self.format, &text, following);

            match render_value(self.format, &slot, &entry.value) {
                Ok(rendered) => {
                    let raw = entry.value.to_text();
                    if entry.sensitive {
                        for secret in [&raw, &rendered] {
                            if !secret.is_empty() && !secrets.contains(secret) {
                                secrets.push(secret.clone());
                            }
                        }
                    }
                    text.push_str(&rendered);
                    exposures.push(Exposure {
                        variable: var.name.clone(),
                        span: var.span,
                        value: raw,
                        sensitive: entry.sensitive,
                    });
                }
                Err(kind) => errors.push(error(kind)),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        debug!(
            "Substituted {} value(s) into {} ({} bytes)",
            exposures.len(),
            template,
            text.len()
        );
        Ok(RenderedDocument {
            name: template.to_string(),
            format: self.format,
            text,
            exposures,
            secrets,
        })
    }
}

/// Resolve, evaluate and substitute one parsed template.
///
/// All errors of the template are returned together; a missing variable is
/// reported once even when it is referenced in several places.
pub fn render_ast(
    ast: &TemplateAst,
    context: &ResolvedContext,
    format: OutputFormat,
) -> Result<RenderedDocument, Vec<ResolutionError>> {
    let mut errors = missing_variables(ast, context);

    let (selected, eval_errors) = Evaluator::new(&ast.name, context).select(&ast.nodes);
    errors.extend(eval_errors.into_iter().filter(|e| !e.is_missing()));

    match Substitutor::new(format).substitute(&ast.name, &selected, context) {
        Ok(document) if errors.is_empty() => Ok(document),
        Ok(_) => Err(errors),
        Err(sub_errors) => {
            errors.extend(sub_errors.into_iter().filter(|e| !e.is_missing()));
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::parser::Parser;
    use stencil_context::Value;

    fn parse(source: &str) -> TemplateAst {
        Parser::new(Grammar::default())
            .unwrap()
            .parse("values.yaml", source)
            .unwrap()
    }

    fn context() -> ResolvedContext {
        ResolvedContext::builder()
            .insert("database_disk_size_in_gib", 10u32)
            .insert("publicly_accessible", true)
            .insert("sanitized_name", "app1db")
            .insert("database_disk_type", "gp2")
            .insert("template_text", "{{ sanitized_name }}")
            .insert_secret("database_password", "s3cr\"t")
            .build()
    }

    #[test]
    fn test_size_and_service_type() {
        let ast = parse(
            "size: {{ database_disk_size_in_gib }}Gi\n{% if publicly_accessible %}type: LoadBalancer{% else %}type: ClusterIP{% endif %}\n",
        );
        let doc = render_ast(&ast, &context(), OutputFormat::Yaml).unwrap();
        assert_eq!(doc.text, "size: 10Gi\ntype: LoadBalancer\n");
    }

    #[test]
    fn test_false_selects_else_branch() {
        let ctx = context().with_override("publicly_accessible", false);
        let ast = parse("{% if publicly_accessible %}type: LoadBalancer{% else %}type: ClusterIP{% endif %}");
        assert_eq!(render_ast(&ast, &ctx, OutputFormat::Yaml).unwrap().text, "type: ClusterIP");
    }

    #[test]
    fn test_inserted_values_are_not_rescanned() {
        let ast = parse("note: '{{ template_text }}'");
        let doc = render_ast(&ast, &context(), OutputFormat::Yaml).unwrap();
        assert_eq!(doc.text, "note: '{{ sanitized_name }}'");
    }

    #[test]
    fn test_missing_reported_once_across_branches() {
        let ast = parse("a: {{ cluster_id }}\n{% if publicly_accessible %}b: {{ cluster_id }}{% else %}c: {{ region }}{% endif %}");
        let errors = render_ast(&ast, &context(), OutputFormat::Yaml).unwrap_err();
        let names: Vec<&str> = errors.iter().map(|e| e.variable.as_str()).collect();
        assert_eq!(names, vec!["cluster_id", "region"]);
        assert_eq!((errors[0].line, errors[0].column), (1, 4));
        assert!(errors.iter().all(|e| e.is_missing()));
    }

    #[test]
    fn test_missing_condition_variable_reported_once() {
        let ast = parse("{% if activate_backups %}x{% endif %}");
        let errors = render_ast(&ast, &context(), OutputFormat::Yaml).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].variable, "activate_backups");
    }

    #[test]
    fn test_mixed_errors_all_reported() {
        let ast = parse("{% if sanitized_name %}x{% endif %}\nname: {{ nope }}\ncfg: |\n  {{ database_disk_size_in_gib }}\n");
        let errors = render_ast(&ast, &context(), OutputFormat::Yaml).unwrap_err();
        let kinds: Vec<bool> = errors.iter().map(|e| e.is_missing()).collect();
        assert_eq!(kinds, vec![true, false, false]);
        assert_eq!(errors[1].variable, "sanitized_name");
        assert_eq!(errors[2].variable, "database_disk_size_in_gib");
    }

    #[test]
    fn test_exposures_and_secrets() {
        let ast = parse("name: {{ sanitized_name }}\npassword: \"{{ database_password }}\"\n");
        let doc = render_ast(&ast, &context(), OutputFormat::Yaml).unwrap();

        assert_eq!(doc.text, "name: app1db\npassword: \"s3cr\\\"t\"\n");
        assert!(doc.exposes("sanitized_name"));
        assert_eq!(doc.exposures_of("sanitized_name").next().map(|e| e.value.as_str()), Some("app1db"));
        assert_eq!(doc.secrets, vec!["s3cr\"t".to_string(), "s3cr\\\"t".to_string()]);

        let debug = format!("{:?}", doc);
        assert!(!debug.contains("s3cr"));
        assert!(debug.contains(REDACTED));
        assert_eq!(doc.redacted_text("***"), "name: app1db\npassword: \"***\"\n");
    }

    #[test]
    fn test_storage_class_goes_through_escaping() {
        let ctx = context().with_override("database_disk_type", Value::from("on"));
        let ast = parse("storageClass: {{ database_disk_type }}\n");
        let doc = render_ast(&ast, &ctx, OutputFormat::Yaml).unwrap();
        assert_eq!(doc.text, "storageClass: \"on\"\n");
    }
}
