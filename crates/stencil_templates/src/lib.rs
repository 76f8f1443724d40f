//! # stencil_templates
//!
//! Template language for infrastructure manifests.
//!
//! Templates mix literal text with `{{ variable }}` references and
//! `{% if cond %}...{% else %}...{% endif %}` blocks. This crate provides:
//!
//! - **Parsing**: a closed AST, with every syntax error located and reported
//!   in one pass
//! - **Evaluation**: typed conditions over a [`ResolvedContext`](stencil_context::ResolvedContext)
//! - **Substitution**: values escaped for the slot they land in (quoted,
//!   block scalar or bare) in YAML, HCL, JSON or plain text
//! - **Caching**: parsed templates shared across renders and threads
//!
//! ## Example
//!
//! ```rust,no_run
//! use stencil_context::ResolvedContext;
//! use stencil_templates::{render_ast, Grammar, OutputFormat, Parser};
//!
//! let parser = Parser::new(Grammar::default()).unwrap();
//! let ast = parser
//!     .parse("values.yaml", "size: {{ database_disk_size_in_gib }}Gi\n")
//!     .unwrap();
//!
//! let context = ResolvedContext::builder()
//!     .insert("database_disk_size_in_gib", 10u32)
//!     .build();
//!
//! let document = render_ast(&ast, &context, OutputFormat::Yaml).unwrap();
//! assert_eq!(document.text, "size: 10Gi\n");
//! ```

pub mod ast;
pub mod cache;
pub mod error;
pub mod eval;
pub mod format;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod substitute;

pub use ast::{CompareOp, Condition, Conditional, Node, Span, TemplateAst, VariableRef};
pub use cache::{AstCache, CacheKey, CacheStats};
pub use error::{
    ResolutionError, ResolutionErrorKind, SyntaxError, SyntaxErrorKind, TemplateError,
    TemplateResult,
};
pub use eval::{Evaluator, Selected};
pub use format::{OutputFormat, QuoteStyle, Slot};
pub use grammar::{Grammar, DEFAULT_MAX_NESTING};
pub use parser::Parser;
pub use substitute::{
    missing_variables, render_ast, Exposure, RenderedDocument, Substitutor,
};
