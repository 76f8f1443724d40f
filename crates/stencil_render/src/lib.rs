//! # stencil_render
//!
//! Renders template sets into infrastructure manifests.
//!
//! This crate provides:
//!
//! - **Template sets**: documents plus the consistency constraints between
//!   them, loadable from YAML, with a built-in MySQL set
//! - **Rendering**: per-document state machine, sequential or on the Tokio
//!   blocking pool, with cooperative cancellation
//! - **Consistency checks**: identifiers shared across documents must agree
//! - **Reports**: every error of a failed render, with secrets redacted
//! - **Publishing**: hand-off to a [`ManifestSink`] once a render is done
//!
//! ## Example
//!
//! ```rust,no_run
//! use stencil_context::ProvisioningRequest;
//! use stencil_render::{RenderOptions, Renderer, TemplateCatalog};
//!
//! let request = ProvisioningRequest::from_yaml_str(
//!     &std::fs::read_to_string("request.yaml").unwrap(),
//! )
//! .unwrap();
//!
//! let renderer = Renderer::new(RenderOptions::default()).unwrap();
//! let set = TemplateCatalog::builtin().get("mysql").unwrap();
//!
//! match renderer.render(&request, &set) {
//!     Ok(manifests) => {
//!         for (name, document) in manifests.iter() {
//!             println!("--- {}\n{}", name, document.text);
//!         }
//!     }
//!     Err(report) => eprintln!("{}", report),
//! }
//! ```

pub mod catalog;
pub mod consistency;
pub mod error;
pub mod manifest;
pub mod options;
pub mod output;
pub mod redact;
pub mod renderer;
pub mod report;
pub mod sink;
pub mod state;

pub use catalog::TemplateCatalog;
pub use consistency::{
    ConsistencyChecker, ConsistencyConstraint, ConsistencyError, Location, ObservedValue,
};
pub use error::{RenderError, RenderResult};
pub use manifest::{TemplateDocument, TemplateSet};
pub use options::RenderOptions;
pub use output::{validate_output, RenderedManifests};
pub use redact::Redactor;
pub use renderer::{CancellationFlag, RenderInput, Renderer};
pub use report::RenderReport;
pub use sink::{ManifestSink, MemorySink, SinkError};
pub use state::{DocumentProgress, RenderState, RenderTrace, Transition};
