//! # stencil_context
//!
//! Provisioning requests and the typed contexts templates are rendered from.
//!
//! This crate validates an upstream provisioning request in one batch and
//! resolves it into an immutable [`ResolvedContext`]:
//!
//! - **Validation**: every violated field constraint is reported at once
//! - **Naming rules**: DNS labels, label values and resource names shared by
//!   every downstream consumer
//! - **Version pinning**: requested engine versions are pinned to supported
//!   images
//! - **Secrets**: credentials are tagged sensitive and never printed
//!
//! ## Example
//!
//! ```rust,no_run
//! use stencil_context::{ContextResolver, ProvisioningRequest};
//!
//! let request = ProvisioningRequest::from_yaml_str(
//!     &std::fs::read_to_string("request.yaml").unwrap(),
//! )
//! .unwrap();
//!
//! match ContextResolver::new().resolve(&request) {
//!     Ok(context) => println!("{} variables resolved", context.len()),
//!     Err(errors) => {
//!         for violation in &errors.violations {
//!             eprintln!("Error: {}", violation);
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod error;
pub mod naming;
pub mod request;
pub mod resolver;
pub mod secret;
pub mod validator;
pub mod value;
pub mod version;

pub use context::{ContextBuilder, ContextEntry, ResolvedContext};
pub use error::{ContextError, ContextResult};
pub use naming::IdentifierRule;
pub use request::{CpuQuantity, ProvisioningRequest};
pub use resolver::{ContextResolver, ResolverDefaults};
pub use secret::{Secret, REDACTED};
pub use validator::{FieldViolation, RequestValidator, ValidationErrors, ViolationKind};
pub use value::{Value, ValueKind};
pub use version::{DatabaseKind, VersionNumber};
