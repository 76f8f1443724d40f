//! Context resolution: request in, typed render context out.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ResolvedContext;
use crate::request::ProvisioningRequest;
use crate::validator::{RequestValidator, ValidationErrors, ViolationKind};
use crate::version::DatabaseKind;

/// Values applied to a request before validation when it leaves them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverDefaults {
    pub database_disk_type: String,
    pub database_kind: DatabaseKind,
}

impl Default for ResolverDefaults {
    fn default() -> Self {
        Self {
            database_disk_type: "ssd".to_string(),
            database_kind: DatabaseKind::Mysql,
        }
    }
}

/// Validates provisioning requests and turns them into render contexts.
#[derive(Debug, Clone, Default)]
pub struct ContextResolver {
    defaults: ResolverDefaults,
}

impl ContextResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: ResolverDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ResolverDefaults {
        &self.defaults
    }

    /// Resolve a request into an immutable context.
    ///
    /// Returns every violated field constraint at once when the request is
    /// invalid.
    pub fn resolve(&self, request: &ProvisioningRequest) -> Result<ResolvedContext, ValidationErrors> {
        let request = self.apply_defaults(request);

        let errors = RequestValidator::validate(&request);
        if !errors.is_empty() {
            warn!(
                "Request {} rejected with {} violation(s)",
                request.id,
                errors.len()
            );
            return Err(errors);
        }

        let kind = request.kind();
        let version = match kind.pin_version(&request.version) {
            Ok(version) => version,
            Err(e) => {
                let mut errors = ValidationErrors::new();
                errors.add(
                    "version",
                    ViolationKind::Unsupported {
                        reason: e.to_string(),
                    },
                );
                return Err(errors);
            }
        };
        debug!("Pinned {} {} to {}", kind.display_name(), request.version, version);

        let port = request.database_port.unwrap_or_else(|| kind.default_port());
        let configuration = request
            .database_configuration
            .clone()
            .unwrap_or_else(|| kind.default_configuration().to_string());

        let context = ResolvedContext::builder()
            .insert("id", request.id.as_str())
            .insert("long_id", request.long_id.to_string())
            .insert("environment_id", request.environment_id.as_str())
            .insert("owner_id", request.owner_id.as_str())
            .insert("sanitized_name", request.sanitized_name.as_str())
            .insert("fqdn", request.fqdn.as_str())
            .insert("service_name", request.service_name.as_str())
            .insert("database_total_cpus", request.database_total_cpus.trim())
            .insert("database_ram_size_in_mib", request.database_ram_size_in_mib)
            .insert("database_disk_size_in_gib", request.database_disk_size_in_gib)
            .insert("database_disk_type", request.database_disk_type.as_str())
            .insert("database_login", request.database_login.as_str())
            .insert_secret("database_password", request.database_password.expose())
            .insert("publicly_accessible", request.publicly_accessible)
            .insert("activate_high_availability", request.activate_high_availability)
            .insert("activate_backups", request.activate_backups)
            .insert("is_test_cluster", request.is_test_cluster)
            .insert("delete_automated_backups", request.is_test_cluster)
            .insert("skip_final_snapshot", request.is_test_cluster)
            .insert("version", version.to_string())
            .insert("version_major", version.major_string())
            .insert("database_kind", kind.as_str())
            .insert("database_port", port)
            .insert("database_configuration", configuration)
            .insert("namespace", request.namespace())
            .insert("helm_release_name", request.helm_release_name())
            .insert("database_instance_name", request.database_instance_name())
            .insert("selector", format!("app={}", request.sanitized_name))
            .build();

        info!(
            "Resolved request {} into {} context entries",
            request.id,
            context.len()
        );
        debug!("Context: {:?}", context);
        Ok(context)
    }

    fn apply_defaults(&self, request: &ProvisioningRequest) -> ProvisioningRequest {
        let mut request = request.clone();
        if request.database_disk_type.is_empty() {
            request.database_disk_type = self.defaults.database_disk_type.clone();
        }
        if request.database_kind.is_none() {
            request.database_kind = Some(self.defaults.database_kind);
        }
        request
    }
}
