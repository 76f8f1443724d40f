//! Batch validation of provisioning requests.
//!
//! Every field is checked and every violation recorded; nothing stops at the
//! first problem. A missing field is reported once and skips the format
//! checks for that field, so each independent mistake yields exactly one
//! [`FieldViolation`].

use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::naming::IdentifierRule;
use crate::request::{CpuQuantity, ProvisioningRequest};
use crate::value::ValueKind;

/// Maximum length of a database login accepted by every engine.
pub const DATABASE_LOGIN_MAX_LEN: usize = 32;

/// What is wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    NotPositive,
    InvalidFormat { reason: String },
    WrongType { expected: ValueKind },
    UnknownField,
    Unsupported { reason: String },
}

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {}", describe(.kind))]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
}

fn describe(kind: &ViolationKind) -> String {
    match kind {
        ViolationKind::Missing => "required field is missing".to_string(),
        ViolationKind::NotPositive => "must be greater than zero".to_string(),
        ViolationKind::InvalidFormat { reason } => reason.clone(),
        ViolationKind::WrongType { expected } => format!("expected a {} value", expected),
        ViolationKind::UnknownField => "unknown field".to_string(),
        ViolationKind::Unsupported { reason } => reason.clone(),
    }
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Every violation found in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{} field violation(s): {}", .violations.len(), summarize(.violations))]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, kind: ViolationKind) {
        self.violations.push(FieldViolation::new(field, kind));
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Names of the offending fields, in report order.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Validator for provisioning requests.
pub struct RequestValidator;

impl RequestValidator {
    /// Validate every field constraint of a request.
    pub fn validate(request: &ProvisioningRequest) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        let id_ok = Self::check_identifier(&mut errors, "id", &request.id, IdentifierRule::LabelValue);
        let env_ok = Self::check_identifier(
            &mut errors,
            "environment_id",
            &request.environment_id,
            IdentifierRule::LabelValue,
        );
        let owner_ok = Self::check_identifier(
            &mut errors,
            "owner_id",
            &request.owner_id,
            IdentifierRule::LabelValue,
        );

        if request.long_id == Uuid::nil() {
            errors.add("long_id", ViolationKind::Missing);
        }

        Self::check_identifier(
            &mut errors,
            "sanitized_name",
            &request.sanitized_name,
            IdentifierRule::DnsLabel,
        );
        Self::check_identifier(&mut errors, "fqdn", &request.fqdn, IdentifierRule::DnsSubdomain);
        Self::check_identifier(
            &mut errors,
            "service_name",
            &request.service_name,
            IdentifierRule::DnsLabel,
        );

        Self::check_cpus(&mut errors, &request.database_total_cpus);

        if request.database_ram_size_in_mib == 0 {
            errors.add("database_ram_size_in_mib", ViolationKind::NotPositive);
        }
        if request.database_disk_size_in_gib == 0 {
            errors.add("database_disk_size_in_gib", ViolationKind::NotPositive);
        }

        Self::check_disk_type(&mut errors, &request.database_disk_type);
        Self::check_login(&mut errors, &request.database_login);

        if request.database_password.is_empty() {
            errors.add("database_password", ViolationKind::Missing);
        }

        if let Some(port) = request.database_port {
            if port == 0 {
                errors.add("database_port", ViolationKind::NotPositive);
            }
        }

        if request.version.trim().is_empty() {
            errors.add("version", ViolationKind::Missing);
        } else if let Err(e) = request.kind().pin_version(&request.version) {
            errors.add(
                "version",
                ViolationKind::Unsupported {
                    reason: e.to_string(),
                },
            );
        }

        // Derived names are only judged once their parts are sound.
        if id_ok && env_ok && owner_ok {
            Self::check_derived(
                &mut errors,
                "namespace",
                &request.namespace(),
                IdentifierRule::DnsLabel,
            );
        }
        if id_ok {
            Self::check_derived(
                &mut errors,
                "helm_release_name",
                &request.helm_release_name(),
                IdentifierRule::DnsLabel,
            );
            Self::check_derived(
                &mut errors,
                "database_instance_name",
                &request.database_instance_name(),
                IdentifierRule::TerraformName,
            );
        }

        errors
    }

    fn check_identifier(
        errors: &mut ValidationErrors,
        field: &str,
        value: &str,
        rule: IdentifierRule,
    ) -> bool {
        if value.is_empty() {
            errors.add(field, ViolationKind::Missing);
            return false;
        }
        match rule.check(value) {
            Ok(()) => true,
            Err(reason) => {
                errors.add(field, ViolationKind::InvalidFormat { reason });
                false
            }
        }
    }

    fn check_derived(errors: &mut ValidationErrors, field: &str, value: &str, rule: IdentifierRule) {
        if let Err(reason) = rule.check(value) {
            errors.add(
                field,
                ViolationKind::InvalidFormat {
                    reason: format!("'{}' {}", value, reason),
                },
            );
        }
    }

    fn check_cpus(errors: &mut ValidationErrors, value: &str) {
        if value.trim().is_empty() {
            errors.add("database_total_cpus", ViolationKind::Missing);
            return;
        }
        match CpuQuantity::from_str(value) {
            Ok(quantity) if quantity.millicores() == 0 => {
                errors.add("database_total_cpus", ViolationKind::NotPositive);
            }
            Ok(_) => {}
            Err(reason) => {
                errors.add("database_total_cpus", ViolationKind::InvalidFormat { reason });
            }
        }
    }

    fn check_disk_type(errors: &mut ValidationErrors, value: &str) {
        if value.is_empty() {
            errors.add("database_disk_type", ViolationKind::Missing);
            return;
        }
        let valid = value
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            errors.add(
                "database_disk_type",
                ViolationKind::InvalidFormat {
                    reason: "must consist of lowercase alphanumerics or '-'".to_string(),
                },
            );
        }
    }

    fn check_login(errors: &mut ValidationErrors, value: &str) {
        if value.is_empty() {
            errors.add("database_login", ViolationKind::Missing);
        } else if value.chars().count() > DATABASE_LOGIN_MAX_LEN {
            errors.add(
                "database_login",
                ViolationKind::InvalidFormat {
                    reason: format!("must be at most {} characters", DATABASE_LOGIN_MAX_LEN),
                },
            );
        } else if value.chars().any(char::is_whitespace) {
            errors.add(
                "database_login",
                ViolationKind::InvalidFormat {
                    reason: "must not contain whitespace".to_string(),
                },
            );
        }
    }
}
