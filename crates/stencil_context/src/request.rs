//! Provisioning requests as supplied by the upstream system.

use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::ContextResult;
use crate::naming::{
    cut, managed_db_name_sanitizer, sanitize_name, DNS_LABEL_MAX_LEN, HELM_RELEASE_NAME_MAX_LEN,
};
use crate::secret::Secret;
use crate::validator::{ValidationErrors, ViolationKind};
use crate::value::ValueKind;
use crate::version::DatabaseKind;

/// A request to provision one managed database.
///
/// Requests are immutable once handed to the resolver. Field constraints are
/// checked by [`RequestValidator`](crate::RequestValidator), never here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisioningRequest {
    pub id: String,
    pub long_id: Uuid,
    pub environment_id: String,
    pub owner_id: String,

    pub sanitized_name: String,
    pub fqdn: String,
    pub service_name: String,

    /// Kubernetes CPU quantity, e.g. `500m` or `2`.
    pub database_total_cpus: String,
    pub database_ram_size_in_mib: u32,
    pub database_disk_size_in_gib: u32,
    pub database_disk_type: String,

    pub database_login: String,
    pub database_password: Secret,

    pub publicly_accessible: bool,
    pub activate_high_availability: bool,
    pub activate_backups: bool,
    pub is_test_cluster: bool,

    pub version: String,
    /// Falls back to the resolver default when absent.
    pub database_kind: Option<DatabaseKind>,
    pub database_port: Option<u16>,
    pub database_configuration: Option<String>,
}

/// Expected YAML type of every field a request accepts.
const FIELD_TYPES: &[(&str, ValueKind)] = &[
    ("id", ValueKind::String),
    ("long_id", ValueKind::String),
    ("environment_id", ValueKind::String),
    ("owner_id", ValueKind::String),
    ("sanitized_name", ValueKind::String),
    ("fqdn", ValueKind::String),
    ("service_name", ValueKind::String),
    ("database_total_cpus", ValueKind::String),
    ("database_ram_size_in_mib", ValueKind::Integer),
    ("database_disk_size_in_gib", ValueKind::Integer),
    ("database_disk_type", ValueKind::String),
    ("database_login", ValueKind::String),
    ("database_password", ValueKind::String),
    ("publicly_accessible", ValueKind::Boolean),
    ("activate_high_availability", ValueKind::Boolean),
    ("activate_backups", ValueKind::Boolean),
    ("is_test_cluster", ValueKind::Boolean),
    ("version", ValueKind::String),
    ("database_kind", ValueKind::String),
    ("database_port", ValueKind::Integer),
    ("database_configuration", ValueKind::String),
];

impl ProvisioningRequest {
    /// Load a request from YAML text.
    ///
    /// Field types and unknown fields are checked in one batch before the
    /// document is deserialized, so a request with several type errors
    /// reports all of them.
    pub fn from_yaml_str(content: &str) -> ContextResult<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let mapping = match document {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => {
                let mut errors = ValidationErrors::new();
                errors.add(
                    "<root>",
                    ViolationKind::InvalidFormat {
                        reason: "request must be a mapping".to_string(),
                    },
                );
                return Err(errors.into());
            }
        };

        let mut errors = ValidationErrors::new();
        for (key, value) in &mapping {
            let Some(key) = key.as_str() else {
                errors.add(
                    format!("{:?}", key),
                    ViolationKind::InvalidFormat {
                        reason: "field names must be strings".to_string(),
                    },
                );
                continue;
            };
            match FIELD_TYPES.iter().find(|(name, _)| *name == key) {
                None => errors.add(key, ViolationKind::UnknownField),
                Some((_, expected)) => check_yaml_field(&mut errors, key, *expected, value),
            }
        }
        errors.into_result()?;

        let request: ProvisioningRequest =
            serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?;
        debug!("Loaded provisioning request {}", request.id);
        Ok(request)
    }

    /// Engine family, defaulting to MySQL.
    pub fn kind(&self) -> DatabaseKind {
        self.database_kind.unwrap_or_default()
    }

    /// Kubernetes namespace the database lives in.
    pub fn namespace(&self) -> String {
        format!("{}-{}", self.owner_id, self.environment_id)
    }

    /// Helm release name: `<kind>-<id>`, cut to the Helm limit.
    pub fn helm_release_name(&self) -> String {
        cut(sanitize_name(self.kind().as_str(), &self.id), HELM_RELEASE_NAME_MAX_LEN)
            .trim_end_matches('-')
            .to_string()
    }

    /// Instance name for managed database services and Terraform labels.
    pub fn database_instance_name(&self) -> String {
        managed_db_name_sanitizer(DNS_LABEL_MAX_LEN, "db", &self.id)
    }
}

fn check_yaml_field(
    errors: &mut ValidationErrors,
    field: &str,
    expected: ValueKind,
    value: &serde_yaml::Value,
) {
    // Explicit nulls fall back to the default and are judged by the validator.
    if value.is_null() {
        return;
    }

    let type_ok = match expected {
        ValueKind::String => value.is_string(),
        ValueKind::Integer => value.as_u64().is_some(),
        ValueKind::Boolean => value.is_bool(),
    };
    if !type_ok {
        errors.add(field, ViolationKind::WrongType { expected });
        return;
    }

    let Some(text) = value.as_str() else {
        if field == "database_port" && value.as_u64().is_some_and(|p| p > u64::from(u16::MAX)) {
            errors.add(
                field,
                ViolationKind::InvalidFormat {
                    reason: format!("must be at most {}", u16::MAX),
                },
            );
        } else if value.as_u64().is_some_and(|n| n > u64::from(u32::MAX)) {
            errors.add(
                field,
                ViolationKind::InvalidFormat {
                    reason: format!("must be at most {}", u32::MAX),
                },
            );
        }
        return;
    };

    match field {
        "long_id" => {
            if let Err(e) = Uuid::parse_str(text) {
                errors.add(field, ViolationKind::InvalidFormat { reason: e.to_string() });
            }
        }
        "database_kind" => {
            if serde_yaml::from_value::<DatabaseKind>(value.clone()).is_err() {
                errors.add(
                    field,
                    ViolationKind::Unsupported {
                        reason: format!("unknown database kind '{}'", text),
                    },
                );
            }
        }
        _ => {}
    }
}

/// A Kubernetes CPU quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuQuantity {
    millicores: u64,
}

impl CpuQuantity {
    pub fn from_millicores(millicores: u64) -> Self {
        Self { millicores }
    }

    pub fn millicores(&self) -> u64 {
        self.millicores
    }
}

impl FromStr for CpuQuantity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("'{}' is not a CPU quantity", s);

        if let Some(milli) = s.strip_suffix('m') {
            if milli.is_empty() || !milli.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            return milli
                .parse::<u64>()
                .map(Self::from_millicores)
                .map_err(|_| invalid());
        }

        let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > 3
        {
            return Err(invalid());
        }

        let cores: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let milli: u64 = if fraction.is_empty() {
            0
        } else {
            format!("{:0<3}", fraction).parse().map_err(|_| invalid())?
        };

        cores
            .checked_mul(1000)
            .and_then(|c| c.checked_add(milli))
            .map(Self::from_millicores)
            .ok_or_else(invalid)
    }
}

impl std::fmt::Display for CpuQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.millicores % 1000 == 0 {
            write!(f, "{}", self.millicores / 1000)
        } else {
            write!(f, "{}m", self.millicores)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ContextError;

    pub(crate) fn valid_request() -> ProvisioningRequest {
        ProvisioningRequest {
            id: "z4c5d6e7f".to_string(),
            long_id: Uuid::from_u128(0x8d5a_1f2e_4b3c_4d5e_9f60_7182_93a4_b5c6),
            environment_id: "zenv1".to_string(),
            owner_id: "zorg1".to_string(),
            sanitized_name: "app1db".to_string(),
            fqdn: "zf1b3c2a1-mysql.example.com".to_string(),
            service_name: "mysql-app1db".to_string(),
            database_total_cpus: "500m".to_string(),
            database_ram_size_in_mib: 512,
            database_disk_size_in_gib: 10,
            database_disk_type: "gp2".to_string(),
            database_login: "superuser".to_string(),
            database_password: Secret::new("s3cr3t-pw"),
            publicly_accessible: true,
            activate_high_availability: false,
            activate_backups: false,
            is_test_cluster: false,
            version: "8.0".to_string(),
            database_kind: Some(DatabaseKind::Mysql),
            database_port: None,
            database_configuration: None,
        }
    }

    #[test]
    fn test_cpu_quantity() {
        assert_eq!("500m".parse::<CpuQuantity>().unwrap().millicores(), 500);
        assert_eq!("2".parse::<CpuQuantity>().unwrap().millicores(), 2000);
        assert_eq!("0.5".parse::<CpuQuantity>().unwrap().millicores(), 500);
        assert_eq!("1.25".parse::<CpuQuantity>().unwrap().to_string(), "1250m");
        assert!("lots".parse::<CpuQuantity>().is_err());
        assert!("m".parse::<CpuQuantity>().is_err());
        assert!("1.2345".parse::<CpuQuantity>().is_err());
        assert!("-1".parse::<CpuQuantity>().is_err());
    }

    #[test]
    fn test_namespace() {
        assert_eq!(valid_request().namespace(), "zorg1-zenv1");
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
id: z4c5d6e7f
long_id: 8d5a1f2e-4b3c-4d5e-9f60-718293a4b5c6
environment_id: zenv1
owner_id: zorg1
sanitized_name: app1db
fqdn: zf1b3c2a1-mysql.example.com
service_name: mysql-app1db
database_total_cpus: "500m"
database_ram_size_in_mib: 512
database_disk_size_in_gib: 10
database_disk_type: gp2
database_login: superuser
database_password: s3cr3t-pw
publicly_accessible: true
version: "8.0"
"#;
        let request = ProvisioningRequest::from_yaml_str(yaml).unwrap();
        assert_eq!(request.sanitized_name, "app1db");
        assert_eq!(request.database_password.expose(), "s3cr3t-pw");
        assert_eq!(request.database_kind, None);
        assert_eq!(request.kind(), DatabaseKind::Mysql);
        assert!(request.publicly_accessible);
        assert!(!request.is_test_cluster);
    }

    #[test]
    fn test_from_yaml_reports_every_type_error() {
        let yaml = r#"
id: z4c5d6e7f
publicly_accessible: "yes"
database_disk_size_in_gib: ten
long_id: not-a-uuid
database_kind: oracle
colour: blue
"#;
        let err = ProvisioningRequest::from_yaml_str(yaml).unwrap_err();
        let ContextError::Validation(errors) = err else {
            panic!("expected validation error, got {:?}", err);
        };
        assert_eq!(
            errors.fields(),
            vec![
                "publicly_accessible",
                "database_disk_size_in_gib",
                "long_id",
                "database_kind",
                "colour"
            ]
        );
        assert_eq!(errors.violations[4].kind, ViolationKind::UnknownField);
        assert_eq!(
            errors.violations[0].kind,
            ViolationKind::WrongType {
                expected: ValueKind::Boolean
            }
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let debug = format!("{:?}", valid_request());
        assert!(!debug.contains("s3cr3t-pw"));
    }
}
