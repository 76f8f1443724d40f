//! Database engine version pinning.
//!
//! Requests may ask for `8`, `8.0` or `8.0.24`; the resolver pins the
//! request to a concrete, supported image version. Engine versions are not
//! always SemVer (e.g. `6.x`), hence the dedicated [`VersionNumber`] type.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ContextResult};

/// Database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Mysql,
    Postgresql,
    Mongodb,
    Redis,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Postgresql => "postgresql",
            DatabaseKind::Mongodb => "mongodb",
            DatabaseKind::Redis => "redis",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseKind::Mysql => "MySQL",
            DatabaseKind::Postgresql => "PostgreSQL",
            DatabaseKind::Mongodb => "MongoDB",
            DatabaseKind::Redis => "Redis",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::Mysql => 3306,
            DatabaseKind::Postgresql => 5432,
            DatabaseKind::Mongodb => 27017,
            DatabaseKind::Redis => 6379,
        }
    }

    /// Engine configuration block used when the request carries none.
    pub fn default_configuration(&self) -> &'static str {
        match self {
            DatabaseKind::Mysql => {
                "[mysqld]\ndefault_authentication_plugin=mysql_native_password\nmax_connections=512\ncharacter-set-server=UTF8\nbind-address=0.0.0.0"
            }
            DatabaseKind::Postgresql => "max_connections = 200\nshared_buffers = 128MB",
            DatabaseKind::Mongodb => "net:\n  bindIpAll: true",
            DatabaseKind::Redis => "maxmemory-policy noeviction",
        }
    }

    /// Self-hosted image versions this engine can be pinned to.
    pub fn supported_versions(&self) -> HashMap<String, String> {
        let mut versions = HashMap::new();
        match self {
            DatabaseKind::Mysql => {
                versions.extend(generate_supported_version(5, 7, 7, Some(16), Some(34), None));
                versions.extend(generate_supported_version(8, 0, 0, Some(11), Some(24), None));
            }
            DatabaseKind::Postgresql => {
                versions.extend(generate_supported_version(10, 1, 16, Some(0), Some(0), None));
                versions.extend(generate_supported_version(11, 1, 11, Some(0), Some(0), None));
                versions.extend(generate_supported_version(12, 2, 8, Some(0), Some(0), None));
                versions.extend(generate_supported_version(13, 1, 4, Some(0), Some(0), None));
            }
            DatabaseKind::Mongodb => {
                versions.extend(generate_supported_version(3, 6, 6, Some(0), Some(22), None));
                versions.extend(generate_supported_version(4, 0, 0, Some(0), Some(23), None));
                versions.extend(generate_supported_version(4, 2, 2, Some(0), Some(12), None));
                versions.extend(generate_supported_version(4, 4, 4, Some(0), Some(4), None));
            }
            DatabaseKind::Redis => {
                versions.insert("6".to_string(), "6.0.9".to_string());
                versions.insert("6.0".to_string(), "6.0.9".to_string());
                versions.insert("5".to_string(), "5.0.10".to_string());
                versions.insert("5.0".to_string(), "5.0.10".to_string());
            }
        }
        versions
    }

    /// Pin a requested version to a supported one.
    pub fn pin_version(&self, requested: &str) -> ContextResult<VersionNumber> {
        let pinned = get_supported_version_to_use(self.display_name(), &self.supported_versions(), requested)?;
        VersionNumber::from_str(&pinned)
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loosely structured version: `major[.minor[.patch[.suffix]]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionNumber {
    pub major: String,
    pub minor: Option<String>,
    pub patch: Option<String>,
    pub suffix: Option<String>,
}

impl VersionNumber {
    pub fn new(
        major: impl Into<String>,
        minor: Option<String>,
        patch: Option<String>,
        suffix: Option<String>,
    ) -> Self {
        Self {
            major: major.into(),
            minor,
            patch,
            suffix,
        }
    }

    pub fn major_string(&self) -> &str {
        &self.major
    }

    pub fn major_minor_string(&self, default_minor: &str) -> String {
        format!(
            "{}.{}",
            self.major,
            self.minor.as_deref().unwrap_or(default_minor)
        )
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = std::iter::once(self.major.as_str())
            .chain(self.minor.as_deref())
            .chain(self.patch.as_deref())
            .chain(self.suffix.as_deref())
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for VersionNumber {
    type Err = ContextError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        if version.trim().is_empty() {
            return Err(ContextError::InvalidVersion {
                version: version.to_string(),
                reason: "version cannot be empty".to_string(),
            });
        }

        let mut parts = version.splitn(4, '.').map(str::trim);

        let major = parts
            .next()
            .map(|major| major.replace('v', ""))
            .filter(|major| !major.is_empty())
            .ok_or_else(|| ContextError::InvalidVersion {
                version: version.to_string(),
                reason: "missing major version".to_string(),
            })?;

        let minor = parts.next().map(|minor| minor.replace('+', ""));
        let patch = parts.next().map(str::to_string);
        let suffix = parts.next().map(str::to_string);

        for part in [&minor, &patch].into_iter().flatten() {
            if part.is_empty() {
                return Err(ContextError::InvalidVersion {
                    version: version.to_string(),
                    reason: "empty version component".to_string(),
                });
            }
        }

        Ok(VersionNumber::new(major, minor, patch, suffix))
    }
}

/// Pick the supported version matching the precision of the request.
pub fn get_supported_version_to_use(
    engine: &str,
    supported: &HashMap<String, String>,
    requested: &str,
) -> ContextResult<String> {
    let version = VersionNumber::from_str(requested)?;

    let key = match (&version.minor, &version.patch) {
        (Some(minor), Some(patch)) => format!("{}.{}.{}", version.major, minor, patch),
        (Some(minor), None) => format!("{}.{}", version.major, minor),
        _ => version.major.clone(),
    };

    supported
        .get(&key)
        .cloned()
        .ok_or_else(|| ContextError::UnsupportedVersion {
            engine: engine.to_string(),
            version: requested.to_string(),
        })
}

/// Expand a range of minor (and optionally patch) versions into lookup keys.
///
/// Every `major.minor` key points at the highest patch of that minor, and
/// the bare `major` key points at the highest version overall.
pub fn generate_supported_version(
    major: i32,
    minor_min: i32,
    minor_max: i32,
    update_min: Option<i32>,
    update_max: Option<i32>,
    suffix_version: Option<String>,
) -> HashMap<String, String> {
    let mut supported_versions = HashMap::new();
    let suffix = suffix_version.unwrap_or_default();

    let latest_major_version = match (update_min, update_max) {
        (Some(update_min), Some(update_max)) => {
            for minor in minor_min..=minor_max {
                supported_versions.insert(
                    format!("{}.{}", major, minor),
                    format!("{}.{}.{}{}", major, minor, update_max, suffix),
                );
                for update in update_min..=update_max {
                    let version = format!("{}.{}.{}", major, minor, update);
                    supported_versions.insert(version.clone(), format!("{}{}", version, suffix));
                }
            }
            format!("{}.{}.{}{}", major, minor_max, update_max, suffix)
        }
        _ => {
            for minor in minor_min..=minor_max {
                let version = format!("{}.{}", major, minor);
                supported_versions.insert(version.clone(), format!("{}{}", version, suffix));
            }
            format!("{}.{}{}", major, minor_max, suffix)
        }
    };

    supported_versions.insert(major.to_string(), latest_major_version);
    supported_versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_number_parsing() {
        struct TestCase<'a> {
            input: &'a str,
            expected: Option<VersionNumber>,
            description: &'a str,
        }

        let cases = vec![
            TestCase { input: "", expected: None, description: "empty" },
            TestCase { input: "   ", expected: None, description: "whitespace" },
            TestCase { input: "1..2", expected: None, description: "empty minor" },
            TestCase {
                input: "8",
                expected: Some(VersionNumber::new("8", None, None, None)),
                description: "major only",
            },
            TestCase {
                input: "v8.0",
                expected: Some(VersionNumber::new("8", Some("0".into()), None, None)),
                description: "prefixed major.minor",
            },
            TestCase {
                input: "1.1.1.suffix",
                expected: Some(VersionNumber::new(
                    "1",
                    Some("1".into()),
                    Some("1".into()),
                    Some("suffix".into()),
                )),
                description: "major.minor.patch.suffix",
            },
        ];

        for tc in cases {
            let result = VersionNumber::from_str(tc.input).ok();
            assert_eq!(tc.expected, result, "case {}: '{}'", tc.description, tc.input);
        }
    }

    #[test]
    fn test_version_display() {
        let v = VersionNumber::new("8", Some("0".into()), Some("24".into()), None);
        assert_eq!(v.to_string(), "8.0.24");
        assert_eq!(v.major_minor_string("0"), "8.0");
    }

    #[test]
    fn test_mysql_pinning() {
        let kind = DatabaseKind::Mysql;
        assert_eq!(kind.pin_version("8").unwrap().to_string(), "8.0.24");
        assert_eq!(kind.pin_version("8.0").unwrap().to_string(), "8.0.24");
        assert_eq!(kind.pin_version("5.7").unwrap().to_string(), "5.7.34");
        assert_eq!(kind.pin_version("5.7.20").unwrap().to_string(), "5.7.20");
        assert!(kind.pin_version("9").is_err());
        assert!(kind.pin_version("5.7.99").is_err());
    }

    #[test]
    fn test_postgres_and_redis_pinning() {
        assert_eq!(DatabaseKind::Postgresql.pin_version("13").unwrap().to_string(), "13.4.0");
        assert_eq!(DatabaseKind::Postgresql.pin_version("12.5").unwrap().to_string(), "12.5.0");
        assert_eq!(DatabaseKind::Redis.pin_version("6").unwrap().to_string(), "6.0.9");
        assert_eq!(DatabaseKind::Mongodb.pin_version("4").unwrap().to_string(), "4.4.4");
    }

    #[test]
    fn test_generate_supported_version_without_updates() {
        let versions = generate_supported_version(6, 0, 2, None, None, Some("-r1".into()));
        assert_eq!(versions.get("6.1"), Some(&"6.1-r1".to_string()));
        assert_eq!(versions.get("6"), Some(&"6.2-r1".to_string()));
    }
}
