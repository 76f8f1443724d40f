//! Naming rules shared by every downstream consumer of rendered manifests.
//!
//! Kubernetes object names, label values, Helm release names and cloud
//! resource tags each accept a slightly different alphabet. The rules here
//! are the strictest common subsets, so a value accepted once is accepted
//! by every document it ends up in.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of a DNS label.
pub const DNS_LABEL_MAX_LEN: usize = 63;
/// Maximum length of a DNS subdomain.
pub const DNS_SUBDOMAIN_MAX_LEN: usize = 253;
/// Maximum length of a Kubernetes label value.
pub const LABEL_VALUE_MAX_LEN: usize = 63;
/// Helm refuses release names longer than this.
pub const HELM_RELEASE_NAME_MAX_LEN: usize = 50;

static DNS_1035_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap());

static DNS_1123_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

static LABEL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap());

static TERRAFORM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][-A-Za-z0-9_]*$").unwrap());

static RESOURCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][-A-Za-z0-9_]*$").unwrap());

/// An identifier format constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierRule {
    /// RFC 1035 label: lowercase alphanumerics and `-`, starts with a letter.
    DnsLabel,
    /// Dot-separated RFC 1123 labels, at most 253 characters.
    DnsSubdomain,
    /// Kubernetes label value.
    LabelValue,
    /// Cloud resource name with a provider-specific length limit.
    ResourceName { max_len: usize },
    /// Terraform block label: letters, digits, `_` and `-`, not starting with a digit.
    TerraformName,
}

impl IdentifierRule {
    /// Check `value` against this rule, returning the reason on failure.
    pub fn check(&self, value: &str) -> Result<(), String> {
        match self {
            IdentifierRule::DnsLabel => {
                check_len(value, DNS_LABEL_MAX_LEN)?;
                if !DNS_1035_LABEL.is_match(value) {
                    return Err(
                        "must consist of lowercase alphanumerics or '-', start with a letter and end with an alphanumeric"
                            .to_string(),
                    );
                }
                Ok(())
            }
            IdentifierRule::DnsSubdomain => {
                check_len(value, DNS_SUBDOMAIN_MAX_LEN)?;
                for label in value.split('.') {
                    if label.len() > DNS_LABEL_MAX_LEN || !DNS_1123_LABEL.is_match(label) {
                        return Err(format!("'{}' is not a valid DNS label", label));
                    }
                }
                Ok(())
            }
            IdentifierRule::LabelValue => {
                check_len(value, LABEL_VALUE_MAX_LEN)?;
                if !LABEL_VALUE.is_match(value) {
                    return Err(
                        "must consist of alphanumerics, '-', '_' or '.', and start and end with an alphanumeric"
                            .to_string(),
                    );
                }
                Ok(())
            }
            IdentifierRule::TerraformName => {
                check_len(value, usize::MAX)?;
                if !TERRAFORM_NAME.is_match(value) {
                    return Err(
                        "must consist of letters, digits, '_' or '-' and not start with a digit"
                            .to_string(),
                    );
                }
                Ok(())
            }
            IdentifierRule::ResourceName { max_len } => {
                check_len(value, *max_len)?;
                if !RESOURCE_NAME.is_match(value) {
                    return Err(
                        "must consist of alphanumerics, '-' or '_' and start with an alphanumeric"
                            .to_string(),
                    );
                }
                Ok(())
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            IdentifierRule::DnsLabel => "dns_label".to_string(),
            IdentifierRule::DnsSubdomain => "dns_subdomain".to_string(),
            IdentifierRule::LabelValue => "label_value".to_string(),
            IdentifierRule::ResourceName { max_len } => format!("resource_name({})", max_len),
            IdentifierRule::TerraformName => "terraform_name".to_string(),
        }
    }
}

impl std::fmt::Display for IdentifierRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

fn check_len(value: &str, max: usize) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    let len = value.chars().count();
    if len > max {
        return Err(format!("must be at most {} characters (got {})", max, len));
    }
    Ok(())
}

/// Prefix a name and replace characters Kubernetes rejects.
pub fn sanitize_name(prefix: &str, name: &str) -> String {
    format!("{}-{}", prefix, name).replace('_', "-")
}

/// Name for managed database instances, which reject `-` and `_`.
pub fn managed_db_name_sanitizer(max_size: usize, prefix: &str, name: &str) -> String {
    let max_size = max_size.saturating_sub(prefix.len());
    let mut new_name = format!("{}{}", prefix, name.replace(['_', '-'], ""));
    if new_name.chars().count() > max_size {
        new_name = new_name.chars().take(max_size).collect();
    }
    new_name
}

/// Truncate to at most `max` characters.
pub fn cut(value: impl Into<String>, max: usize) -> String {
    let value = value.into();
    if value.chars().count() <= max {
        value
    } else {
        value.chars().take(max).collect()
    }
}
