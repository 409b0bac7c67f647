//! Registry records: discoverable name/value pairs

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Longest parameter name the registry accepts
pub const MAX_PARAMETER_NAME_LEN: usize = 1011;

/// Deepest parameter hierarchy the registry accepts
pub const MAX_PARAMETER_DEPTH: usize = 15;

/// Largest value of a standard-tier parameter, in bytes
pub const MAX_PARAMETER_VALUE_BYTES: usize = 4096;

/// Type of a published value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterType {
    /// Plain, unencrypted string
    #[default]
    String,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "String",
        }
    }
}

/// A published name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub parameter_type: ParameterType,
}

impl RegistryRecord {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            parameter_type: ParameterType::String,
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.\-/]+$").expect("valid parameter name regex"))
}

/// Check a parameter name against the registry's naming rules
pub fn validate_parameter_name(name: &str) -> Result<()> {
    let reject = |reason: String| Error::provisioning(format!("parameter {}", name), reason);

    if name.is_empty() {
        return Err(reject("parameter name must not be empty".to_string()));
    }
    if name.len() > MAX_PARAMETER_NAME_LEN {
        return Err(reject(format!(
            "parameter name exceeds {} characters",
            MAX_PARAMETER_NAME_LEN
        )));
    }
    if !name_pattern().is_match(name) {
        return Err(reject(
            "parameter name may only contain letters, digits, '_', '.', '-' and '/'".to_string(),
        ));
    }
    if name.contains('/') && !name.starts_with('/') {
        return Err(reject(
            "hierarchical parameter names must start with '/'".to_string(),
        ));
    }

    let segments: Vec<&str> = name.trim_start_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(reject("parameter name contains an empty path segment".to_string()));
    }
    if segments.len() > MAX_PARAMETER_DEPTH {
        return Err(reject(format!(
            "parameter hierarchy is deeper than {} levels",
            MAX_PARAMETER_DEPTH
        )));
    }
    let first = segments[0].to_ascii_lowercase();
    if first.starts_with("aws") || first.starts_with("ssm") {
        return Err(reject(
            "parameter names may not begin with 'aws' or 'ssm'".to_string(),
        ));
    }

    Ok(())
}

/// Check a parameter value against the registry's size rules
pub fn validate_parameter_value(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::provisioning(
            format!("parameter {}", name),
            "parameter value must not be empty",
        ));
    }
    if value.len() > MAX_PARAMETER_VALUE_BYTES {
        return Err(Error::provisioning(
            format!("parameter {}", name),
            format!("parameter value exceeds {} bytes", MAX_PARAMETER_VALUE_BYTES),
        ));
    }
    Ok(())
}
