//! Deployment configuration (backup.yaml)
//!
//! ```yaml
//! project_name: acme
//! region: eu-west-1
//! account_id: "123456789012"   # optional, scopes generated names
//! bucket_name: acme-backups    # optional, generated when unset
//! key:
//!   pending_window_days: 7
//! endpoints:                   # optional, for S3/KMS/SSM-compatible test stacks
//!   s3: http://localhost:4566
//! ```

mod loader;

pub use loader::{BackupConfig, ConfigOverrides, ResolvedConfig, CONFIG_FILE_NAMES, PROJECT_ENV};

use crate::types::KeyPolicy;
use serde::{Deserialize, Serialize};

/// Raw contents of a backup.yaml file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfigFile {
    #[serde(default, alias = "projectName")]
    pub project_name: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub bucket_name: Option<String>,

    #[serde(default)]
    pub key: KeyPolicy,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub posture: PostureOverrides,
}

/// Custom service endpoints, for S3/KMS/SSM-compatible local stacks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub s3: Option<String>,
    #[serde(default)]
    pub kms: Option<String>,
    #[serde(default)]
    pub ssm: Option<String>,
}

/// Posture settings a caller might try to supply.
///
/// They are parsed only so that attempts to relax the bucket posture can be
/// reported. None of them ever reaches the bucket policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostureOverrides {
    #[serde(default)]
    pub public_read_access: Option<bool>,
    #[serde(default)]
    pub block_public_access: Option<bool>,
    #[serde(default)]
    pub enforce_ssl: Option<bool>,
    #[serde(default)]
    pub versioned: Option<bool>,
    #[serde(default)]
    pub removal_policy: Option<String>,
}

impl PostureOverrides {
    /// Names of the settings that would weaken the posture if honored
    pub fn relaxation_attempts(&self) -> Vec<&'static str> {
        let mut attempts = Vec::new();
        if self.public_read_access == Some(true) {
            attempts.push("public_read_access");
        }
        if self.block_public_access == Some(false) {
            attempts.push("block_public_access");
        }
        if self.enforce_ssl == Some(false) {
            attempts.push("enforce_ssl");
        }
        if self.versioned == Some(false) {
            attempts.push("versioned");
        }
        if let Some(removal) = &self.removal_policy {
            if !removal.eq_ignore_ascii_case("retain") {
                attempts.push("removal_policy");
            }
        }
        attempts
    }
}
