//! Resource naming scoped to a deployment
//!
//! All names are derived from the [`DeploymentContext`] so that repeated runs
//! for the same project land on the same resources.

use crate::error::{Error, Result};
use crate::types::DeploymentContext;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Tag key marking a bucket as belonging to a project's deployment
pub const PROJECT_TAG_KEY: &str = "laptop-backup:project";

/// Tag key recording which component manages a resource
pub const MANAGED_BY_TAG_KEY: &str = "laptop-backup:managed-by";

/// Value of [`MANAGED_BY_TAG_KEY`]
pub const MANAGED_BY_TAG_VALUE: &str = "laptop-backup";

/// Leaf name of the published bucket parameter
pub const BUCKET_PARAMETER_LEAF: &str = "backupBucketName";

const MAX_BUCKET_NAME_LEN: usize = 63;
const NAME_HASH_LEN: usize = 12;

/// Alias of the deployment key, without the `alias/` prefix
pub fn key_alias(ctx: &DeploymentContext) -> String {
    format!("{}-backup-key", sanitize(ctx.project_name(), true))
}

/// Well-known registry path under which the bucket name is published
pub fn bucket_parameter_name(ctx: &DeploymentContext) -> String {
    format!("/{}/{}", ctx.project_name(), BUCKET_PARAMETER_LEAF)
}

/// Tags attached to every resource created for `ctx`
pub fn deployment_tags(ctx: &DeploymentContext) -> Vec<(String, String)> {
    vec![
        (PROJECT_TAG_KEY.to_string(), ctx.project_name().to_string()),
        (
            MANAGED_BY_TAG_KEY.to_string(),
            MANAGED_BY_TAG_VALUE.to_string(),
        ),
    ]
}

/// Overlay `desired` on `existing` tags, keeping every tag key it does not set
pub fn merge_tags(
    existing: &[(String, String)],
    desired: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = existing
        .iter()
        .filter(|(key, _)| !desired.iter().any(|(k, _)| k == key))
        .cloned()
        .collect();
    merged.extend(desired.iter().cloned());
    merged
}

/// Derive a bucket name for `ctx`.
///
/// The result is stable for a given project, region and account, lowercase
/// and at most 63 characters: `<project>-backupbucket-<hash>`.
pub fn generate_bucket_name(ctx: &DeploymentContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ctx.project_name().as_bytes());
    hasher.update(b"|");
    hasher.update(ctx.region.as_bytes());
    hasher.update(b"|");
    hasher.update(ctx.account_id.as_deref().unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    let hash: String = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(NAME_HASH_LEN)
        .collect();

    let project = sanitize(&ctx.project_name().to_ascii_lowercase(), false);
    let mut prefix = if project.is_empty() {
        "backupbucket".to_string()
    } else {
        format!("{}-backupbucket", project)
    };
    prefix.truncate(MAX_BUCKET_NAME_LEN - NAME_HASH_LEN - 1);
    let prefix = prefix.trim_end_matches('-');

    format!("{}-{}", prefix, hash)
}

fn bucket_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9]$").expect("valid bucket name regex")
    })
}

/// Check an explicitly configured bucket name against object-store naming rules
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if !bucket_name_pattern().is_match(name) {
        return Err(Error::configuration(format!(
            "invalid bucket name '{}': use 3-63 lowercase letters, digits, '.' or '-', \
             starting and ending with a letter or digit",
            name
        )));
    }
    if name.contains("..") {
        return Err(Error::configuration(format!(
            "invalid bucket name '{}': consecutive dots are not allowed",
            name
        )));
    }
    if name.starts_with("xn--") || name.ends_with("-s3alias") {
        return Err(Error::configuration(format!(
            "invalid bucket name '{}': reserved prefix or suffix",
            name
        )));
    }
    Ok(())
}

/// Replace characters outside `[a-z0-9-]` (plus `A-Z`, `_` and `/` when
/// `alias` is set) with '-' and collapse runs of '-'.
fn sanitize(value: &str, alias: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        let keep = c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || c == '-'
            || (alias && (c.is_ascii_uppercase() || c == '_' || c == '/'));
        let c = if keep { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectIdentifier;

    fn ctx(project: &str) -> DeploymentContext {
        DeploymentContext::new(ProjectIdentifier::new(project).unwrap(), "us-east-1")
    }

    #[test]
    fn test_key_alias() {
        assert_eq!(key_alias(&ctx("acme")), "acme-backup-key");
        assert_eq!(key_alias(&ctx("My Laptop")), "My-Laptop-backup-key");
    }

    #[test]
    fn test_bucket_parameter_name() {
        assert_eq!(bucket_parameter_name(&ctx("acme")), "/acme/backupBucketName");
    }

    #[test]
    fn test_merge_tags_keeps_existing_keys() {
        let existing = vec![
            ("cost-center".to_string(), "it".to_string()),
            (PROJECT_TAG_KEY.to_string(), "stale".to_string()),
        ];
        let merged = merge_tags(&existing, &deployment_tags(&ctx("acme")));

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], ("cost-center".to_string(), "it".to_string()));
        assert!(merged.contains(&(PROJECT_TAG_KEY.to_string(), "acme".to_string())));
        assert!(!merged.iter().any(|(_, v)| v == "stale"));
    }

    #[test]
    fn test_generated_name_is_deterministic() {
        let a = generate_bucket_name(&ctx("acme"));
        let b = generate_bucket_name(&ctx("acme"));
        assert_eq!(a, b);
        assert!(a.starts_with("acme-backupbucket-"));
        assert!(validate_bucket_name(&a).is_ok());
    }

    #[test]
    fn test_generated_name_is_scoped() {
        let base = generate_bucket_name(&ctx("acme"));
        let other_region = generate_bucket_name(&DeploymentContext::new(
            ProjectIdentifier::new("acme").unwrap(),
            "eu-west-1",
        ));
        let other_account = generate_bucket_name(&ctx("acme").with_account_id("123456789012"));
        assert_ne!(base, other_region);
        assert_ne!(base, other_account);
        assert_ne!(base, generate_bucket_name(&ctx("globex")));
    }

    #[test]
    fn test_generated_name_is_valid_for_awkward_projects() {
        for project in ["My_Laptop!!", "___", &"x".repeat(200), "a.b"] {
            let name = generate_bucket_name(&ctx(project));
            assert!(name.len() <= 63, "{} too long", name);
            assert!(validate_bucket_name(&name).is_ok(), "{} invalid", name);
        }
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("my-backups").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("Upper").is_err());
        assert!(validate_bucket_name("-leading").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("xn--punycode").is_err());
    }

    #[test]
    fn test_deployment_tags() {
        let tags = deployment_tags(&ctx("acme"));
        assert!(tags.contains(&(PROJECT_TAG_KEY.to_string(), "acme".to_string())));
    }
}
