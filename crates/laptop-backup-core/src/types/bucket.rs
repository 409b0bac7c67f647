//! Bucket policy model
//!
//! The security posture of a backup bucket is not configurable. Public
//! access, transport, versioning and removal are single-variant types so a
//! `BucketPolicy` that relaxes them cannot be constructed.

use crate::error::{Error, Result};
use crate::types::key::KeyHandle;
use crate::types::lifecycle::{validate_rules, LifecycleRule};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Statement id of the deny-plaintext statement in the bucket policy
pub const TLS_ONLY_STATEMENT_SID: &str = "DenyInsecureTransport";

/// Merge the statements of `required` into an existing bucket policy.
///
/// Statements of `existing` whose `Sid` matches one in `required` are
/// replaced; every other statement is kept in its original order.
pub fn merge_policy_document(
    existing: Option<&serde_json::Value>,
    required: &serde_json::Value,
) -> serde_json::Value {
    fn statements(doc: &serde_json::Value) -> Vec<serde_json::Value> {
        match doc.get("Statement") {
            Some(serde_json::Value::Array(list)) => list.clone(),
            Some(single @ serde_json::Value::Object(_)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }
    fn sid(statement: &serde_json::Value) -> Option<&str> {
        statement.get("Sid").and_then(|sid| sid.as_str())
    }

    let Some(existing) = existing else {
        return required.clone();
    };

    let added = statements(required);
    let replaced: Vec<&str> = added.iter().filter_map(sid).collect();
    let mut merged: Vec<serde_json::Value> = statements(existing)
        .into_iter()
        .filter(|s| sid(s).is_none_or(|id| !replaced.contains(&id)))
        .collect();
    merged.extend(added);

    let mut document = existing.clone();
    if !document.is_object() {
        document = json!({});
    }
    document["Version"] = existing
        .get("Version")
        .or_else(|| required.get("Version"))
        .cloned()
        .unwrap_or_else(|| json!("2012-10-17"));
    document["Statement"] = serde_json::Value::Array(merged);
    document
}

/// How the bucket gets its physical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameStrategy {
    /// Use exactly this name
    Explicit(String),
    /// Let the engine derive a name, only if the backend needs one at creation
    GenerateIfNeeded,
}

impl NameStrategy {
    pub fn from_option(name: Option<String>) -> Self {
        match name {
            Some(name) if !name.trim().is_empty() => NameStrategy::Explicit(name),
            _ => NameStrategy::GenerateIfNeeded,
        }
    }
}

/// Server-side encryption bound to the deployment key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionBinding {
    pub key_id: String,
    pub key_arn: String,
    pub key_alias: String,
    /// Use bucket-level data keys to cut per-object key service calls
    pub bucket_key_enabled: bool,
}

impl EncryptionBinding {
    pub fn for_key(key: &KeyHandle) -> Self {
        Self {
            key_id: key.key_id.clone(),
            key_arn: key.arn.clone(),
            key_alias: key.alias.clone(),
            bucket_key_enabled: true,
        }
    }

    /// Whether a key reference reported by the backend designates this key.
    ///
    /// The backend may report the bare key id, the key ARN, the alias name
    /// or the alias ARN.
    pub fn matches_key_reference(&self, reference: &str) -> bool {
        let alias = format!("alias/{}", self.key_alias);
        reference == self.key_id
            || reference == self.key_arn
            || reference == alias
            || reference.ends_with(&format!(":{}", alias))
    }
}

/// Public access stance. There is only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicAccessStance {
    #[default]
    DenyAll,
}

impl PublicAccessStance {
    pub fn block_configuration(&self) -> PublicAccessBlock {
        match self {
            PublicAccessStance::DenyAll => PublicAccessBlock::all(),
        }
    }
}

/// Bucket-level public access switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn all() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }

    pub fn is_fully_blocked(&self) -> bool {
        *self == Self::all()
    }
}

/// Transport requirement. There is only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportRequirement {
    #[default]
    TlsOnly,
}

impl TransportRequirement {
    /// Bucket policy document that rejects every request not made over TLS
    pub fn policy_document(&self, bucket: &str) -> serde_json::Value {
        match self {
            TransportRequirement::TlsOnly => json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": TLS_ONLY_STATEMENT_SID,
                    "Effect": "Deny",
                    "Principal": { "AWS": "*" },
                    "Action": "s3:*",
                    "Resource": [
                        format!("arn:aws:s3:::{}", bucket),
                        format!("arn:aws:s3:::{}/*", bucket),
                    ],
                    "Condition": { "Bool": { "aws:SecureTransport": "false" } }
                }]
            }),
        }
    }
}

/// Versioning requirement. Always enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Versioning {
    #[default]
    Enabled,
}

/// Removal behavior of the bucket on teardown. Always retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketRemoval {
    #[default]
    Retain,
}

/// Declared policy for the backup bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPolicy {
    pub name: NameStrategy,
    /// Physical name, set once the bucket exists
    pub resolved_name: Option<String>,
    pub encryption: EncryptionBinding,
    pub public_access: PublicAccessStance,
    pub transport: TransportRequirement,
    pub versioning: Versioning,
    pub removal: BucketRemoval,
    pub lifecycle_rules: Vec<LifecycleRule>,
}

impl BucketPolicy {
    /// Build the policy for `key`. Fails if the rule set is invalid.
    pub fn new(name: NameStrategy, key: &KeyHandle, lifecycle_rules: Vec<LifecycleRule>) -> Result<Self> {
        validate_rules(&lifecycle_rules)?;
        if let NameStrategy::Explicit(explicit) = &name {
            crate::naming::validate_bucket_name(explicit)?;
        }

        Ok(Self {
            name,
            resolved_name: None,
            encryption: EncryptionBinding::for_key(key),
            public_access: PublicAccessStance::DenyAll,
            transport: TransportRequirement::TlsOnly,
            versioning: Versioning::Enabled,
            removal: BucketRemoval::Retain,
            lifecycle_rules,
        })
    }

    pub fn with_resolved_name(mut self, name: impl Into<String>) -> Self {
        self.resolved_name = Some(name.into());
        self
    }

    /// Refuse to converge a bucket that belongs to another project, or whose
    /// encryption or versioning was set to something this policy would have
    /// to overwrite.
    pub fn check_compatible(&self, state: &BucketState, project: &str) -> Result<()> {
        let resource = format!("bucket {}", state.name);

        state.check_owner(project)?;

        match &state.encryption {
            // S3-managed keys are the object store's default; upgrading them is safe
            EncryptionState::None | EncryptionState::S3Managed => {}
            EncryptionState::Kms { key_reference, .. } => {
                if !self.encryption.matches_key_reference(key_reference) {
                    return Err(Error::policy_conflict(
                        resource,
                        format!(
                            "bucket is encrypted with KMS key {}, expected {}",
                            key_reference, self.encryption.key_arn
                        ),
                    ));
                }
            }
        }

        if state.versioning == VersioningState::Suspended {
            return Err(Error::policy_conflict(
                resource,
                "versioning has been suspended on this bucket",
            ));
        }

        Ok(())
    }

    /// Settings of `state` that differ from this policy
    pub fn drift(&self, state: &BucketState) -> Vec<PolicyDrift> {
        let mut drift = Vec::new();

        let encryption_ok = matches!(
            &state.encryption,
            EncryptionState::Kms { key_reference, bucket_key_enabled }
                if self.encryption.matches_key_reference(key_reference)
                    && *bucket_key_enabled == self.encryption.bucket_key_enabled
        );
        if !encryption_ok {
            drift.push(PolicyDrift::Encryption);
        }
        if state.versioning != VersioningState::Enabled {
            drift.push(PolicyDrift::Versioning);
        }
        let public_access_ok = state
            .public_access_block
            .map(|block| block == self.public_access.block_configuration())
            .unwrap_or(false);
        if !public_access_ok || !state.acls_disabled {
            drift.push(PolicyDrift::PublicAccess);
        }
        if !state.tls_enforced {
            drift.push(PolicyDrift::Transport);
        }
        if state.lifecycle_rules != self.lifecycle_rules {
            drift.push(PolicyDrift::Lifecycle);
        }
        if state.project_tag.is_none() {
            drift.push(PolicyDrift::Tags);
        }

        drift
    }
}

/// A bucket setting that needs to be (re)applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyDrift {
    Encryption,
    Versioning,
    PublicAccess,
    Transport,
    Lifecycle,
    Tags,
}

impl std::fmt::Display for PolicyDrift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyDrift::Encryption => write!(f, "encryption"),
            PolicyDrift::Versioning => write!(f, "versioning"),
            PolicyDrift::PublicAccess => write!(f, "public access block"),
            PolicyDrift::Transport => write!(f, "transport policy"),
            PolicyDrift::Lifecycle => write!(f, "lifecycle rules"),
            PolicyDrift::Tags => write!(f, "deployment tags"),
        }
    }
}

/// Default encryption observed on an existing bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionState {
    None,
    S3Managed,
    Kms {
        key_reference: String,
        bucket_key_enabled: bool,
    },
}

/// Versioning status observed on an existing bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningState {
    /// Versioning was never turned on
    Unversioned,
    Enabled,
    Suspended,
}

/// Observed configuration of an existing bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    pub name: String,
    pub encryption: EncryptionState,
    pub versioning: VersioningState,
    pub public_access_block: Option<PublicAccessBlock>,
    pub acls_disabled: bool,
    pub tls_enforced: bool,
    pub lifecycle_rules: Vec<LifecycleRule>,
    /// Value of the project tag used to locate it, if tagged
    pub project_tag: Option<String>,
}

impl BucketState {
    /// State of a freshly created bucket with nothing applied
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encryption: EncryptionState::None,
            versioning: VersioningState::Unversioned,
            public_access_block: None,
            acls_disabled: false,
            tls_enforced: false,
            lifecycle_rules: Vec::new(),
            project_tag: None,
        }
    }

    /// Fail if the bucket is tagged for a different project
    pub fn check_owner(&self, project: &str) -> Result<()> {
        match self.project_tag.as_deref() {
            Some(owner) if owner != project => Err(Error::policy_conflict(
                format!("bucket {}", self.name),
                format!("bucket belongs to project '{}'", owner),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::key::{KeyDescription, KeyPolicy, KeyState};

    fn key() -> KeyHandle {
        KeyHandle::from_description(
            KeyDescription {
                key_id: "k-123".to_string(),
                arn: "arn:aws:kms:us-east-1:111122223333:key/k-123".to_string(),
                state: KeyState::Enabled,
            },
            "acme-backup-key".to_string(),
            &KeyPolicy::default(),
        )
    }

    fn policy() -> BucketPolicy {
        BucketPolicy::new(NameStrategy::GenerateIfNeeded, &key(), LifecycleRule::defaults())
            .unwrap()
    }

    fn converged_state(policy: &BucketPolicy) -> BucketState {
        BucketState {
            name: "acme-bucket".to_string(),
            encryption: EncryptionState::Kms {
                key_reference: policy.encryption.key_arn.clone(),
                bucket_key_enabled: true,
            },
            versioning: VersioningState::Enabled,
            public_access_block: Some(PublicAccessBlock::all()),
            acls_disabled: true,
            tls_enforced: true,
            lifecycle_rules: policy.lifecycle_rules.clone(),
            project_tag: Some("acme".to_string()),
        }
    }

    #[test]
    fn test_posture_is_fixed() {
        let policy = policy();
        assert_eq!(policy.public_access, PublicAccessStance::DenyAll);
        assert_eq!(policy.transport, TransportRequirement::TlsOnly);
        assert_eq!(policy.versioning, Versioning::Enabled);
        assert_eq!(policy.removal, BucketRemoval::Retain);
        assert!(policy.public_access.block_configuration().is_fully_blocked());
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let err = BucketPolicy::new(NameStrategy::GenerateIfNeeded, &key(), vec![]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_explicit_name_rejected() {
        let err = BucketPolicy::new(
            NameStrategy::Explicit("Not_A_Bucket".to_string()),
            &key(),
            LifecycleRule::defaults(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_tls_policy_document() {
        let doc = TransportRequirement::TlsOnly.policy_document("acme-bucket");
        let statement = &doc["Statement"][0];
        assert_eq!(statement["Effect"], "Deny");
        assert_eq!(statement["Sid"], TLS_ONLY_STATEMENT_SID);
        assert_eq!(
            statement["Condition"]["Bool"]["aws:SecureTransport"],
            "false"
        );
        assert_eq!(statement["Resource"][1], "arn:aws:s3:::acme-bucket/*");
    }

    #[test]
    fn test_policy_merge_keeps_foreign_statements() {
        let required = TransportRequirement::TlsOnly.policy_document("acme-bucket");
        let existing = json!({
            "Version": "2008-10-17",
            "Statement": [
                { "Sid": "AllowBackupAgent", "Effect": "Allow", "Action": "s3:PutObject" },
                { "Sid": TLS_ONLY_STATEMENT_SID, "Effect": "Deny", "Action": "s3:GetObject" },
                { "Effect": "Allow", "Action": "s3:ListBucket" }
            ]
        });

        let merged = merge_policy_document(Some(&existing), &required);
        let statements = merged["Statement"].as_array().unwrap();
        assert_eq!(merged["Version"], "2008-10-17");
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0]["Sid"], "AllowBackupAgent");
        assert_eq!(statements[1]["Action"], "s3:ListBucket");
        assert_eq!(statements[2], required["Statement"][0]);
    }

    #[test]
    fn test_policy_merge_without_existing_policy() {
        let required = TransportRequirement::TlsOnly.policy_document("acme-bucket");
        assert_eq!(merge_policy_document(None, &required), required);

        let single = json!({ "Statement": { "Sid": "Only", "Effect": "Allow" } });
        let merged = merge_policy_document(Some(&single), &required);
        assert_eq!(merged["Statement"].as_array().unwrap().len(), 2);
        assert_eq!(merged["Version"], "2012-10-17");
    }

    #[test]
    fn test_key_reference_matching() {
        let binding = EncryptionBinding::for_key(&key());
        assert!(binding.matches_key_reference("k-123"));
        assert!(binding.matches_key_reference("arn:aws:kms:us-east-1:111122223333:key/k-123"));
        assert!(binding.matches_key_reference("alias/acme-backup-key"));
        assert!(binding.matches_key_reference(
            "arn:aws:kms:us-east-1:111122223333:alias/acme-backup-key"
        ));
        assert!(!binding.matches_key_reference("k-999"));
    }

    #[test]
    fn test_compatible_states() {
        let policy = policy();
        assert!(policy.check_compatible(&converged_state(&policy), "acme").is_ok());
        assert!(policy.check_compatible(&BucketState::empty("fresh"), "acme").is_ok());
    }

    #[test]
    fn test_conflicting_encryption() {
        let policy = policy();
        let mut state = converged_state(&policy);
        state.encryption = EncryptionState::Kms {
            key_reference: "some-other-key".to_string(),
            bucket_key_enabled: true,
        };
        assert!(policy.check_compatible(&state, "acme").unwrap_err().is_policy_conflict());

        state.encryption = EncryptionState::S3Managed;
        assert!(policy.check_compatible(&state, "acme").is_ok());
        assert!(policy.drift(&state).contains(&PolicyDrift::Encryption));
    }

    #[test]
    fn test_suspended_versioning_conflicts() {
        let policy = policy();
        let mut state = converged_state(&policy);
        state.versioning = VersioningState::Suspended;
        assert!(policy.check_compatible(&state, "acme").unwrap_err().is_policy_conflict());
    }

    #[test]
    fn test_bucket_of_another_project_conflicts() {
        let policy = policy();
        let mut state = converged_state(&policy);
        state.project_tag = Some("globex".to_string());

        let err = policy.check_compatible(&state, "acme").unwrap_err();
        assert!(err.is_policy_conflict());
        assert!(err.to_string().contains("globex"));
        assert!(state.check_owner("globex").is_ok());
        assert!(BucketState::empty("fresh").check_owner("acme").is_ok());
    }

    #[test]
    fn test_disabled_bucket_key_drifts() {
        let policy = policy();
        let mut state = converged_state(&policy);
        state.encryption = EncryptionState::Kms {
            key_reference: policy.encryption.key_arn.clone(),
            bucket_key_enabled: false,
        };

        assert!(policy.check_compatible(&state, "acme").is_ok());
        assert_eq!(policy.drift(&state), vec![PolicyDrift::Encryption]);
    }

    #[test]
    fn test_drift_detection() {
        let policy = policy();
        assert!(policy.drift(&converged_state(&policy)).is_empty());

        let drift = policy.drift(&BucketState::empty("fresh"));
        assert_eq!(
            drift,
            vec![
                PolicyDrift::Encryption,
                PolicyDrift::Versioning,
                PolicyDrift::PublicAccess,
                PolicyDrift::Transport,
                PolicyDrift::Lifecycle,
                PolicyDrift::Tags,
            ]
        );

        let mut state = converged_state(&policy);
        state.public_access_block = Some(PublicAccessBlock {
            block_public_policy: false,
            ..PublicAccessBlock::all()
        });
        assert_eq!(policy.drift(&state), vec![PolicyDrift::PublicAccess]);
    }
}
