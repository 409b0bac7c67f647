//! S3 bucket backend
//!
//! Observes and applies the bucket settings the storage policy engine
//! manages: tags, default encryption, versioning, public access block plus
//! object ownership, the TLS-only bucket policy and lifecycle rules.

use crate::errors::{build_error, has_code, sdk_error};
use async_trait::async_trait;
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketLifecycleConfiguration, BucketLocationConstraint,
    BucketVersioningStatus, CreateBucketConfiguration, ExpirationStatus,
    LifecycleRule as S3LifecycleRule, LifecycleRuleFilter, NoncurrentVersionTransition,
    ObjectOwnership, OwnershipControls, OwnershipControlsRule, PublicAccessBlockConfiguration,
    ServerSideEncryption, ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration,
    ServerSideEncryptionRule, Tag, Tagging, Transition as S3Transition, TransitionStorageClass,
    VersioningConfiguration,
};
use aws_sdk_s3::Client;
use laptop_backup_core::naming::{self, PROJECT_TAG_KEY};
use laptop_backup_core::types::{
    merge_policy_document, BucketState, DeploymentContext, EncryptionBinding, EncryptionState, LifecycleRule,
    PublicAccessBlock, StorageClass, Transition, VersioningState, DEFAULT_REGION,
    TLS_ONLY_STATEMENT_SID,
};
use laptop_backup_core::{Error, Result};
use laptop_backup_provision::StorageBackend;
use tracing::debug;

const NO_ENCRYPTION: &[&str] = &["ServerSideEncryptionConfigurationNotFoundError"];
const NO_PUBLIC_ACCESS_BLOCK: &[&str] = &["NoSuchPublicAccessBlockConfiguration"];
const NO_OWNERSHIP_CONTROLS: &[&str] = &["OwnershipControlsNotFoundError"];
const NO_POLICY: &[&str] = &["NoSuchBucketPolicy"];
const NO_LIFECYCLE: &[&str] = &["NoSuchLifecycleConfiguration"];
const NO_TAGS: &[&str] = &["NoSuchTagSet"];

pub struct S3StorageBackend {
    client: Client,
    region: String,
}

fn resource(bucket: &str) -> String {
    format!("bucket {}", bucket)
}

impl S3StorageBackend {
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    async fn tags(&self, bucket: &str) -> Result<Vec<(String, String)>> {
        match self.client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(resp) => Ok(resp
                .tag_set()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect()),
            Err(e) if has_code(&e, NO_TAGS) => Ok(Vec::new()),
            Err(e) => Err(sdk_error(resource(bucket), "GetBucketTagging", e)),
        }
    }

    async fn encryption(&self, bucket: &str) -> Result<EncryptionState> {
        match self.client.get_bucket_encryption().bucket(bucket).send().await {
            Ok(resp) => Ok(resp
                .server_side_encryption_configuration()
                .map(encryption_state)
                .unwrap_or(EncryptionState::None)),
            Err(e) if has_code(&e, NO_ENCRYPTION) => Ok(EncryptionState::None),
            Err(e) => Err(sdk_error(resource(bucket), "GetBucketEncryption", e)),
        }
    }

    async fn versioning(&self, bucket: &str) -> Result<VersioningState> {
        let resp = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "GetBucketVersioning", e))?;
        Ok(match resp.status() {
            Some(BucketVersioningStatus::Enabled) => VersioningState::Enabled,
            Some(BucketVersioningStatus::Suspended) => VersioningState::Suspended,
            _ => VersioningState::Unversioned,
        })
    }

    async fn public_access_block(&self, bucket: &str) -> Result<Option<PublicAccessBlock>> {
        match self.client.get_public_access_block().bucket(bucket).send().await {
            Ok(resp) => Ok(resp.public_access_block_configuration().map(|c| PublicAccessBlock {
                block_public_acls: c.block_public_acls().unwrap_or(false),
                ignore_public_acls: c.ignore_public_acls().unwrap_or(false),
                block_public_policy: c.block_public_policy().unwrap_or(false),
                restrict_public_buckets: c.restrict_public_buckets().unwrap_or(false),
            })),
            Err(e) if has_code(&e, NO_PUBLIC_ACCESS_BLOCK) => Ok(None),
            Err(e) => Err(sdk_error(resource(bucket), "GetPublicAccessBlock", e)),
        }
    }

    async fn acls_disabled(&self, bucket: &str) -> Result<bool> {
        match self
            .client
            .get_bucket_ownership_controls()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.ownership_controls().is_some_and(|controls| {
                controls
                    .rules()
                    .iter()
                    .any(|r| r.object_ownership() == &ObjectOwnership::BucketOwnerEnforced)
            })),
            Err(e) if has_code(&e, NO_OWNERSHIP_CONTROLS) => Ok(false),
            Err(e) => Err(sdk_error(resource(bucket), "GetBucketOwnershipControls", e)),
        }
    }

    async fn policy(&self, bucket: &str) -> Result<Option<String>> {
        match self.client.get_bucket_policy().bucket(bucket).send().await {
            Ok(resp) => Ok(resp.policy().map(str::to_string)),
            Err(e) if has_code(&e, NO_POLICY) => Ok(None),
            Err(e) => Err(sdk_error(resource(bucket), "GetBucketPolicy", e)),
        }
    }

    async fn tls_enforced(&self, bucket: &str) -> Result<bool> {
        Ok(self
            .policy(bucket)
            .await?
            .as_deref()
            .is_some_and(has_tls_statement))
    }

    async fn lifecycle(&self, bucket: &str) -> Result<Vec<LifecycleRule>> {
        match self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.rules().iter().map(from_s3_rule).collect()),
            Err(e) if has_code(&e, NO_LIFECYCLE) => Ok(Vec::new()),
            Err(e) => Err(sdk_error(resource(bucket), "GetBucketLifecycleConfiguration", e)),
        }
    }
}

#[async_trait]
impl StorageBackend for S3StorageBackend {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn requires_name(&self) -> bool {
        true
    }

    async fn locate_bucket(&self, ctx: &DeploymentContext) -> Result<Option<String>> {
        let mut tagged = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_buckets()
                .bucket_region(&self.region)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| sdk_error(format!("project {}", ctx.project_name()), "ListBuckets", e))?;

            for name in resp.buckets().iter().filter_map(|b| b.name()) {
                match self.tags(name).await {
                    Ok(tags) if project_tag(&tags) == Some(ctx.project_name()) => {
                        tagged.push(name.to_string())
                    }
                    Ok(_) => {}
                    // Buckets owned by other tooling may refuse tag reads
                    Err(e) => debug!("Skipping bucket {}: {}", name, e),
                }
            }

            match resp.continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        match tagged.len() {
            0 | 1 => Ok(tagged.pop()),
            n => Err(Error::policy_conflict(
                format!("project {}", ctx.project_name()),
                format!(
                    "{} buckets are tagged for this deployment: {}",
                    n,
                    tagged.join(", ")
                ),
            )),
        }
    }

    async fn describe_bucket(&self, bucket: &str) -> Result<Option<BucketState>> {
        debug!("s3 HeadBucket {}", bucket);
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {}
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                return Ok(None)
            }
            Err(e) => return Err(sdk_error(resource(bucket), "HeadBucket", e)),
        }

        let tags = self.tags(bucket).await?;
        Ok(Some(BucketState {
            name: bucket.to_string(),
            encryption: self.encryption(bucket).await?,
            versioning: self.versioning(bucket).await?,
            public_access_block: self.public_access_block(bucket).await?,
            acls_disabled: self.acls_disabled(bucket).await?,
            tls_enforced: self.tls_enforced(bucket).await?,
            lifecycle_rules: self.lifecycle(bucket).await?,
            project_tag: project_tag(&tags).map(str::to_string),
        }))
    }

    async fn create_bucket(&self, name: Option<String>, _ctx: &DeploymentContext) -> Result<String> {
        let name = name.ok_or_else(|| {
            Error::provisioning("bucket", "S3 requires a bucket name at creation")
        })?;

        debug!("s3 CreateBucket {} in {}", name, self.region);
        let mut request = self
            .client
            .create_bucket()
            .bucket(&name)
            .object_ownership(ObjectOwnership::BucketOwnerEnforced);
        // us-east-1 rejects an explicit location constraint
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| sdk_error(resource(&name), "CreateBucket", e))?;

        Ok(name)
    }

    async fn put_tags(&self, bucket: &str, tags: &[(String, String)]) -> Result<()> {
        // PutBucketTagging replaces the whole set
        let merged = naming::merge_tags(&self.tags(bucket).await?, tags);
        let tag_set = merged
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| build_error(resource(bucket), e))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| build_error(resource(bucket), e))?;

        debug!("s3 PutBucketTagging {}", bucket);
        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutBucketTagging", e))?;
        Ok(())
    }

    async fn put_encryption(&self, bucket: &str, binding: &EncryptionBinding) -> Result<()> {
        let default = ServerSideEncryptionByDefault::builder()
            .sse_algorithm(ServerSideEncryption::AwsKms)
            .kms_master_key_id(&binding.key_arn)
            .build()
            .map_err(|e| build_error(resource(bucket), e))?;
        let configuration = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(default)
                    .bucket_key_enabled(binding.bucket_key_enabled)
                    .build(),
            )
            .build()
            .map_err(|e| build_error(resource(bucket), e))?;

        debug!("s3 PutBucketEncryption {} -> {}", bucket, binding.key_arn);
        self.client
            .put_bucket_encryption()
            .bucket(bucket)
            .server_side_encryption_configuration(configuration)
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutBucketEncryption", e))?;
        Ok(())
    }

    async fn put_versioning(&self, bucket: &str) -> Result<()> {
        debug!("s3 PutBucketVersioning {}", bucket);
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutBucketVersioning", e))?;
        Ok(())
    }

    async fn put_public_access_block(&self, bucket: &str, block: &PublicAccessBlock) -> Result<()> {
        debug!("s3 PutPublicAccessBlock {}", bucket);
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(block.block_public_acls)
                    .ignore_public_acls(block.ignore_public_acls)
                    .block_public_policy(block.block_public_policy)
                    .restrict_public_buckets(block.restrict_public_buckets)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutPublicAccessBlock", e))?;

        let controls = OwnershipControls::builder()
            .rules(
                OwnershipControlsRule::builder()
                    .object_ownership(ObjectOwnership::BucketOwnerEnforced)
                    .build()
                    .map_err(|e| build_error(resource(bucket), e))?,
            )
            .build()
            .map_err(|e| build_error(resource(bucket), e))?;

        debug!("s3 PutBucketOwnershipControls {}", bucket);
        self.client
            .put_bucket_ownership_controls()
            .bucket(bucket)
            .ownership_controls(controls)
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutBucketOwnershipControls", e))?;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, document: &serde_json::Value) -> Result<()> {
        // PutBucketPolicy replaces the whole document
        let existing = self.policy(bucket).await?;
        let merged = merged_policy(existing.as_deref(), document).map_err(|e| {
            Error::policy_conflict(
                resource(bucket),
                format!("existing bucket policy could not be parsed: {}", e),
            )
        })?;

        debug!("s3 PutBucketPolicy {}", bucket);
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(merged.to_string())
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutBucketPolicy", e))?;
        Ok(())
    }

    async fn put_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> Result<()> {
        let rules = rules
            .iter()
            .map(to_s3_rule)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| build_error(resource(bucket), e))?;
        let configuration = BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(|e| build_error(resource(bucket), e))?;

        debug!("s3 PutBucketLifecycleConfiguration {}", bucket);
        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(configuration)
            .send()
            .await
            .map_err(|e| sdk_error(resource(bucket), "PutBucketLifecycleConfiguration", e))?;
        Ok(())
    }
}

fn project_tag(tags: &[(String, String)]) -> Option<&str> {
    tags.iter()
        .find(|(key, _)| key == PROJECT_TAG_KEY)
        .map(|(_, value)| value.as_str())
}

/// The stored policy with `required`'s statements merged in
fn merged_policy(
    existing: Option<&str>,
    required: &serde_json::Value,
) -> std::result::Result<serde_json::Value, serde_json::Error> {
    let existing = existing
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?;
    Ok(merge_policy_document(existing.as_ref(), required))
}

fn encryption_state(configuration: &ServerSideEncryptionConfiguration) -> EncryptionState {
    let default = configuration.rules().iter().find_map(|rule| {
        rule.apply_server_side_encryption_by_default()
            .map(|d| (d, rule.bucket_key_enabled().unwrap_or(false)))
    });

    match default {
        None => EncryptionState::None,
        Some((d, bucket_key_enabled)) => match d.sse_algorithm() {
            ServerSideEncryption::AwsKms | ServerSideEncryption::AwsKmsDsse => EncryptionState::Kms {
                // No key id means the AWS-managed aws/s3 key
                key_reference: d.kms_master_key_id().unwrap_or("alias/aws/s3").to_string(),
                bucket_key_enabled,
            },
            _ => EncryptionState::S3Managed,
        },
    }
}

fn has_tls_statement(policy: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(policy)
        .ok()
        .as_ref()
        .and_then(|doc| doc.get("Statement"))
        .and_then(|statements| statements.as_array())
        .is_some_and(|statements| {
            statements
                .iter()
                .any(|s| s.get("Sid").and_then(|sid| sid.as_str()) == Some(TLS_ONLY_STATEMENT_SID))
        })
}

fn storage_class_to_s3(class: StorageClass) -> TransitionStorageClass {
    match class {
        StorageClass::InfrequentAccess => TransitionStorageClass::StandardIa,
        StorageClass::IntelligentTiering => TransitionStorageClass::IntelligentTiering,
        StorageClass::OneZoneInfrequentAccess => TransitionStorageClass::OnezoneIa,
        StorageClass::GlacierInstantRetrieval => TransitionStorageClass::GlacierIr,
        StorageClass::Glacier => TransitionStorageClass::Glacier,
        StorageClass::DeepArchive => TransitionStorageClass::DeepArchive,
    }
}

fn storage_class_from_s3(class: &TransitionStorageClass) -> Option<StorageClass> {
    match class {
        TransitionStorageClass::StandardIa => Some(StorageClass::InfrequentAccess),
        TransitionStorageClass::IntelligentTiering => Some(StorageClass::IntelligentTiering),
        TransitionStorageClass::OnezoneIa => Some(StorageClass::OneZoneInfrequentAccess),
        TransitionStorageClass::GlacierIr => Some(StorageClass::GlacierInstantRetrieval),
        TransitionStorageClass::Glacier => Some(StorageClass::Glacier),
        TransitionStorageClass::DeepArchive => Some(StorageClass::DeepArchive),
        _ => None,
    }
}

fn days(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Whole-bucket rule (empty prefix filter), always enabled
fn to_s3_rule(rule: &LifecycleRule) -> std::result::Result<S3LifecycleRule, aws_sdk_s3::error::BuildError> {
    let mut builder = S3LifecycleRule::builder()
        .id(&rule.id)
        .status(ExpirationStatus::Enabled)
        .filter(LifecycleRuleFilter::builder().prefix("").build());

    for t in &rule.transitions {
        builder = builder.transitions(
            S3Transition::builder()
                .days(days(t.after_days))
                .storage_class(storage_class_to_s3(t.storage_class))
                .build(),
        );
    }
    for t in &rule.noncurrent_transitions {
        builder = builder.noncurrent_version_transitions(
            NoncurrentVersionTransition::builder()
                .noncurrent_days(days(t.after_days))
                .storage_class(storage_class_to_s3(t.storage_class))
                .build(),
        );
    }
    if let Some(after) = rule.abort_incomplete_multipart_after_days {
        builder = builder.abort_incomplete_multipart_upload(
            AbortIncompleteMultipartUpload::builder()
                .days_after_initiation(days(after))
                .build(),
        );
    }

    builder.build()
}

/// Rules with unknown storage classes come back without those transitions,
/// which shows up as lifecycle drift.
fn from_s3_rule(rule: &S3LifecycleRule) -> LifecycleRule {
    let to_transition = |class: Option<&TransitionStorageClass>, age: Option<i32>| {
        let class = class.and_then(storage_class_from_s3)?;
        let age = u32::try_from(age?).ok()?;
        Some(Transition::new(class, age))
    };

    LifecycleRule {
        id: rule.id().unwrap_or_default().to_string(),
        transitions: rule
            .transitions()
            .iter()
            .filter_map(|t| to_transition(t.storage_class(), t.days()))
            .collect(),
        noncurrent_transitions: rule
            .noncurrent_version_transitions()
            .iter()
            .filter_map(|t| to_transition(t.storage_class(), t.noncurrent_days()))
            .collect(),
        abort_incomplete_multipart_after_days: rule
            .abort_incomplete_multipart_upload()
            .and_then(|a| a.days_after_initiation())
            .and_then(|d| u32::try_from(d).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_rules_survive_s3_shape() {
        for rule in LifecycleRule::defaults() {
            let s3_rule = to_s3_rule(&rule).unwrap();
            assert_eq!(s3_rule.status(), &ExpirationStatus::Enabled);
            assert_eq!(from_s3_rule(&s3_rule), rule);
        }
    }

    #[test]
    fn test_default_rule_s3_shape() {
        let rule = &LifecycleRule::defaults()[0];
        let s3_rule = to_s3_rule(rule).unwrap();

        let classes: Vec<_> = s3_rule
            .transitions()
            .iter()
            .map(|t| (t.days(), t.storage_class().cloned()))
            .collect();
        assert_eq!(
            classes,
            vec![
                (Some(30), Some(TransitionStorageClass::IntelligentTiering)),
                (Some(180), Some(TransitionStorageClass::Glacier)),
            ]
        );
        assert_eq!(
            s3_rule
                .abort_incomplete_multipart_upload()
                .and_then(|a| a.days_after_initiation()),
            Some(10)
        );
    }

    #[test]
    fn test_unknown_storage_class_becomes_drift() {
        let s3_rule = S3LifecycleRule::builder()
            .id("backup-tiering")
            .status(ExpirationStatus::Enabled)
            .transitions(
                S3Transition::builder()
                    .days(30)
                    .storage_class(TransitionStorageClass::from("SOMETHING_NEW"))
                    .build(),
            )
            .build()
            .unwrap();

        assert!(from_s3_rule(&s3_rule).transitions.is_empty());
    }

    #[test]
    fn test_encryption_state() {
        let kms = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(
                        ServerSideEncryptionByDefault::builder()
                            .sse_algorithm(ServerSideEncryption::AwsKms)
                            .kms_master_key_id("arn:aws:kms:us-east-1:111122223333:key/k")
                            .build()
                            .unwrap(),
                    )
                    .bucket_key_enabled(true)
                    .build(),
            )
            .build()
            .unwrap();
        assert_eq!(
            encryption_state(&kms),
            EncryptionState::Kms {
                key_reference: "arn:aws:kms:us-east-1:111122223333:key/k".to_string(),
                bucket_key_enabled: true,
            }
        );

        let without_bucket_key = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(
                        ServerSideEncryptionByDefault::builder()
                            .sse_algorithm(ServerSideEncryption::AwsKms)
                            .build()
                            .unwrap(),
                    )
                    .build(),
            )
            .build()
            .unwrap();
        assert_eq!(
            encryption_state(&without_bucket_key),
            EncryptionState::Kms {
                key_reference: "alias/aws/s3".to_string(),
                bucket_key_enabled: false,
            }
        );

        let s3_managed = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(
                        ServerSideEncryptionByDefault::builder()
                            .sse_algorithm(ServerSideEncryption::Aes256)
                            .build()
                            .unwrap(),
                    )
                    .build(),
            )
            .build()
            .unwrap();
        assert_eq!(encryption_state(&s3_managed), EncryptionState::S3Managed);
    }

    #[test]
    fn test_tls_statement_detection() {
        let document = laptop_backup_core::types::TransportRequirement::TlsOnly
            .policy_document("acme-bucket")
            .to_string();
        assert!(has_tls_statement(&document));
        assert!(!has_tls_statement(r#"{"Statement":[{"Sid":"Other"}]}"#));
        assert!(!has_tls_statement("not json"));
    }

    #[test]
    fn test_policy_merge_keeps_existing_statements() {
        let required = laptop_backup_core::types::TransportRequirement::TlsOnly
            .policy_document("acme-bucket");
        let existing = r#"{
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "AllowReplication",
                "Effect": "Allow",
                "Principal": {"AWS": "arn:aws:iam::111122223333:role/replication"},
                "Action": "s3:ReplicateObject",
                "Resource": "arn:aws:s3:::acme-bucket/*"
            }]
        }"#;

        let merged = merged_policy(Some(existing), &required).unwrap();
        let sids: Vec<&str> = merged["Statement"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["Sid"].as_str())
            .collect();
        assert_eq!(sids, vec!["AllowReplication", TLS_ONLY_STATEMENT_SID]);
        assert!(has_tls_statement(&merged.to_string()));

        // Re-applying replaces our statement rather than duplicating it
        let again = merged_policy(Some(&merged.to_string()), &required).unwrap();
        assert_eq!(again, merged);

        assert_eq!(merged_policy(None, &required).unwrap(), required);
        assert!(merged_policy(Some("not json"), &required).is_err());
    }

    #[test]
    fn test_project_tag() {
        let tags = vec![
            ("team".to_string(), "it".to_string()),
            (PROJECT_TAG_KEY.to_string(), "acme".to_string()),
        ];
        assert_eq!(project_tag(&tags), Some("acme"));
        assert_eq!(project_tag(&[]), None);
    }
}
