//! In-process backends
//!
//! These hold their state in memory and behave like the cloud services for
//! the operations the components use: KMS keeps a cancelled key disabled,
//! S3 rejects duplicate bucket names, the registry overwrites on put. Every
//! call is logged and any operation can be made to fail, which is how the
//! partial-failure paths are exercised.

use crate::traits::{KeyBackend, RegistryBackend, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use laptop_backup_core::naming::{self, PROJECT_TAG_KEY};
use laptop_backup_core::types::{
    merge_policy_document, BucketState, DeploymentContext, EncryptionBinding, EncryptionState,
    KeyDescription, KeyState, LifecycleRule, PublicAccessBlock, RegistryRecord, VersioningState, MAX_PENDING_WINDOW_DAYS,
    MIN_PENDING_WINDOW_DAYS, TLS_ONLY_STATEMENT_SID,
};
use laptop_backup_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call log and failure injection shared by the in-memory backends
#[derive(Debug, Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
}

impl Recorder {
    /// Log a call to `operation`; fails if a failure was injected for it
    fn record(&self, operation: &str, resource: &str) -> Result<()> {
        lock(&self.calls).push(format!("{}({})", operation, resource));
        match lock(&self.failures).get(operation) {
            Some(message) => Err(Error::provisioning(resource, message.clone())),
            None => Ok(()),
        }
    }

    fn fail_on(&self, operation: &str, message: &str) {
        lock(&self.failures).insert(operation.to_string(), message.to_string());
    }

    fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn was_called(&self, operation: &str) -> bool {
        let prefix = format!("{}(", operation);
        lock(&self.calls).iter().any(|c| c.starts_with(&prefix))
    }
}

macro_rules! recorder_api {
    () => {
        /// Make every later call to `operation` fail with `message`
        pub fn fail_on(&self, operation: &str, message: &str) {
            self.recorder.fail_on(operation, message);
        }

        /// Remove all injected failures
        pub fn clear_failures(&self) {
            self.recorder.clear_failures();
        }

        /// All calls made so far, as `operation(resource)`
        pub fn calls(&self) -> Vec<String> {
            self.recorder.calls()
        }

        pub fn was_called(&self, operation: &str) -> bool {
            self.recorder.was_called(operation)
        }
    };
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct KeyStore {
    keys: BTreeMap<String, KeyDescription>,
    aliases: HashMap<String, String>,
    next_id: u32,
}

/// In-memory crypto-key service
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyBackend {
    store: Arc<Mutex<KeyStore>>,
    recorder: Recorder,
}

impl InMemoryKeyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    recorder_api!();

    /// Current description of the key behind `alias`
    pub fn key_for_alias(&self, alias: &str) -> Option<KeyDescription> {
        let store = lock(&self.store);
        store
            .aliases
            .get(alias)
            .and_then(|id| store.keys.get(id))
            .cloned()
    }

    pub fn key_count(&self) -> usize {
        lock(&self.store).keys.len()
    }

    fn update_state(&self, key_id: &str, update: impl FnOnce(&mut KeyDescription) -> Result<()>) -> Result<KeyDescription> {
        let mut store = lock(&self.store);
        let key = store
            .keys
            .get_mut(key_id)
            .ok_or_else(|| Error::provisioning(format!("key {}", key_id), "NotFoundException"))?;
        update(key)?;
        Ok(key.clone())
    }
}

#[async_trait]
impl KeyBackend for InMemoryKeyBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn describe_key(&self, alias: &str) -> Result<Option<KeyDescription>> {
        self.recorder.record("describe_key", alias)?;
        Ok(self.key_for_alias(alias))
    }

    async fn create_key(&self, alias: &str, _tags: &[(String, String)]) -> Result<KeyDescription> {
        self.recorder.record("create_key", alias)?;
        let mut store = lock(&self.store);
        if store.aliases.contains_key(alias) {
            return Err(Error::provisioning(
                format!("key alias/{}", alias),
                "AlreadyExistsException",
            ));
        }

        store.next_id += 1;
        let key_id = format!("mem-key-{:04}", store.next_id);
        let description = KeyDescription {
            arn: format!("arn:aws:kms:memory:000000000000:key/{}", key_id),
            key_id: key_id.clone(),
            state: KeyState::Enabled,
        };
        store.keys.insert(key_id.clone(), description.clone());
        store.aliases.insert(alias.to_string(), key_id);
        Ok(description)
    }

    async fn cancel_key_deletion(&self, key_id: &str) -> Result<KeyDescription> {
        self.recorder.record("cancel_key_deletion", key_id)?;
        self.update_state(key_id, |key| match key.state {
            KeyState::PendingDeletion { .. } => {
                key.state = KeyState::Disabled;
                Ok(())
            }
            _ => Err(Error::provisioning(
                format!("key {}", key_id),
                "KMSInvalidStateException: key is not pending deletion",
            )),
        })
    }

    async fn enable_key(&self, key_id: &str) -> Result<KeyDescription> {
        self.recorder.record("enable_key", key_id)?;
        self.update_state(key_id, |key| match key.state {
            KeyState::PendingDeletion { .. } => Err(Error::provisioning(
                format!("key {}", key_id),
                "KMSInvalidStateException: key is pending deletion",
            )),
            _ => {
                key.state = KeyState::Enabled;
                Ok(())
            }
        })
    }

    async fn schedule_key_deletion(
        &self,
        key_id: &str,
        pending_window_days: u32,
    ) -> Result<DateTime<Utc>> {
        self.recorder.record("schedule_key_deletion", key_id)?;
        if !(MIN_PENDING_WINDOW_DAYS..=MAX_PENDING_WINDOW_DAYS).contains(&pending_window_days) {
            return Err(Error::provisioning(
                format!("key {}", key_id),
                format!(
                    "ValidationException: pending window must be {}-{} days",
                    MIN_PENDING_WINDOW_DAYS, MAX_PENDING_WINDOW_DAYS
                ),
            ));
        }

        let deletion_date = Utc::now() + Duration::days(i64::from(pending_window_days));
        self.update_state(key_id, |key| {
            key.state = KeyState::PendingDeletion { deletion_date };
            Ok(())
        })?;
        Ok(deletion_date)
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryBucket {
    state: BucketState,
    tags: Vec<(String, String)>,
    policy: Option<serde_json::Value>,
    objects: BTreeMap<String, Vec<u8>>,
}

impl MemoryBucket {
    fn new(name: &str) -> Self {
        Self {
            state: BucketState::empty(name),
            tags: Vec::new(),
            policy: None,
            objects: BTreeMap::new(),
        }
    }

    fn project_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|(key, _)| key == PROJECT_TAG_KEY)
            .map(|(_, value)| value.as_str())
    }

    fn observed(&self) -> BucketState {
        let tls_enforced = self
            .policy
            .as_ref()
            .and_then(|doc| doc.get("Statement"))
            .and_then(|statements| statements.as_array())
            .map(|statements| {
                statements
                    .iter()
                    .any(|s| s.get("Sid").and_then(|sid| sid.as_str()) == Some(TLS_ONLY_STATEMENT_SID))
            })
            .unwrap_or(false);

        BucketState {
            project_tag: self.project_tag().map(str::to_string),
            tls_enforced,
            ..self.state.clone()
        }
    }
}

/// In-memory object store
#[derive(Debug, Clone)]
pub struct InMemoryStorageBackend {
    buckets: Arc<Mutex<BTreeMap<String, MemoryBucket>>>,
    requires_name: bool,
    recorder: Recorder,
}

impl Default for InMemoryStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorageBackend {
    /// A store that, like S3, needs a name for every new bucket
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(Mutex::new(BTreeMap::new())),
            requires_name: true,
            recorder: Recorder::default(),
        }
    }

    /// A store that assigns bucket names itself
    pub fn assigning_names() -> Self {
        Self {
            requires_name: false,
            ..Self::new()
        }
    }

    recorder_api!();

    /// Calls that changed a bucket
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("create_") || c.starts_with("put_") || c.starts_with("delete_"))
            .collect()
    }

    /// Add a bucket that was created outside the engine
    pub fn insert_bucket(&self, name: &str, tags: &[(&str, &str)]) {
        let mut bucket = MemoryBucket::new(name);
        bucket.tags = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        lock(&self.buckets).insert(name.to_string(), bucket);
    }

    pub fn bucket_names(&self) -> Vec<String> {
        lock(&self.buckets).keys().cloned().collect()
    }

    /// Observed state of `bucket`, as `describe_bucket` would report it
    pub fn bucket_state(&self, bucket: &str) -> Option<BucketState> {
        lock(&self.buckets).get(bucket).map(MemoryBucket::observed)
    }

    pub fn set_encryption_state(&self, bucket: &str, encryption: EncryptionState) {
        if let Some(b) = lock(&self.buckets).get_mut(bucket) {
            b.state.encryption = encryption;
        }
    }

    pub fn set_versioning_state(&self, bucket: &str, versioning: VersioningState) {
        if let Some(b) = lock(&self.buckets).get_mut(bucket) {
            b.state.versioning = versioning;
        }
    }

    /// Drop the bucket policy, as an operator editing it by hand would
    pub fn remove_bucket_policy(&self, bucket: &str) {
        if let Some(b) = lock(&self.buckets).get_mut(bucket) {
            b.policy = None;
        }
    }

    /// Store an object, as a backup client would
    pub fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let mut buckets = lock(&self.buckets);
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::provisioning(format!("bucket {}", bucket), "NoSuchBucket"))?;
        b.objects.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        lock(&self.buckets)
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }

    fn with_bucket(&self, bucket: &str, update: impl FnOnce(&mut MemoryBucket)) -> Result<()> {
        let mut buckets = lock(&self.buckets);
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::provisioning(format!("bucket {}", bucket), "NoSuchBucket"))?;
        update(b);
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorageBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn requires_name(&self) -> bool {
        self.requires_name
    }

    async fn locate_bucket(&self, ctx: &DeploymentContext) -> Result<Option<String>> {
        self.recorder.record("locate_bucket", ctx.project_name())?;
        let buckets = lock(&self.buckets);
        let tagged: Vec<&String> = buckets
            .iter()
            .filter(|(_, b)| b.project_tag() == Some(ctx.project_name()))
            .map(|(name, _)| name)
            .collect();

        match tagged.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some((*only).clone())),
            many => Err(Error::policy_conflict(
                format!("project {}", ctx.project_name()),
                format!(
                    "{} buckets are tagged for this deployment: {}",
                    many.len(),
                    many.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
                ),
            )),
        }
    }

    async fn describe_bucket(&self, bucket: &str) -> Result<Option<BucketState>> {
        self.recorder.record("describe_bucket", bucket)?;
        Ok(self.bucket_state(bucket))
    }

    async fn create_bucket(&self, name: Option<String>, ctx: &DeploymentContext) -> Result<String> {
        let mut buckets = lock(&self.buckets);
        let name = match name {
            Some(name) => name,
            None if self.requires_name => {
                return Err(Error::provisioning(
                    "bucket",
                    "InvalidBucketName: a bucket name is required",
                ))
            }
            None => format!("{}-bucket-{:04}", ctx.project_name(), buckets.len() + 1),
        };
        self.recorder.record("create_bucket", &name)?;

        if buckets.contains_key(&name) {
            return Err(Error::provisioning(
                format!("bucket {}", name),
                "BucketAlreadyExists",
            ));
        }
        buckets.insert(name.clone(), MemoryBucket::new(&name));
        Ok(name)
    }

    async fn put_tags(&self, bucket: &str, tags: &[(String, String)]) -> Result<()> {
        self.recorder.record("put_tags", bucket)?;
        self.with_bucket(bucket, |b| b.tags = naming::merge_tags(&b.tags, tags))
    }

    async fn put_encryption(&self, bucket: &str, binding: &EncryptionBinding) -> Result<()> {
        self.recorder.record("put_encryption", bucket)?;
        self.with_bucket(bucket, |b| {
            b.state.encryption = EncryptionState::Kms {
                key_reference: binding.key_arn.clone(),
                bucket_key_enabled: binding.bucket_key_enabled,
            }
        })
    }

    async fn put_versioning(&self, bucket: &str) -> Result<()> {
        self.recorder.record("put_versioning", bucket)?;
        self.with_bucket(bucket, |b| b.state.versioning = VersioningState::Enabled)
    }

    async fn put_public_access_block(&self, bucket: &str, block: &PublicAccessBlock) -> Result<()> {
        self.recorder.record("put_public_access_block", bucket)?;
        self.with_bucket(bucket, |b| {
            b.state.public_access_block = Some(*block);
            b.state.acls_disabled = true;
        })
    }

    async fn put_bucket_policy(&self, bucket: &str, document: &serde_json::Value) -> Result<()> {
        self.recorder.record("put_bucket_policy", bucket)?;
        self.with_bucket(bucket, |b| {
            b.policy = Some(merge_policy_document(b.policy.as_ref(), document))
        })
    }

    async fn put_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> Result<()> {
        self.recorder.record("put_lifecycle", bucket)?;
        self.with_bucket(bucket, |b| b.state.lifecycle_rules = rules.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// In-memory parameter registry
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryBackend {
    parameters: Arc<Mutex<BTreeMap<String, RegistryRecord>>>,
    recorder: Recorder,
}

impl InMemoryRegistryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    recorder_api!();

    pub fn value(&self, name: &str) -> Option<String> {
        lock(&self.parameters).get(name).map(|r| r.value.clone())
    }

    /// Overwrite a value outside the publisher
    pub fn set_value(&self, name: &str, value: &str) {
        lock(&self.parameters).insert(name.to_string(), RegistryRecord::new(name, value));
    }
}

#[async_trait]
impl RegistryBackend for InMemoryRegistryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_parameter(&self, name: &str) -> Result<Option<RegistryRecord>> {
        self.recorder.record("get_parameter", name)?;
        Ok(lock(&self.parameters).get(name).cloned())
    }

    async fn put_parameter(&self, record: &RegistryRecord) -> Result<()> {
        self.recorder.record("put_parameter", &record.name)?;
        lock(&self.parameters).insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete_parameter(&self, name: &str) -> Result<bool> {
        self.recorder.record("delete_parameter", name)?;
        Ok(lock(&self.parameters).remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laptop_backup_core::types::ProjectIdentifier;

    fn ctx(project: &str) -> DeploymentContext {
        DeploymentContext::new(ProjectIdentifier::new(project).unwrap(), "us-east-1")
    }

    #[tokio::test]
    async fn test_cancelled_key_comes_back_disabled() {
        let backend = InMemoryKeyBackend::new();
        let key = backend.create_key("acme-backup-key", &[]).await.unwrap();
        backend.schedule_key_deletion(&key.key_id, 7).await.unwrap();

        let cancelled = backend.cancel_key_deletion(&key.key_id).await.unwrap();
        assert_eq!(cancelled.state, KeyState::Disabled);
    }

    #[tokio::test]
    async fn test_schedule_rejects_out_of_range_window() {
        let backend = InMemoryKeyBackend::new();
        let key = backend.create_key("acme-backup-key", &[]).await.unwrap();
        assert!(backend.schedule_key_deletion(&key.key_id, 3).await.is_err());
        assert!(backend.schedule_key_deletion(&key.key_id, 31).await.is_err());
    }

    #[tokio::test]
    async fn test_locate_bucket_by_tag() {
        let backend = InMemoryStorageBackend::new();
        backend.insert_bucket("acme-bkt", &[(PROJECT_TAG_KEY, "acme")]);
        backend.insert_bucket("other-bkt", &[(PROJECT_TAG_KEY, "other")]);

        let found = backend.locate_bucket(&ctx("acme")).await.unwrap();
        assert_eq!(found.as_deref(), Some("acme-bkt"));
        assert!(backend.locate_bucket(&ctx("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tags_and_policy_are_merged() {
        let backend = InMemoryStorageBackend::new();
        backend.insert_bucket("acme-bkt", &[("cost-center", "it")]);
        lock(&backend.buckets).get_mut("acme-bkt").unwrap().policy = Some(serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{ "Sid": "AllowAgent", "Effect": "Allow" }]
        }));

        backend
            .put_tags("acme-bkt", &naming::deployment_tags(&ctx("acme")))
            .await
            .unwrap();
        let tls = laptop_backup_core::types::TransportRequirement::TlsOnly.policy_document("acme-bkt");
        backend.put_bucket_policy("acme-bkt", &tls).await.unwrap();

        let state = backend.bucket_state("acme-bkt").unwrap();
        assert_eq!(state.project_tag.as_deref(), Some("acme"));
        assert!(state.tls_enforced);

        let buckets = lock(&backend.buckets);
        let bucket = &buckets["acme-bkt"];
        assert!(bucket.tags.contains(&("cost-center".to_string(), "it".to_string())));
        let policy = bucket.policy.as_ref().unwrap();
        assert_eq!(policy["Statement"][0]["Sid"], "AllowAgent");
        assert_eq!(policy["Statement"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_two_tagged_buckets_conflict() {
        let backend = InMemoryStorageBackend::new();
        backend.insert_bucket("acme-1", &[(PROJECT_TAG_KEY, "acme")]);
        backend.insert_bucket("acme-2", &[(PROJECT_TAG_KEY, "acme")]);

        let err = backend.locate_bucket(&ctx("acme")).await.unwrap_err();
        assert!(err.is_policy_conflict());
    }

    #[tokio::test]
    async fn test_duplicate_bucket_name_rejected() {
        let backend = InMemoryStorageBackend::new();
        backend
            .create_bucket(Some("taken".to_string()), &ctx("acme"))
            .await
            .unwrap();
        let err = backend
            .create_bucket(Some("taken".to_string()), &ctx("acme"))
            .await
            .unwrap_err();
        assert!(err.is_provisioning());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = InMemoryRegistryBackend::new();
        backend.fail_on("put_parameter", "AccessDeniedException");

        let err = backend
            .put_parameter(&RegistryRecord::new("/acme/backupBucketName", "b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AccessDeniedException"));
        assert!(backend.was_called("put_parameter"));
        assert!(backend.value("/acme/backupBucketName").is_none());
    }
}
