//! Backend trait definitions
//!
//! The components in this crate never talk to a cloud API directly. They
//! drive three narrow backends: a crypto-key service, an object store and a
//! parameter registry. `laptop-backup-aws` implements them on KMS, S3 and SSM;
//! [`crate::memory`] implements them in process.
//!
//! Every method either completes or returns an error. Failures are reported
//! as [`laptop_backup_core::Error::Provisioning`] unless stated otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use laptop_backup_core::types::{
    BucketState, DeploymentContext, EncryptionBinding, KeyDescription, LifecycleRule,
    PublicAccessBlock, RegistryRecord,
};
use laptop_backup_core::Result;

/// Crypto-key service holding the deployment key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyBackend: Send + Sync {
    /// Backend name for logs (e.g., "kms", "memory")
    fn name(&self) -> &'static str;

    /// Look up the key behind `alias`. `None` if the alias does not exist.
    async fn describe_key(&self, alias: &str) -> Result<Option<KeyDescription>>;

    /// Create a key, then point `alias` at it.
    ///
    /// The alias is only created once the key exists, so a failure never
    /// leaves an alias referencing a missing key.
    async fn create_key(&self, alias: &str, tags: &[(String, String)]) -> Result<KeyDescription>;

    /// Cancel a pending deletion. The key may come back disabled.
    async fn cancel_key_deletion(&self, key_id: &str) -> Result<KeyDescription>;

    /// Enable a disabled key
    async fn enable_key(&self, key_id: &str) -> Result<KeyDescription>;

    /// Schedule deletion after `pending_window_days`; returns the deletion date
    async fn schedule_key_deletion(
        &self,
        key_id: &str,
        pending_window_days: u32,
    ) -> Result<DateTime<Utc>>;
}

/// Object store holding the backup bucket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logs (e.g., "s3", "memory")
    fn name(&self) -> &'static str;

    /// Whether `create_bucket` needs a caller-supplied name
    fn requires_name(&self) -> bool;

    /// Find the bucket tagged for this deployment
    async fn locate_bucket(&self, ctx: &DeploymentContext) -> Result<Option<String>>;

    /// Observed configuration of `bucket`. `None` if it does not exist.
    async fn describe_bucket(&self, bucket: &str) -> Result<Option<BucketState>>;

    /// Create an empty bucket and return its physical name.
    ///
    /// `name` is `None` only when [`StorageBackend::requires_name`] is false.
    async fn create_bucket(&self, name: Option<String>, ctx: &DeploymentContext) -> Result<String>;

    /// Add or overwrite the given tags, keeping any others
    async fn put_tags(&self, bucket: &str, tags: &[(String, String)]) -> Result<()>;

    /// Bind default server-side encryption to the deployment key
    async fn put_encryption(&self, bucket: &str, binding: &EncryptionBinding) -> Result<()>;

    /// Enable versioning
    async fn put_versioning(&self, bucket: &str) -> Result<()>;

    /// Apply the public access switches and disable ACLs
    async fn put_public_access_block(&self, bucket: &str, block: &PublicAccessBlock) -> Result<()>;

    /// Merge `document`'s statements into the bucket policy, replacing
    /// statements with the same `Sid` and keeping the rest
    async fn put_bucket_policy(&self, bucket: &str, document: &serde_json::Value) -> Result<()>;

    /// Replace the lifecycle configuration
    async fn put_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> Result<()>;
}

/// Key/value registry where the bucket name is published
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Backend name for logs (e.g., "ssm", "memory")
    fn name(&self) -> &'static str;

    /// Read a parameter. `None` if it does not exist.
    async fn get_parameter(&self, name: &str) -> Result<Option<RegistryRecord>>;

    /// Create or overwrite a parameter
    async fn put_parameter(&self, record: &RegistryRecord) -> Result<()>;

    /// Delete a parameter; returns whether it existed
    async fn delete_parameter(&self, name: &str) -> Result<bool>;
}
