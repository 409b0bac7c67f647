//! AWS backends for laptop-backup
//!
//! - [`KmsKeyBackend`]: the deployment key and its alias
//! - [`S3StorageBackend`]: the backup bucket
//! - [`SsmRegistryBackend`]: the `/<project>/backupBucketName` parameter
//!
//! Credentials come from the standard AWS provider chain.

mod errors;
pub mod kms;
pub mod s3;
pub mod ssm;

pub use kms::KmsKeyBackend;
pub use s3::S3StorageBackend;
pub use ssm::SsmRegistryBackend;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use laptop_backup_core::config::EndpointsConfig;
use laptop_backup_core::ResolvedConfig;
use laptop_backup_provision::{
    KeyBackend, ReconcileSettings, Reconciler, RegistryBackend, StorageBackend,
};
use std::sync::Arc;
use tracing::debug;

/// The three backends of one deployment, sharing one SDK configuration
#[derive(Clone)]
pub struct AwsBackends {
    pub keys: Arc<dyn KeyBackend>,
    pub storage: Arc<dyn StorageBackend>,
    pub registry: Arc<dyn RegistryBackend>,
}

impl AwsBackends {
    /// Build clients for the configured region and endpoints
    pub async fn load(config: &ResolvedConfig) -> Self {
        let region = config.context.region.clone();
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;

        Self::from_sdk_config(&sdk_config, &region, &config.endpoints)
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig, region: &str, endpoints: &EndpointsConfig) -> Self {
        let mut kms_config = aws_sdk_kms::config::Builder::from(sdk_config);
        if let Some(endpoint_url) = &endpoints.kms {
            debug!("Using custom KMS endpoint: {}", endpoint_url);
            kms_config = kms_config.endpoint_url(endpoint_url);
        }

        let mut s3_config = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint_url) = &endpoints.s3 {
            debug!("Using custom S3 endpoint: {}", endpoint_url);
            s3_config = s3_config
                .endpoint_url(endpoint_url)
                .force_path_style(true); // S3-compatible stacks rarely resolve virtual-host buckets
        }

        let mut ssm_config = aws_sdk_ssm::config::Builder::from(sdk_config);
        if let Some(endpoint_url) = &endpoints.ssm {
            debug!("Using custom SSM endpoint: {}", endpoint_url);
            ssm_config = ssm_config.endpoint_url(endpoint_url);
        }

        Self {
            keys: Arc::new(KmsKeyBackend::new(aws_sdk_kms::Client::from_conf(
                kms_config.build(),
            ))),
            storage: Arc::new(S3StorageBackend::new(
                aws_sdk_s3::Client::from_conf(s3_config.build()),
                region,
            )),
            registry: Arc::new(SsmRegistryBackend::new(aws_sdk_ssm::Client::from_conf(
                ssm_config.build(),
            ))),
        }
    }

    pub fn reconciler(&self, settings: ReconcileSettings) -> Reconciler {
        Reconciler::new(
            self.keys.clone(),
            self.storage.clone(),
            self.registry.clone(),
            settings,
        )
    }
}
