//! Reconciler: drives key, bucket and record to the desired state
//!
//! One run walks `validate -> key -> bucket -> record` sequentially. Each
//! step is awaited to completion before the next one starts. The first
//! failure stops the run; nothing created earlier is rolled back, it is
//! handed back in the [`ReconcileFailure`] instead.

use crate::key_manager::KeyManager;
use crate::registry::RegistryPublisher;
use crate::report::{
    ReconcileFailure, ReconcileReport, ReconcileState, ReconcileStep, ResourceChange,
    ResourceKind, TeardownReport,
};
use crate::storage::{BucketInspection, StoragePolicyEngine};
use crate::traits::{KeyBackend, RegistryBackend, StorageBackend};
use laptop_backup_core::naming;
use laptop_backup_core::types::{
    validate_parameter_name, validate_rules, DeploymentContext, KeyHandle, KeyPolicy,
    LifecycleRule, NameStrategy, ProjectIdentifier, RegistryRecord, DEFAULT_REGION,
};
use laptop_backup_core::{Error, ResolvedConfig, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Deployment settings that are not part of the project identifier
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub region: String,
    pub account_id: Option<String>,
    pub bucket_name: NameStrategy,
    pub key_policy: KeyPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account_id: None,
            bucket_name: NameStrategy::GenerateIfNeeded,
            key_policy: KeyPolicy::default(),
        }
    }
}

impl From<&ResolvedConfig> for ReconcileSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            region: config.context.region.clone(),
            account_id: config.context.account_id.clone(),
            bucket_name: config.bucket_name.clone(),
            key_policy: config.key_policy,
        }
    }
}

/// What a run would touch, computed without any backend call
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    pub project: String,
    pub region: String,
    pub key_alias: String,
    pub key_grace_period_days: u32,
    /// Explicit name, or the generated one the object store would receive
    pub bucket_name: String,
    pub bucket_name_generated: bool,
    pub parameter_name: String,
    pub lifecycle_rules: Vec<LifecycleRule>,
}

/// Read-only view of a deployment
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    pub project: String,
    pub key: Option<KeyHandle>,
    pub bucket: Option<BucketInspection>,
    pub record: Option<RegistryRecord>,
}

impl DeploymentStatus {
    /// True when all three resources exist, the bucket has no drift and the
    /// record points at it
    pub fn is_converged(&self) -> bool {
        let (Some(key), Some(bucket), Some(record)) = (&self.key, &self.bucket, &self.record) else {
            return false;
        };
        !key.is_pending_deletion()
            && bucket.conflict.is_none()
            && bucket.drift.as_ref().is_some_and(|d| d.is_empty())
            && record.value == bucket.state.name
    }
}

pub struct Reconciler {
    keys: KeyManager,
    storage: StoragePolicyEngine,
    registry: RegistryPublisher,
    settings: ReconcileSettings,
    state: ReconcileState,
}

impl Reconciler {
    pub fn new(
        key_backend: Arc<dyn KeyBackend>,
        storage_backend: Arc<dyn StorageBackend>,
        registry_backend: Arc<dyn RegistryBackend>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            keys: KeyManager::new(key_backend, settings.key_policy),
            storage: StoragePolicyEngine::new(storage_backend, settings.bucket_name.clone()),
            registry: RegistryPublisher::new(registry_backend),
            settings,
            state: ReconcileState::Pending,
        }
    }

    /// State after the most recent run
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    fn context(&self, project: &str) -> Result<DeploymentContext> {
        let project = ProjectIdentifier::new(project)?;
        let mut ctx = DeploymentContext::new(project, self.settings.region.clone());
        if let Some(account_id) = &self.settings.account_id {
            ctx = ctx.with_account_id(account_id.clone());
        }
        Ok(ctx)
    }

    /// Validate inputs and the fixed rule set without contacting any backend
    fn validate(&self, project: &str) -> Result<(DeploymentContext, Vec<LifecycleRule>)> {
        let ctx = self.context(project)?;
        self.settings.key_policy.validate()?;
        if let NameStrategy::Explicit(name) = &self.settings.bucket_name {
            naming::validate_bucket_name(name)?;
        }
        let parameter = naming::bucket_parameter_name(&ctx);
        validate_parameter_name(&parameter).map_err(|e| match e {
            Error::Provisioning { message, .. } => Error::configuration(format!(
                "project '{}' cannot be published as {}: {}",
                ctx.project_name(),
                parameter,
                message
            )),
            other => other,
        })?;
        let rules = LifecycleRule::defaults();
        validate_rules(&rules)?;
        Ok((ctx, rules))
    }

    /// Resources a run for `project` would manage
    pub fn plan(&self, project: &str) -> Result<DeploymentPlan> {
        let (ctx, rules) = self.validate(project)?;
        let (bucket_name, bucket_name_generated) = match &self.settings.bucket_name {
            NameStrategy::Explicit(name) => (name.clone(), false),
            NameStrategy::GenerateIfNeeded => (naming::generate_bucket_name(&ctx), true),
        };

        Ok(DeploymentPlan {
            project: ctx.project_name().to_string(),
            region: ctx.region.clone(),
            key_alias: naming::key_alias(&ctx),
            key_grace_period_days: self.settings.key_policy.pending_window_days,
            bucket_name,
            bucket_name_generated,
            parameter_name: naming::bucket_parameter_name(&ctx),
            lifecycle_rules: rules,
        })
    }

    /// Converge key, bucket and record for `project`.
    pub async fn reconcile(
        &mut self,
        project: &str,
    ) -> std::result::Result<ReconcileReport, ReconcileFailure> {
        self.state = ReconcileState::Pending;
        let result = self.run(project).await;
        self.state = match &result {
            Ok(_) => ReconcileState::Converged,
            Err(failure) => {
                warn!("{}", failure);
                ReconcileState::Failed
            }
        };
        result
    }

    async fn run(&self, project: &str) -> std::result::Result<ReconcileReport, ReconcileFailure> {
        let (ctx, rules) = self
            .validate(project)
            .map_err(|e| ReconcileFailure::new(ReconcileStep::Validate, e))?;
        info!("Reconciling backup storage for {}", ctx.project_name());

        let (key, key_action) = self
            .keys
            .provision(&ctx)
            .await
            .map_err(|e| ReconcileFailure::new(ReconcileStep::Key, e))?;

        let outcome = self
            .storage
            .provision(&ctx, &key, rules)
            .await
            .map_err(|e| ReconcileFailure::new(ReconcileStep::Bucket, e).with_key(key.clone()))?;
        let bucket_name = outcome
            .policy
            .resolved_name
            .clone()
            .unwrap_or_default();

        let (record, record_action) = self
            .registry
            .publish(&naming::bucket_parameter_name(&ctx), &bucket_name)
            .await
            .map_err(|e| {
                ReconcileFailure::new(ReconcileStep::Record, e)
                    .with_key(key.clone())
                    .with_bucket(outcome.policy.clone())
            })?;

        let changes = vec![
            ResourceChange::new(ResourceKind::Key, format!("alias/{}", key.alias), key_action),
            ResourceChange::new(ResourceKind::Bucket, bucket_name.as_str(), outcome.action)
                .with_details(outcome.applied.iter().map(|d| d.to_string()).collect()),
            ResourceChange::new(ResourceKind::Record, record.name.as_str(), record_action),
        ];

        info!("Backup storage for {} converged", ctx.project_name());
        Ok(ReconcileReport {
            project: ctx.project_name().to_string(),
            key,
            bucket: outcome.policy,
            record,
            changes,
        })
    }

    /// Inspect the deployment without changing anything
    pub async fn status(&self, project: &str) -> Result<DeploymentStatus> {
        let ctx = self.context(project)?;
        let key = self.keys.describe(&ctx).await?;
        let bucket = self
            .storage
            .inspect(&ctx, key.as_ref(), LifecycleRule::defaults())
            .await?;
        let record = self
            .registry
            .lookup(&naming::bucket_parameter_name(&ctx))
            .await?;

        Ok(DeploymentStatus {
            project: ctx.project_name().to_string(),
            key,
            bucket,
            record,
        })
    }

    /// Tear the deployment down.
    ///
    /// The record is withdrawn and the key scheduled for deletion after its
    /// grace period. The bucket and every object in it are kept.
    pub async fn teardown(&mut self, project: &str) -> Result<TeardownReport> {
        let ctx = self.context(project)?;
        info!("Tearing down backup storage for {}", ctx.project_name());

        let record_withdrawn = self
            .registry
            .withdraw(&naming::bucket_parameter_name(&ctx))
            .await?;
        let removal = self.keys.schedule_removal(&ctx).await?;
        let retained_bucket = self.storage.retain(&ctx).await?;

        if let (Some(bucket), Some((key, date))) = (&retained_bucket, &removal) {
            warn!(
                "Objects in {} are encrypted with {} which will be deleted on {}; \
                 run deploy for {} before then to cancel the deletion",
                bucket,
                key.arn,
                date.format("%Y-%m-%d"),
                ctx.project_name()
            );
        }

        self.state = ReconcileState::Pending;
        let (key, key_deletion_date) = match removal {
            Some((key, date)) => (Some(key), Some(date)),
            None => (None, None),
        };
        Ok(TeardownReport {
            project: ctx.project_name().to_string(),
            key,
            key_deletion_date,
            retained_bucket,
            record_withdrawn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockKeyBackend, MockRegistryBackend, MockStorageBackend};

    fn untouched() -> Reconciler {
        // Mocks without expectations panic on any call
        Reconciler::new(
            Arc::new(MockKeyBackend::new()),
            Arc::new(MockStorageBackend::new()),
            Arc::new(MockRegistryBackend::new()),
            ReconcileSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_project_fails_before_any_backend_call() {
        let mut reconciler = untouched();

        for project in ["", "   "] {
            let failure = reconciler.reconcile(project).await.unwrap_err();
            assert_eq!(failure.step, ReconcileStep::Validate);
            assert!(failure.error().is_configuration());
            assert!(failure.key.is_none());
            assert_eq!(reconciler.state(), ReconcileState::Failed);
        }
    }

    #[tokio::test]
    async fn test_unpublishable_project_fails_before_any_backend_call() {
        let mut reconciler = untouched();

        for project in ["My Laptop", "aws-team", "ssm"] {
            let failure = reconciler.reconcile(project).await.unwrap_err();
            assert_eq!(failure.step, ReconcileStep::Validate);
            assert!(failure.error().is_configuration());
            assert!(failure.error().to_string().contains("backupBucketName"));
            assert!(failure.key.is_none());
            assert!(reconciler.plan(project).is_err());
        }
    }

    #[tokio::test]
    async fn test_invalid_explicit_bucket_name_fails_validation() {
        let mut reconciler = Reconciler::new(
            Arc::new(MockKeyBackend::new()),
            Arc::new(MockStorageBackend::new()),
            Arc::new(MockRegistryBackend::new()),
            ReconcileSettings {
                bucket_name: NameStrategy::Explicit("Not_A_Bucket".to_string()),
                ..ReconcileSettings::default()
            },
        );

        let failure = reconciler.reconcile("acme").await.unwrap_err();
        assert_eq!(failure.step, ReconcileStep::Validate);
        assert!(failure.error().is_configuration());
    }

    #[tokio::test]
    async fn test_empty_project_teardown_fails_before_any_backend_call() {
        let mut reconciler = untouched();
        let err = reconciler.teardown("").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_plan_uses_generated_name() {
        let reconciler = untouched();
        let plan = reconciler.plan("acme").unwrap();

        assert_eq!(plan.key_alias, "acme-backup-key");
        assert_eq!(plan.parameter_name, "/acme/backupBucketName");
        assert!(plan.bucket_name_generated);
        assert!(plan.bucket_name.starts_with("acme-backupbucket-"));
        assert_eq!(plan.key_grace_period_days, 7);
        assert_eq!(plan.lifecycle_rules, LifecycleRule::defaults());
    }

    #[test]
    fn test_initial_state_is_pending() {
        assert_eq!(untouched().state(), ReconcileState::Pending);
    }
}
