//! Storage Policy Engine: bucket posture and lifecycle
//!
//! The engine owns nothing but the declared [`BucketPolicy`]. On every run it
//! either creates the bucket and applies the whole policy, or inspects the
//! existing bucket, refuses to touch it if its encryption or versioning
//! conflicts with the policy, and re-applies only the settings that drifted.
//!
//! The bucket is always retained on teardown. [`StoragePolicyEngine::retain`]
//! is the only teardown entry point and it never mutates the bucket.

use crate::report::Action;
use crate::traits::StorageBackend;
use laptop_backup_core::naming;
use laptop_backup_core::types::{
    BucketPolicy, BucketState, DeploymentContext, KeyHandle, LifecycleRule, NameStrategy,
    PolicyDrift,
};
use laptop_backup_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StoragePolicyEngine {
    backend: Arc<dyn StorageBackend>,
    name: NameStrategy,
}

/// Result of provisioning the bucket
#[derive(Debug, Clone)]
pub struct BucketOutcome {
    pub policy: BucketPolicy,
    pub action: Action,
    /// Settings that were applied during this run
    pub applied: Vec<PolicyDrift>,
}

/// Read-only view of an existing bucket
#[derive(Debug, Clone)]
pub struct BucketInspection {
    pub state: BucketState,
    /// Settings that differ from the policy; `None` without a key to compare against
    pub drift: Option<Vec<PolicyDrift>>,
    /// Why the bucket cannot be converged, if it cannot
    pub conflict: Option<String>,
}

impl StoragePolicyEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, name: NameStrategy) -> Self {
        Self { backend, name }
    }

    /// Converge the deployment's bucket to the policy derived from `key` and `rules`.
    ///
    /// Rules are validated before the backend is contacted.
    pub async fn provision(
        &self,
        ctx: &DeploymentContext,
        key: &KeyHandle,
        rules: Vec<LifecycleRule>,
    ) -> Result<BucketOutcome> {
        let policy = BucketPolicy::new(self.name.clone(), key, rules)?;

        match self.find_existing(ctx).await? {
            Some(state) => self.converge(ctx, policy, state).await,
            None => self.create(ctx, policy).await,
        }
    }

    /// Observe the bucket and compare it with the policy for `key`.
    pub async fn inspect(
        &self,
        ctx: &DeploymentContext,
        key: Option<&KeyHandle>,
        rules: Vec<LifecycleRule>,
    ) -> Result<Option<BucketInspection>> {
        let Some(state) = self.find_candidate(ctx).await? else {
            return Ok(None);
        };

        let project = ctx.project_name();
        let (drift, conflict) = match key {
            Some(key) => {
                let policy = BucketPolicy::new(self.name.clone(), key, rules)?;
                let conflict = policy
                    .check_compatible(&state, project)
                    .err()
                    .map(|e| e.to_string());
                (Some(policy.drift(&state)), conflict)
            }
            None => (None, state.check_owner(project).err().map(|e| e.to_string())),
        };

        Ok(Some(BucketInspection {
            state,
            drift,
            conflict,
        }))
    }

    /// Locate the bucket for teardown reporting. Never deletes or modifies it.
    pub async fn retain(&self, ctx: &DeploymentContext) -> Result<Option<String>> {
        let existing = match self.find_candidate(ctx).await? {
            Some(state) if state.check_owner(ctx.project_name()).is_err() => {
                debug!("Bucket {} belongs to another project; not ours to retain", state.name);
                None
            }
            other => other.map(|state| state.name),
        };
        match &existing {
            Some(bucket) => warn!(
                "Retaining bucket {} and all of its contents; delete it manually if it is no longer needed",
                bucket
            ),
            None => debug!("No bucket found for {}", ctx.project_name()),
        }
        Ok(existing)
    }

    /// The deployment's bucket, refusing one tagged for another project
    async fn find_existing(&self, ctx: &DeploymentContext) -> Result<Option<BucketState>> {
        let existing = self.find_candidate(ctx).await?;
        if let Some(state) = &existing {
            state.check_owner(ctx.project_name())?;
        }
        Ok(existing)
    }

    async fn find_candidate(&self, ctx: &DeploymentContext) -> Result<Option<BucketState>> {
        if let NameStrategy::Explicit(name) = &self.name {
            return self.backend.describe_bucket(name).await;
        }

        if let Some(name) = self.backend.locate_bucket(ctx).await? {
            debug!("Located bucket {} by deployment tag", name);
            return match self.backend.describe_bucket(&name).await? {
                Some(state) => Ok(Some(state)),
                None => Err(Error::provisioning(
                    format!("bucket {}", name),
                    "bucket is tagged for this deployment but could not be described",
                )),
            };
        }

        // An untagged bucket under the generated name is ours from an interrupted run
        if self.backend.requires_name() {
            let generated = naming::generate_bucket_name(ctx);
            if let Some(state) = self.backend.describe_bucket(&generated).await? {
                debug!("Adopting untagged bucket {} under the generated name", generated);
                return Ok(Some(state));
            }
        }

        Ok(None)
    }

    /// Name to request at creation time. Generated only if the backend needs one.
    fn creation_name(&self, ctx: &DeploymentContext) -> Option<String> {
        match &self.name {
            NameStrategy::Explicit(name) => Some(name.clone()),
            NameStrategy::GenerateIfNeeded if self.backend.requires_name() => {
                Some(naming::generate_bucket_name(ctx))
            }
            NameStrategy::GenerateIfNeeded => None,
        }
    }

    async fn create(&self, ctx: &DeploymentContext, policy: BucketPolicy) -> Result<BucketOutcome> {
        let requested = self.creation_name(ctx);
        info!(
            "Creating bucket {} via {}",
            requested.as_deref().unwrap_or("<backend-assigned>"),
            self.backend.name()
        );
        let name = self.backend.create_bucket(requested, ctx).await?;
        let policy = policy.with_resolved_name(&name);

        let drift = policy.drift(&BucketState::empty(&name));
        self.apply(ctx, &policy, &name, &drift).await?;

        info!("Created bucket {}", name);
        Ok(BucketOutcome {
            policy,
            action: Action::Created,
            applied: drift,
        })
    }

    async fn converge(
        &self,
        ctx: &DeploymentContext,
        policy: BucketPolicy,
        state: BucketState,
    ) -> Result<BucketOutcome> {
        policy.check_compatible(&state, ctx.project_name())?;
        let policy = policy.with_resolved_name(&state.name);

        let drift = policy.drift(&state);
        if drift.is_empty() {
            info!("Bucket {} already matches policy", state.name);
            return Ok(BucketOutcome {
                policy,
                action: Action::Unchanged,
                applied: drift,
            });
        }

        info!(
            "Bucket {} drifted: {}",
            state.name,
            drift
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.apply(ctx, &policy, &state.name, &drift).await?;

        Ok(BucketOutcome {
            policy,
            action: Action::Updated,
            applied: drift,
        })
    }

    /// Apply the drifted settings. Tags go first so an interrupted run can
    /// still locate the bucket, public access blocking right after.
    async fn apply(
        &self,
        ctx: &DeploymentContext,
        policy: &BucketPolicy,
        bucket: &str,
        drift: &[PolicyDrift],
    ) -> Result<()> {
        const ORDER: [PolicyDrift; 6] = [
            PolicyDrift::Tags,
            PolicyDrift::PublicAccess,
            PolicyDrift::Encryption,
            PolicyDrift::Transport,
            PolicyDrift::Versioning,
            PolicyDrift::Lifecycle,
        ];

        for setting in ORDER.iter().filter(|s| drift.contains(s)) {
            debug!("Applying {} to bucket {}", setting, bucket);
            match setting {
                PolicyDrift::Tags => {
                    self.backend
                        .put_tags(bucket, &naming::deployment_tags(ctx))
                        .await?
                }
                PolicyDrift::PublicAccess => {
                    self.backend
                        .put_public_access_block(bucket, &policy.public_access.block_configuration())
                        .await?
                }
                PolicyDrift::Encryption => {
                    self.backend
                        .put_encryption(bucket, &policy.encryption)
                        .await?
                }
                PolicyDrift::Transport => {
                    self.backend
                        .put_bucket_policy(bucket, &policy.transport.policy_document(bucket))
                        .await?
                }
                PolicyDrift::Versioning => self.backend.put_versioning(bucket).await?,
                PolicyDrift::Lifecycle => {
                    self.backend
                        .put_lifecycle(bucket, &policy.lifecycle_rules)
                        .await?
                }
            }
        }
        Ok(())
    }
}
