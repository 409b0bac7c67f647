//! Key Manager: lifecycle of the deployment's encryption key

use crate::report::Action;
use crate::traits::KeyBackend;
use chrono::{DateTime, Utc};
use laptop_backup_core::naming;
use laptop_backup_core::types::{DeploymentContext, KeyDescription, KeyHandle, KeyPolicy, KeyState};
use laptop_backup_core::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct KeyManager {
    backend: Arc<dyn KeyBackend>,
    policy: KeyPolicy,
}

impl KeyManager {
    pub fn new(backend: Arc<dyn KeyBackend>, policy: KeyPolicy) -> Self {
        Self { backend, policy }
    }

    /// Ensure the deployment key exists and is usable.
    ///
    /// A key that is pending deletion has its deletion cancelled and is
    /// re-enabled, so re-running inside the grace window recovers it.
    pub async fn provision(&self, ctx: &DeploymentContext) -> Result<(KeyHandle, Action)> {
        let alias = naming::key_alias(ctx);
        debug!("Looking up key alias/{} via {}", alias, self.backend.name());

        let (description, action) = match self.backend.describe_key(&alias).await? {
            None => {
                info!("Creating encryption key alias/{}", alias);
                let tags = naming::deployment_tags(ctx);
                (self.backend.create_key(&alias, &tags).await?, Action::Created)
            }
            Some(existing) => self.recover(existing).await?,
        };

        let handle = KeyHandle::from_description(description, alias, &self.policy);
        info!("Key {} is {} ({})", handle.alias, handle.state, action);
        Ok((handle, action))
    }

    async fn recover(&self, existing: KeyDescription) -> Result<(KeyDescription, Action)> {
        match existing.state {
            KeyState::Enabled => Ok((existing, Action::Unchanged)),
            KeyState::PendingDeletion { deletion_date } => {
                warn!(
                    "Key {} was scheduled for deletion on {}; cancelling",
                    existing.key_id, deletion_date
                );
                let cancelled = self.backend.cancel_key_deletion(&existing.key_id).await?;
                let enabled = match cancelled.state {
                    KeyState::Enabled => cancelled,
                    _ => self.backend.enable_key(&cancelled.key_id).await?,
                };
                Ok((enabled, Action::Updated))
            }
            KeyState::Disabled => {
                warn!("Key {} is disabled; enabling", existing.key_id);
                let enabled = self.backend.enable_key(&existing.key_id).await?;
                Ok((enabled, Action::Updated))
            }
        }
    }

    /// Current key for `ctx`, without changing it
    pub async fn describe(&self, ctx: &DeploymentContext) -> Result<Option<KeyHandle>> {
        let alias = naming::key_alias(ctx);
        Ok(self
            .backend
            .describe_key(&alias)
            .await?
            .map(|description| KeyHandle::from_description(description, alias, &self.policy)))
    }

    /// Schedule the key for deletion after the grace period.
    ///
    /// Returns `None` when there is no key. A key already pending deletion
    /// keeps its original deletion date.
    pub async fn schedule_removal(
        &self,
        ctx: &DeploymentContext,
    ) -> Result<Option<(KeyHandle, DateTime<Utc>)>> {
        let alias = naming::key_alias(ctx);
        let Some(description) = self.backend.describe_key(&alias).await? else {
            debug!("No key behind alias/{}, nothing to remove", alias);
            return Ok(None);
        };

        let deletion_date = match description.state {
            KeyState::PendingDeletion { deletion_date } => {
                debug!("Key {} already pending deletion", description.key_id);
                deletion_date
            }
            _ => {
                let days = self.policy.pending_window_days;
                let date = self
                    .backend
                    .schedule_key_deletion(&description.key_id, days)
                    .await?;
                info!(
                    "Scheduled key {} for deletion in {} days ({})",
                    description.key_id, days, date
                );
                date
            }
        };

        let description = KeyDescription {
            state: KeyState::PendingDeletion { deletion_date },
            ..description
        };
        Ok(Some((
            KeyHandle::from_description(description, alias, &self.policy),
            deletion_date,
        )))
    }
}
