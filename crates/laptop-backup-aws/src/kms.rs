//! KMS key backend
//!
//! One symmetric key per deployment, reachable through `alias/<project>-backup-key`.

use crate::errors::{build_error, sdk_error, to_chrono};
use async_trait::async_trait;
use aws_sdk_kms::types::{KeyMetadata, KeySpec, KeyUsageType, Tag};
use aws_sdk_kms::Client;
use chrono::{DateTime, Duration, Utc};
use laptop_backup_core::types::{KeyDescription, KeyState, MIN_PENDING_WINDOW_DAYS};
use laptop_backup_core::{Error, Result};
use laptop_backup_provision::KeyBackend;
use tracing::{debug, warn};

pub struct KmsKeyBackend {
    client: Client,
}

impl KmsKeyBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn describe_by_id(&self, key_id: &str) -> Result<KeyDescription> {
        let resp = self
            .client
            .describe_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("key {}", key_id), "DescribeKey", e))?;
        resp.key_metadata()
            .map(describe_metadata)
            .ok_or_else(|| missing_metadata(key_id))
    }
}

fn alias_name(alias: &str) -> String {
    format!("alias/{}", alias)
}

/// Name the key left behind when its alias could not be created
fn orphaned_key_error(err: Error, key_id: &str, deletion_scheduled: bool) -> Error {
    let note = if deletion_scheduled {
        format!("key {} was created without an alias and has been scheduled for deletion", key_id)
    } else {
        format!(
            "key {} was created without an alias and must be scheduled for deletion manually",
            key_id
        )
    };
    match err {
        Error::Provisioning { resource, message } => {
            Error::provisioning(resource, format!("{}; {}", message, note))
        }
        other => other,
    }
}

fn missing_metadata(key: &str) -> Error {
    Error::provisioning(format!("key {}", key), "KMS returned no key metadata")
}

/// Collapse the KMS key states onto the three the key manager acts on
pub(crate) fn describe_metadata(metadata: &KeyMetadata) -> KeyDescription {
    use aws_sdk_kms::types::KeyState as Kms;

    let state = match metadata.key_state() {
        Some(Kms::Enabled) => KeyState::Enabled,
        Some(Kms::PendingDeletion) | Some(Kms::PendingReplicaDeletion) => {
            KeyState::PendingDeletion {
                deletion_date: metadata
                    .deletion_date()
                    .and_then(to_chrono)
                    .unwrap_or_else(Utc::now),
            }
        }
        _ => KeyState::Disabled,
    };

    KeyDescription {
        key_id: metadata.key_id().to_string(),
        arn: metadata.arn().unwrap_or_default().to_string(),
        state,
    }
}

#[async_trait]
impl KeyBackend for KmsKeyBackend {
    fn name(&self) -> &'static str {
        "kms"
    }

    async fn describe_key(&self, alias: &str) -> Result<Option<KeyDescription>> {
        debug!("kms DescribeKey {}", alias_name(alias));
        match self.client.describe_key().key_id(alias_name(alias)).send().await {
            Ok(resp) => Ok(resp.key_metadata().map(describe_metadata)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found_exception()) => {
                Ok(None)
            }
            Err(e) => Err(sdk_error(alias_name(alias), "DescribeKey", e)),
        }
    }

    async fn create_key(&self, alias: &str, tags: &[(String, String)]) -> Result<KeyDescription> {
        let resource = alias_name(alias);
        let tags = tags
            .iter()
            .map(|(key, value)| Tag::builder().tag_key(key).tag_value(value).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| build_error(&resource, e))?;

        debug!("kms CreateKey for {}", resource);
        let resp = self
            .client
            .create_key()
            .description(format!("Backup encryption key ({})", resource))
            .key_usage(KeyUsageType::EncryptDecrypt)
            .key_spec(KeySpec::SymmetricDefault)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| sdk_error(&resource, "CreateKey", e))?;
        let description = resp
            .key_metadata()
            .map(describe_metadata)
            .ok_or_else(|| missing_metadata(&resource))?;

        debug!("kms CreateAlias {} -> {}", resource, description.key_id);
        if let Err(e) = self
            .client
            .create_alias()
            .alias_name(&resource)
            .target_key_id(&description.key_id)
            .send()
            .await
        {
            let err = sdk_error(&resource, "CreateAlias", e);
            // The alias is the only way back to this key; a retry would mint another one
            let cleanup = self
                .schedule_key_deletion(&description.key_id, MIN_PENDING_WINDOW_DAYS)
                .await;
            if let Err(cleanup_err) = &cleanup {
                warn!("Could not schedule deletion of unaliased key {}: {}", description.key_id, cleanup_err);
            }
            return Err(orphaned_key_error(err, &description.key_id, cleanup.is_ok()));
        }

        Ok(description)
    }

    async fn cancel_key_deletion(&self, key_id: &str) -> Result<KeyDescription> {
        debug!("kms CancelKeyDeletion {}", key_id);
        self.client
            .cancel_key_deletion()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("key {}", key_id), "CancelKeyDeletion", e))?;
        self.describe_by_id(key_id).await
    }

    async fn enable_key(&self, key_id: &str) -> Result<KeyDescription> {
        debug!("kms EnableKey {}", key_id);
        self.client
            .enable_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("key {}", key_id), "EnableKey", e))?;
        self.describe_by_id(key_id).await
    }

    async fn schedule_key_deletion(
        &self,
        key_id: &str,
        pending_window_days: u32,
    ) -> Result<DateTime<Utc>> {
        let days = i32::try_from(pending_window_days)
            .map_err(|e| build_error(format!("key {}", key_id), e))?;

        debug!("kms ScheduleKeyDeletion {} ({} days)", key_id, days);
        let resp = self
            .client
            .schedule_key_deletion()
            .key_id(key_id)
            .pending_window_in_days(days)
            .send()
            .await
            .map_err(|e| sdk_error(format!("key {}", key_id), "ScheduleKeyDeletion", e))?;

        Ok(resp
            .deletion_date()
            .and_then(to_chrono)
            .unwrap_or_else(|| Utc::now() + Duration::days(i64::from(days))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_kms::primitives::DateTime as SmithyDateTime;
    use aws_sdk_kms::types::KeyState as Kms;

    fn metadata(state: Kms) -> KeyMetadata {
        KeyMetadata::builder()
            .key_id("1234abcd-12ab-34cd-56ef-1234567890ab")
            .arn("arn:aws:kms:us-east-1:111122223333:key/1234abcd-12ab-34cd-56ef-1234567890ab")
            .key_state(state)
            .deletion_date(SmithyDateTime::from_secs(1_767_225_600))
            .build()
            .unwrap()
    }

    #[test]
    fn test_enabled_key() {
        let description = describe_metadata(&metadata(Kms::Enabled));
        assert_eq!(description.state, KeyState::Enabled);
        assert_eq!(description.key_id, "1234abcd-12ab-34cd-56ef-1234567890ab");
        assert!(description.arn.starts_with("arn:aws:kms:"));
    }

    #[test]
    fn test_pending_deletion_keeps_date() {
        let description = describe_metadata(&metadata(Kms::PendingDeletion));
        match description.state {
            KeyState::PendingDeletion { deletion_date } => {
                assert_eq!(deletion_date.timestamp(), 1_767_225_600)
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_other_states_are_disabled() {
        for state in [Kms::Disabled, Kms::Unavailable, Kms::PendingImport] {
            assert_eq!(describe_metadata(&metadata(state)).state, KeyState::Disabled);
        }
    }

    #[test]
    fn test_orphaned_key_is_named() {
        let err = Error::provisioning("alias/acme-backup-key", "CreateAlias failed: AccessDeniedException");

        let manual = orphaned_key_error(err, "1234abcd", false).to_string();
        assert!(manual.contains("CreateAlias failed"));
        assert!(manual.contains("key 1234abcd was created without an alias"));
        assert!(manual.contains("manually"));

        let err = Error::provisioning("alias/acme-backup-key", "CreateAlias failed: LimitExceededException");
        let scheduled = orphaned_key_error(err, "1234abcd", true);
        assert!(scheduled.is_provisioning());
        assert!(scheduled.to_string().contains("has been scheduled for deletion"));
    }

    #[test]
    fn test_alias_name() {
        assert_eq!(alias_name("acme-backup-key"), "alias/acme-backup-key");
    }
}
