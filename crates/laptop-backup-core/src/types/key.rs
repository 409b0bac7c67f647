//! Encryption key types

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default delay between a key deletion request and the actual deletion
pub const DEFAULT_PENDING_WINDOW_DAYS: u32 = 7;

/// Smallest pending window accepted by the key service
pub const MIN_PENDING_WINDOW_DAYS: u32 = 7;

/// Largest pending window accepted by the key service
pub const MAX_PENDING_WINDOW_DAYS: u32 = 30;

/// What happens to a resource when its deployment is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalBehavior {
    /// Delete the resource (possibly after a grace period)
    Destroy,
    /// Leave the resource and its data in place
    Retain,
}

impl std::fmt::Display for RemovalBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalBehavior::Destroy => write!(f, "destroy"),
            RemovalBehavior::Retain => write!(f, "retain"),
        }
    }
}

/// How key destruction is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum DestructionPolicy {
    /// Deletion is delayed by `days`, during which it can be cancelled
    RetainForGracePeriod { days: u32 },
}

impl DestructionPolicy {
    pub fn grace_period_days(&self) -> u32 {
        match self {
            DestructionPolicy::RetainForGracePeriod { days } => *days,
        }
    }
}

/// Desired key settings for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    #[serde(default = "default_pending_window_days")]
    pub pending_window_days: u32,
}

fn default_pending_window_days() -> u32 {
    DEFAULT_PENDING_WINDOW_DAYS
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            pending_window_days: DEFAULT_PENDING_WINDOW_DAYS,
        }
    }
}

impl KeyPolicy {
    pub fn with_pending_window_days(days: u32) -> Result<Self> {
        let policy = Self {
            pending_window_days: days,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the pending window against the bounds the key service accepts
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PENDING_WINDOW_DAYS..=MAX_PENDING_WINDOW_DAYS).contains(&self.pending_window_days)
        {
            return Err(Error::configuration(format!(
                "key pending window must be between {} and {} days, got {}",
                MIN_PENDING_WINDOW_DAYS, MAX_PENDING_WINDOW_DAYS, self.pending_window_days
            )));
        }
        Ok(())
    }

    pub fn destruction_policy(&self) -> DestructionPolicy {
        DestructionPolicy::RetainForGracePeriod {
            days: self.pending_window_days,
        }
    }
}

/// Lifecycle state of a key as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum KeyState {
    Enabled,
    Disabled,
    PendingDeletion { deletion_date: DateTime<Utc> },
}

impl std::fmt::Display for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyState::Enabled => write!(f, "enabled"),
            KeyState::Disabled => write!(f, "disabled"),
            KeyState::PendingDeletion { deletion_date } => {
                write!(f, "pending deletion on {}", deletion_date.format("%Y-%m-%d"))
            }
        }
    }
}

/// Key as described by the crypto-key backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescription {
    pub key_id: String,
    pub arn: String,
    pub state: KeyState,
}

/// Handle to the deployment's single encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHandle {
    pub key_id: String,
    pub arn: String,
    pub alias: String,
    pub state: KeyState,
    pub destruction: DestructionPolicy,
    pub removal: RemovalBehavior,
}

impl KeyHandle {
    pub fn from_description(description: KeyDescription, alias: String, policy: &KeyPolicy) -> Self {
        Self {
            key_id: description.key_id,
            arn: description.arn,
            alias,
            state: description.state,
            destruction: policy.destruction_policy(),
            removal: RemovalBehavior::Destroy,
        }
    }

    pub fn grace_period_days(&self) -> u32 {
        self.destruction.grace_period_days()
    }

    pub fn is_pending_deletion(&self) -> bool {
        matches!(self.state, KeyState::PendingDeletion { .. })
    }
}
