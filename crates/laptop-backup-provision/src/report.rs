//! Reconciliation outcomes

use chrono::{DateTime, Utc};
use laptop_backup_core::types::{BucketPolicy, KeyHandle, RegistryRecord};
use laptop_backup_core::Error;
use serde::Serialize;
use thiserror::Error as ThisError;

/// What a component did to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    Unchanged,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Created => write!(f, "created"),
            Action::Updated => write!(f, "updated"),
            Action::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Resources managed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Key,
    Bucket,
    Record,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Key => write!(f, "key"),
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Record => write!(f, "record"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    pub resource: ResourceKind,
    pub identifier: String,
    pub action: Action,
    /// Settings that were (re)applied, if any
    pub details: Vec<String>,
}

impl ResourceChange {
    pub fn new(resource: ResourceKind, identifier: impl Into<String>, action: Action) -> Self {
        Self {
            resource,
            identifier: identifier.into(),
            action,
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Reconciler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileState {
    Pending,
    Converged,
    Failed,
}

/// Step at which a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStep {
    Validate,
    Key,
    Bucket,
    Record,
}

impl std::fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileStep::Validate => write!(f, "validation"),
            ReconcileStep::Key => write!(f, "key provisioning"),
            ReconcileStep::Bucket => write!(f, "bucket provisioning"),
            ReconcileStep::Record => write!(f, "record publishing"),
        }
    }
}

/// Converged state of a deployment
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub project: String,
    pub key: KeyHandle,
    pub bucket: BucketPolicy,
    pub record: RegistryRecord,
    pub changes: Vec<ResourceChange>,
}

impl ReconcileReport {
    /// Physical bucket name
    pub fn bucket_name(&self) -> &str {
        self.bucket.resolved_name.as_deref().unwrap_or_default()
    }

    /// True when the run found everything already converged
    pub fn is_noop(&self) -> bool {
        self.changes.iter().all(|c| c.action == Action::Unchanged)
    }

    pub fn change_for(&self, resource: ResourceKind) -> Option<&ResourceChange> {
        self.changes.iter().find(|c| c.resource == resource)
    }
}

/// A failed run. Whatever was created before the failure is left in place
/// and reported here for manual follow-up.
#[derive(Debug, ThisError)]
#[error("reconciliation failed during {step}: {source}")]
pub struct ReconcileFailure {
    pub step: ReconcileStep,
    #[source]
    pub source: Error,
    pub key: Option<KeyHandle>,
    pub bucket: Option<BucketPolicy>,
}

impl ReconcileFailure {
    pub fn new(step: ReconcileStep, source: Error) -> Self {
        Self {
            step,
            source,
            key: None,
            bucket: None,
        }
    }

    pub fn with_key(mut self, key: KeyHandle) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_bucket(mut self, bucket: BucketPolicy) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn error(&self) -> &Error {
        &self.source
    }
}

/// Outcome of tearing a deployment down
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub project: String,
    /// Key scheduled for deletion, with its deletion date
    pub key: Option<KeyHandle>,
    pub key_deletion_date: Option<DateTime<Utc>>,
    /// Bucket left in place with its contents
    pub retained_bucket: Option<String>,
    pub record_withdrawn: bool,
}
