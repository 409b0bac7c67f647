//! Provisioning for laptop-backup
//!
//! This crate drives a deployment's three resources to their declared state:
//! - **Key Manager**: the deployment's encryption key, with a deletion grace period
//! - **Storage Policy Engine**: bucket posture and lifecycle rules, retained on teardown
//! - **Registry Publisher**: the well-known record pointing at the bucket
//! - **Reconciler**: runs the three in order, idempotently
//!
//! Backends are abstracted behind the traits in [`traits`]; [`memory`] holds
//! in-process implementations.

// Core modules
pub mod key_manager;
pub mod memory;
pub mod reconciler;
pub mod registry;
pub mod report;
pub mod storage;
pub mod traits;

// Re-export commonly used items
pub use key_manager::KeyManager;
pub use memory::{InMemoryKeyBackend, InMemoryRegistryBackend, InMemoryStorageBackend};
pub use reconciler::{DeploymentPlan, DeploymentStatus, ReconcileSettings, Reconciler};
pub use registry::RegistryPublisher;
pub use report::{
    Action, ReconcileFailure, ReconcileReport, ReconcileState, ReconcileStep, ResourceChange,
    ResourceKind, TeardownReport,
};
pub use storage::{BucketInspection, BucketOutcome, StoragePolicyEngine};
pub use traits::{KeyBackend, RegistryBackend, StorageBackend};
