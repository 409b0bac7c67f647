//! Common test helpers for laptop-backup-provision integration tests
//!
//! Provides a harness wiring the in-memory backends into a [`Reconciler`]
//! while keeping handles on the backends for inspection.

use laptop_backup_core::types::NameStrategy;
use laptop_backup_provision::{
    InMemoryKeyBackend, InMemoryRegistryBackend, InMemoryStorageBackend, ReconcileSettings,
    Reconciler,
};
use std::sync::Arc;

pub const PROJECT: &str = "acme";
pub const PARAMETER: &str = "/acme/backupBucketName";

/// In-memory backends plus a reconciler driving them
pub struct Harness {
    pub keys: InMemoryKeyBackend,
    pub storage: InMemoryStorageBackend,
    pub registry: InMemoryRegistryBackend,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(InMemoryStorageBackend::new(), ReconcileSettings::default())
    }

    #[allow(dead_code)]
    pub fn with_bucket_name(name: &str) -> Self {
        Self::with(
            InMemoryStorageBackend::new(),
            ReconcileSettings {
                bucket_name: NameStrategy::Explicit(name.to_string()),
                ..ReconcileSettings::default()
            },
        )
    }

    pub fn with(storage: InMemoryStorageBackend, settings: ReconcileSettings) -> Self {
        let keys = InMemoryKeyBackend::new();
        let registry = InMemoryRegistryBackend::new();
        let reconciler = Reconciler::new(
            Arc::new(keys.clone()),
            Arc::new(storage.clone()),
            Arc::new(registry.clone()),
            settings,
        );
        Self {
            keys,
            storage,
            registry,
            reconciler,
        }
    }

    /// Total number of backend calls across all three backends
    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.keys.calls().len() + self.storage.calls().len() + self.registry.calls().len()
    }
}
