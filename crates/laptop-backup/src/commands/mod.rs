//! CLI command implementations

pub mod deploy;
pub mod destroy;
pub mod status;

use anyhow::{Context, Result};
use camino::Utf8Path;
use laptop_backup_aws::AwsBackends;
use laptop_backup_core::{BackupConfig, ConfigOverrides, ResolvedConfig};
use laptop_backup_provision::{ReconcileSettings, Reconciler};
use tracing::debug;

/// Load backup.yaml (if any) and apply command-line overrides
pub fn resolve_config(
    config_path: Option<&Utf8Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let config = BackupConfig::load(config_path).context("Failed to load configuration")?;
    if let Some(path) = &config.config_path {
        debug!("Using configuration {}", path);
    }
    config
        .resolve(overrides)
        .context("Failed to resolve deployment settings")
}

/// Reconciler wired to the AWS backends for `config`
pub async fn reconciler(config: &ResolvedConfig) -> Reconciler {
    AwsBackends::load(config)
        .await
        .reconciler(ReconcileSettings::from(config))
}
