//! Configuration file loading and resolution

use crate::config::{BackupConfigFile, EndpointsConfig};
use crate::error::{Error, Result};
use crate::types::{
    DeploymentContext, KeyPolicy, NameStrategy, ProjectIdentifier, DEFAULT_REGION,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing::{debug, warn};

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["backup.yaml", "backup.yml"];

/// Environment variable supplying the project name
pub const PROJECT_ENV: &str = "LAPTOP_BACKUP_PROJECT_NAME";

/// Environment variables consulted for the region, in order
const REGION_ENVS: &[&str] = &["AWS_REGION", "AWS_DEFAULT_REGION"];

/// Values supplied on the command line, taking precedence over everything else
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project: Option<String>,
    pub region: Option<String>,
}

/// Loaded configuration file (or defaults when there is none)
#[derive(Debug, Clone, Default)]
pub struct BackupConfig {
    /// The parsed configuration
    pub config: BackupConfigFile,

    /// Path the configuration was read from, if any
    pub config_path: Option<Utf8PathBuf>,
}

/// Everything a reconciliation run needs, fully resolved
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub context: DeploymentContext,
    pub bucket_name: NameStrategy,
    pub key_policy: KeyPolicy,
    pub endpoints: EndpointsConfig,
}

impl BackupConfig {
    /// Load configuration from the specified path, or search for it.
    ///
    /// An explicit path must exist. Without one, the current directory and
    /// its parents are searched; finding nothing yields the defaults.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_file(p),
            None => {
                let cwd = std::env::current_dir().map_err(Error::Io)?;
                let cwd = Utf8PathBuf::try_from(cwd).map_err(|_| {
                    Error::configuration("Current directory path is not valid UTF-8")
                })?;
                match Self::find_config(&cwd) {
                    Some(found) => Self::load_file(&found),
                    None => {
                        debug!("No backup.yaml found, using defaults");
                        Ok(Self::default())
                    }
                }
            }
        }
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: BackupConfigFile = serde_yaml_ng::from_str(content)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_file(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;
        debug!("Loading configuration from {}", path);

        let mut loaded = Self::from_yaml(&content)?;
        loaded.config_path = Some(path.to_owned());
        Ok(loaded)
    }

    /// Find a configuration file in `start` or its parent directories
    pub fn find_config(start: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start);

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    return Some(path);
                }
            }
            current = dir.parent();
        }

        None
    }

    /// Resolve the deployment context and settings.
    ///
    /// Project name: override, then `LAPTOP_BACKUP_PROJECT_NAME`, then the file.
    /// Region: override, then the file, then `AWS_REGION` / `AWS_DEFAULT_REGION`,
    /// then us-east-1.
    pub fn resolve(&self, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
        let project = overrides
            .project
            .clone()
            .or_else(|| non_empty_env(PROJECT_ENV))
            .or_else(|| self.config.project_name.clone())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "project name is required (use --project, {} or project_name in backup.yaml)",
                    PROJECT_ENV
                ))
            })?;
        let project = ProjectIdentifier::new(project)?;

        let region = overrides
            .region
            .clone()
            .or_else(|| self.config.region.clone())
            .or_else(|| REGION_ENVS.iter().find_map(|name| non_empty_env(name)))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut context = DeploymentContext::new(project, region);
        if let Some(account_id) = &self.config.account_id {
            context = context.with_account_id(account_id.clone());
        }

        self.config.key.validate()?;

        for attempt in self.config.posture.relaxation_attempts() {
            warn!(
                "Ignoring posture override '{}': backup buckets always block public access, \
                 require TLS, keep versioning on and are retained on teardown",
                attempt
            );
        }

        Ok(ResolvedConfig {
            context,
            bucket_name: NameStrategy::from_option(self.config.bucket_name.clone()),
            key_policy: self.config.key,
            endpoints: self.config.endpoints.clone(),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(PROJECT_ENV);
        for name in REGION_ENVS {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_resolve_from_file() {
        clear_env();
        let config = BackupConfig::from_yaml(
            "project_name: acme\nregion: eu-west-1\naccount_id: \"123456789012\"\n",
        )
        .unwrap();
        let resolved = config.resolve(&ConfigOverrides::default()).unwrap();

        assert_eq!(resolved.context.project_name(), "acme");
        assert_eq!(resolved.context.region, "eu-west-1");
        assert_eq!(resolved.context.account_id.as_deref(), Some("123456789012"));
        assert_eq!(resolved.bucket_name, NameStrategy::GenerateIfNeeded);
        assert_eq!(resolved.key_policy.pending_window_days, 7);
    }

    #[test]
    #[serial]
    fn test_resolve_precedence() {
        clear_env();
        std::env::set_var(PROJECT_ENV, "from-env");
        let config = BackupConfig::from_yaml("project_name: from-file").unwrap();

        let resolved = config.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(resolved.context.project_name(), "from-env");

        let overrides = ConfigOverrides {
            project: Some("from-flag".to_string()),
            region: Some("ap-south-1".to_string()),
        };
        let resolved = config.resolve(&overrides).unwrap();
        assert_eq!(resolved.context.project_name(), "from-flag");
        assert_eq!(resolved.context.region, "ap-south-1");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_region_fallbacks() {
        clear_env();
        let config = BackupConfig::from_yaml("project_name: acme").unwrap();
        let resolved = config.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(resolved.context.region, DEFAULT_REGION);

        std::env::set_var("AWS_REGION", "us-west-2");
        let resolved = config.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(resolved.context.region, "us-west-2");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_project_is_configuration_error() {
        clear_env();
        let err = BackupConfig::default()
            .resolve(&ConfigOverrides::default())
            .unwrap_err();
        assert!(err.is_configuration());

        let config = BackupConfig::from_yaml("project_name: \"  \"").unwrap();
        assert!(config
            .resolve(&ConfigOverrides::default())
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    #[serial]
    fn test_invalid_pending_window_rejected() {
        clear_env();
        let config =
            BackupConfig::from_yaml("project_name: acme\nkey:\n  pending_window_days: 3\n").unwrap();
        assert!(config
            .resolve(&ConfigOverrides::default())
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    #[serial]
    fn test_posture_overrides_do_not_fail_resolution() {
        clear_env();
        let config = BackupConfig::from_yaml(
            "project_name: acme\nposture:\n  public_read_access: true\n  enforce_ssl: false\n",
        )
        .unwrap();
        assert!(config.resolve(&ConfigOverrides::default()).is_ok());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().join("custom.yaml")).unwrap();
        fs::write(&path, "project_name: acme\nbucket_name: acme-backups\n").unwrap();

        let config = BackupConfig::load(Some(&path)).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.config.bucket_name.as_deref(), Some("acme-backups"));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = BackupConfig::load(Some(Utf8Path::new("/nonexistent/backup.yaml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("backup.yml"), "project_name: acme\n").unwrap();
        let nested = root.join("a/b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(BackupConfig::find_config(&nested), Some(root.join("backup.yml")));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = BackupConfig::from_yaml("project_name: [unclosed").unwrap_err();
        assert!(err.is_configuration());
    }
}
