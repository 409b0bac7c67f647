//! Error types for laptop-backup-core

use thiserror::Error;

/// Result type alias using laptop-backup-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, used by callers to decide how to surface a failure.
///
/// None of the categories are retried by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input; surfaced immediately
    Configuration,
    /// The backend rejected an operation (quota, permission, name collision)
    Provisioning,
    /// An existing resource is incompatible with the desired policy
    PolicyConflict,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Provisioning => write!(f, "provisioning"),
            ErrorKind::PolicyConflict => write!(f, "policy conflict"),
        }
    }
}

/// Core error types for laptop-backup
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend rejected an operation
    #[error("Failed to provision {resource}: {message}")]
    Provisioning { resource: String, message: String },

    /// Existing resource cannot be converged without overwriting it
    #[error("Policy conflict on {resource}: {message}")]
    PolicyConflict { resource: String, message: String },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create a provisioning error for the given resource
    pub fn provisioning(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a policy conflict error for the given resource
    pub fn policy_conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PolicyConflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. }
            | Error::ConfigNotFound { .. }
            | Error::YamlParse(_)
            | Error::Io(_) => ErrorKind::Configuration,
            Error::Provisioning { .. } => ErrorKind::Provisioning,
            Error::PolicyConflict { .. } => ErrorKind::PolicyConflict,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_provisioning(&self) -> bool {
        self.kind() == ErrorKind::Provisioning
    }

    pub fn is_policy_conflict(&self) -> bool {
        self.kind() == ErrorKind::PolicyConflict
    }
}
