//! Project identifier and deployment context

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default AWS region when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Opaque, non-empty identifier that scopes every resource name of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectIdentifier(String);

impl ProjectIdentifier {
    /// Validate and wrap a project name. Surrounding whitespace is trimmed.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::configuration(
                "project name is required and must not be empty",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectIdentifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProjectIdentifier> for String {
    fn from(value: ProjectIdentifier) -> Self {
        value.0
    }
}

impl std::fmt::Display for ProjectIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that scopes a deployment: which project, in which account and region.
///
/// Passed explicitly to every component instead of being read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentContext {
    pub project: ProjectIdentifier,
    pub region: String,
    pub account_id: Option<String>,
}

impl DeploymentContext {
    pub fn new(project: ProjectIdentifier, region: impl Into<String>) -> Self {
        Self {
            project,
            region: region.into(),
            account_id: None,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Convenience accessor for the project name
    pub fn project_name(&self) -> &str {
        self.project.as_str()
    }
}
