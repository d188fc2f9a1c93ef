use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TenantMode {
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "global")]
    Global,
}

impl Default for TenantMode {
    fn default() -> Self {
        Self::Single
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppType {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "engineless")]
    Engineless,
    #[serde(rename = "cloud_native")]
    CloudNative,
}

impl Default for AppType {
    fn default() -> Self {
        Self::Default
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceOrigin {
    #[serde(rename = "vcs")]
    Vcs,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "smart_pkg")]
    SmartPkg,
    #[serde(rename = "lesscode")]
    Lesscode,
}

impl Default for SourceOrigin {
    fn default() -> Self {
        Self::Vcs
    }
}

/// Deployment environment of a module. Every module has exactly one
/// engine app per environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Environment {
    #[serde(rename = "stag")]
    Stag,
    #[serde(rename = "prod")]
    Prod,
}

impl Environment {
    pub fn all() -> [Environment; 2] {
        [Environment::Stag, Environment::Prod]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Stag => "stag",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stag" => Ok(Environment::Stag),
            "prod" => Ok(Environment::Prod),
            other => Err(ValidationError::UnknownEnvironment(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AddressSource {
    #[serde(rename = "built_in")]
    BuiltIn,
    #[serde(rename = "auto_gen")]
    AutoGen,
    #[serde(rename = "independent")]
    Independent,
}

/// Kind of a client-visible address, ordered by how prominently the
/// platform advertises it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AddressType {
    #[serde(rename = "custom")]
    Custom,
    #[serde(rename = "subdomain")]
    Subdomain,
    #[serde(rename = "subpath")]
    Subpath,
}

impl AddressType {
    /// Higher wins when picking the single exposed URL of an environment.
    pub fn preference(&self) -> u8 {
        match self {
            AddressType::Custom => 3,
            AddressType::Subdomain => 2,
            AddressType::Subpath => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeployStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "progressing")]
    Progressing,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "unknown")]
    Unknown,
}

impl DeployStatus {
    /// Terminal rows are never written back to an in-flight status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Ready | DeployStatus::Error)
    }
}

impl Default for DeployStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BuildStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "successful")]
    Successful,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "interrupted")]
    Interrupted,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Successful | BuildStatus::Failed | BuildStatus::Interrupted
        )
    }
}

impl Default for BuildStatus {
    fn default() -> Self {
        Self::Pending
    }
}
