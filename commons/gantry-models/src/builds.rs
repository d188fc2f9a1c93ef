use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::BuildStatus;

/// Where the source archive of a build came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildSource {
    Vcs { repo_url: String, revision: String },
    SmartPackage { package_name: String },
}

/// One build task of an S-mart package or source module. The signature is
/// the concurrency key: at most one non-terminal record per signature runs
/// platform-wide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmartBuildRecord {
    pub id: Uuid,
    pub module_id: Uuid,
    pub source: BuildSource,
    pub signature: String,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_requested_at: Option<DateTime<Utc>>,
    pub operator: String,
    pub created_at: DateTime<Utc>,
}

impl SmartBuildRecord {
    pub fn new(module_id: Uuid, source: BuildSource, signature: &str, operator: &str) -> Self {
        SmartBuildRecord {
            id: Uuid::new_v4(),
            module_id,
            source,
            signature: signature.to_string(),
            status: BuildStatus::Pending,
            artifact_url: None,
            time_spent_seconds: None,
            int_requested_at: None,
            operator: operator.to_string(),
            created_at: Utc::now(),
        }
    }
}
