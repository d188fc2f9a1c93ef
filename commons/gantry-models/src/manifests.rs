use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{DeployStatus, Environment};

/// Per-module manifest slot. Points at the currently active revision;
/// revisions themselves are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppModelResource {
    pub id: Uuid,
    pub module_id: Uuid,
    pub revision_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppModelRevision {
    pub id: Uuid,
    pub module_id: Uuid,
    pub manifest: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One deployment attempt of a revision into an environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppModelDeploy {
    pub id: Uuid,
    pub module_id: Uuid,
    pub environment: Environment,
    pub revision_id: Uuid,
    pub operator: String,
    pub status: DeployStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl AppModelDeploy {
    pub fn new(
        module_id: Uuid,
        environment: Environment,
        revision_id: Uuid,
        operator: &str,
    ) -> Self {
        AppModelDeploy {
            id: Uuid::new_v4(),
            module_id,
            environment,
            revision_id,
            operator: operator.to_string(),
            status: DeployStatus::Pending,
            reason: String::new(),
            message: String::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
