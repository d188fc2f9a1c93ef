use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Module-level record that a remote add-on service is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleAttachment {
    pub id: Uuid,
    pub module_id: Uuid,
    pub service_id: String,
    #[serde(default)]
    pub tenant_id: String,
}

/// Per-environment binding of a module to a service plan. Without an
/// instance ID the binding is unprovisioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineAppAttachment {
    pub id: Uuid,
    pub engine_app_id: Uuid,
    pub service_id: String,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_instance_id: Option<String>,
}

impl EngineAppAttachment {
    pub fn is_provisioned(&self) -> bool {
        self.service_instance_id.is_some()
    }
}

/// An unbound attachment whose provider instance is still being recycled.
/// Dropped once the provider no longer knows the instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnboundEngineAppAttachment {
    pub id: Uuid,
    pub engine_app_id: Uuid,
    pub service_id: String,
    pub service_instance_id: String,
    pub created_at: DateTime<Utc>,
}

/// `module_id` reuses the binding `ref_module_id` holds for `service_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedAttachment {
    pub id: Uuid,
    pub module_id: Uuid,
    pub ref_module_id: Uuid,
    pub service_id: String,
}
