use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::enums::*;
use crate::validation::{validate_app_code, ValidationError};

/// Root entity of the delivery model. Soft-deleted rows keep their code
/// reserved, so uniqueness checks must include them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Application {
    pub id: Uuid,
    #[validate(length(min = 1, message = "App code cannot be empty"))]
    pub code: String,
    pub name: String,
    pub region: String,
    pub tenant_mode: TenantMode,
    #[serde(default)]
    pub tenant_id: String,
    pub app_type: AppType,
    #[serde(default)]
    pub is_plugin: bool,
    #[serde(default)]
    pub is_smart: bool,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Additional validation beyond what the validator provides
    pub fn validate_business_rules(&self) -> Result<(), ValidationError> {
        validate_app_code(&self.code)?;
        match self.tenant_mode {
            TenantMode::Global if !self.tenant_id.is_empty() => Err(
                ValidationError::TenantIdNotAllowed(self.tenant_id.clone()),
            ),
            TenantMode::Single if self.tenant_id.is_empty() => {
                Err(ValidationError::TenantIdRequired)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Module {
    pub id: Uuid,
    pub application_id: Uuid,
    #[validate(length(min = 1, message = "Module name cannot be empty"))]
    pub name: String,
    pub language: String,
    pub source_origin: SourceOrigin,
    #[serde(default)]
    pub is_default: bool,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

/// The (module, environment) pair. Owns exactly one engine app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleEnv {
    pub id: Uuid,
    pub module_id: Uuid,
    pub environment: Environment,
    pub engine_app_id: Uuid,
}

/// Cluster-side identity of an environment: where its workloads live and
/// which cluster serves them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct EngineApp {
    pub id: Uuid,
    #[validate(length(min = 1, message = "Engine app name cannot be empty"))]
    pub name: String,
    pub namespace: String,
    pub region: String,
    pub cluster_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_app() -> Application {
        Application {
            id: Uuid::new_v4(),
            code: "demo".to_string(),
            name: "Demo".to_string(),
            region: "default".to_string(),
            tenant_mode: TenantMode::Single,
            tenant_id: "tenant-1".to_string(),
            app_type: AppType::Default,
            is_plugin: false,
            is_smart: false,
            owner: "admin".to_string(),
            logo_url: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tenant_mode_implies_tenant_id() {
        let app = base_app();
        assert!(app.validate_business_rules().is_ok());

        let mut global = base_app();
        global.tenant_mode = TenantMode::Global;
        assert!(matches!(
            global.validate_business_rules(),
            Err(ValidationError::TenantIdNotAllowed(_))
        ));

        global.tenant_id = String::new();
        assert!(global.validate_business_rules().is_ok());

        let mut single = base_app();
        single.tenant_id = String::new();
        assert!(matches!(
            single.validate_business_rules(),
            Err(ValidationError::TenantIdRequired)
        ));
    }
}
