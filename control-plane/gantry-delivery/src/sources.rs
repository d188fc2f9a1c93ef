use std::sync::Arc;

use async_trait::async_trait;
use gantry_addons::AddonBinder;
use gantry_deploy::{
    AddonNameSource, BuiltinEnvSource, DeployContext, DeployError, DeployResult,
    ImageCredentialSource,
};
use gantry_deploy::crd::EnvVarSpec;
use gantry_models::{Application, Environment, Module};
use serde_json::json;

use crate::config::RegistryCredential;

/// Production inputs of the manifest assembler: add-on names come from
/// the binder, built-in env from the deploy context, and the pull
/// credential from platform configuration.
pub struct PlatformSources {
    binder: Arc<AddonBinder>,
    registry: Option<RegistryCredential>,
}

impl PlatformSources {
    pub fn new(binder: Arc<AddonBinder>, registry: Option<RegistryCredential>) -> Self {
        Self { binder, registry }
    }
}

#[async_trait]
impl AddonNameSource for PlatformSources {
    async fn addon_names(
        &self,
        _application: &Application,
        module: &Module,
        _environment: Environment,
    ) -> DeployResult<Vec<String>> {
        self.binder
            .service_names(module.id)
            .await
            .map_err(|error| DeployError::Internal(error.to_string()))
    }
}

#[async_trait]
impl BuiltinEnvSource for PlatformSources {
    async fn builtin_env(&self, context: &DeployContext) -> DeployResult<Vec<EnvVarSpec>> {
        Ok(vec![
            EnvVarSpec::new("GANTRY_APP_CODE", context.application.code.clone()),
            EnvVarSpec::new("GANTRY_APP_NAME", context.application.name.clone()),
            EnvVarSpec::new("GANTRY_MODULE_NAME", context.module.name.clone()),
            EnvVarSpec::new("GANTRY_ENVIRONMENT", context.environment.as_str()),
            EnvVarSpec::new("GANTRY_ENGINE_APP_NAME", context.engine_app.name.clone()),
            EnvVarSpec::new("GANTRY_REGION", context.engine_app.region.clone()),
        ])
    }
}

#[async_trait]
impl ImageCredentialSource for PlatformSources {
    async fn dockerconfig(&self, _context: &DeployContext) -> DeployResult<Option<String>> {
        let Some(credential) = &self.registry else {
            return Ok(None);
        };
        let mut auths = serde_json::Map::new();
        auths.insert(
            credential.host.clone(),
            json!({
                "username": credential.username,
                "password": credential.password,
            }),
        );
        Ok(Some(json!({ "auths": auths }).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use gantry_addons::RemoteProviderClient;
    use gantry_models::{AppType, EngineApp, SourceOrigin, TenantMode};
    use gantry_storage::memory::MemoryAttachmentStorage;
    use uuid::Uuid;

    fn sources(registry: Option<RegistryCredential>) -> PlatformSources {
        let provider = Arc::new(
            RemoteProviderClient::new("http://localhost:1", None, Duration::from_secs(1))
                .unwrap(),
        );
        let binder = Arc::new(AddonBinder::new(
            Arc::new(MemoryAttachmentStorage::new()),
            provider,
        ));
        PlatformSources::new(binder, registry)
    }

    fn context() -> DeployContext {
        let application_id = Uuid::new_v4();
        let module_id = Uuid::new_v4();
        DeployContext {
            application: Application {
                id: application_id,
                code: "demo".to_string(),
                name: "Demo".to_string(),
                region: "default".to_string(),
                tenant_mode: TenantMode::Single,
                tenant_id: "tenant-1".to_string(),
                app_type: AppType::CloudNative,
                is_plugin: false,
                is_smart: false,
                owner: "alice".to_string(),
                logo_url: None,
                is_deleted: false,
                created_at: Utc::now(),
            },
            module: Module {
                id: module_id,
                application_id,
                name: "api".to_string(),
                language: "python".to_string(),
                source_origin: SourceOrigin::Vcs,
                is_default: true,
                creator: "alice".to_string(),
                created_at: Utc::now(),
            },
            environment: Environment::Prod,
            engine_app: EngineApp {
                id: Uuid::new_v4(),
                name: "gantry-demo-api-prod".to_string(),
                namespace: "gantry-demo".to_string(),
                region: "default".to_string(),
                cluster_name: "default".to_string(),
            },
            deploy_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn builtin_env_carries_the_platform_identity() {
        let env = sources(None).builtin_env(&context()).await.unwrap();

        let get = |name: &str| {
            env.iter()
                .find(|v| v.name == name)
                .map(|v| v.value.clone())
        };
        assert_eq!(get("GANTRY_APP_CODE").as_deref(), Some("demo"));
        assert_eq!(get("GANTRY_ENVIRONMENT").as_deref(), Some("prod"));
        assert_eq!(
            get("GANTRY_ENGINE_APP_NAME").as_deref(),
            Some("gantry-demo-api-prod")
        );
        // PORT is the assembler's to append, not ours.
        assert_eq!(get("PORT"), None);
    }

    #[tokio::test]
    async fn dockerconfig_renders_the_configured_registry() {
        assert_eq!(sources(None).dockerconfig(&context()).await.unwrap(), None);

        let rendered = sources(Some(RegistryCredential {
            host: "registry.example.com".to_string(),
            username: "robot".to_string(),
            password: "hunter2".to_string(),
        }))
        .dockerconfig(&context())
        .await
        .unwrap()
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            parsed["auths"]["registry.example.com"]["username"],
            "robot"
        );
    }
}
