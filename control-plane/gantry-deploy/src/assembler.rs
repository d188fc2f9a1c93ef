use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_models::{Application, EngineApp, Environment, Module};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use uuid::Uuid;

use crate::crd::{BkApp, EnvVarSpec};
use crate::error::{DeployError, DeployResult};

pub const ANNOT_REGION: &str = "bkapp.paas.bk.tencent.com/region";
pub const ANNOT_CODE: &str = "bkapp.paas.bk.tencent.com/code";
pub const ANNOT_NAME: &str = "bkapp.paas.bk.tencent.com/name";
pub const ANNOT_MODULE: &str = "bkapp.paas.bk.tencent.com/module-name";
pub const ANNOT_ENVIRONMENT: &str = "bkapp.paas.bk.tencent.com/environment";
pub const ANNOT_DEPLOY_ID: &str = "bkapp.paas.bk.tencent.com/deploy-id";
pub const ANNOT_ADDONS: &str = "bkapp.paas.bk.tencent.com/addons";
pub const ANNOT_IMAGE_CREDENTIALS: &str = "bkapp.paas.bk.tencent.com/image-credentials";

/// One registry-credentials secret per engine-app namespace.
pub const IMAGE_CREDENTIALS_SECRET: &str = "bkapp-dockerconfigjson";

/// Processes listen on this port unless a built-in variable overrides it.
pub const DEFAULT_CONTAINER_PORT: &str = "5000";

/// Everything the assembler needs to place a revision into a cluster.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub application: Application,
    pub module: Module,
    pub environment: Environment,
    pub engine_app: EngineApp,
    pub deploy_id: Uuid,
}

/// Names of the add-on services bound to one (module, environment);
/// the operator reads them from the manifest annotation.
#[async_trait]
pub trait AddonNameSource: Send + Sync {
    async fn addon_names(
        &self,
        application: &Application,
        module: &Module,
        environment: Environment,
    ) -> DeployResult<Vec<String>>;
}

/// Platform-built-in environment variables. `PORT` is appended by the
/// assembler when a source omits it.
#[async_trait]
pub trait BuiltinEnvSource: Send + Sync {
    async fn builtin_env(&self, context: &DeployContext) -> DeployResult<Vec<EnvVarSpec>>;
}

/// Registry credentials covering the module's images, rendered as one
/// docker config JSON document. `None` means no credential applies.
#[async_trait]
pub trait ImageCredentialSource: Send + Sync {
    async fn dockerconfig(&self, context: &DeployContext) -> DeployResult<Option<String>>;
}

/// Manifest plus the side objects it needs in the cluster.
#[derive(Debug, Clone)]
pub struct AssembledDeploy {
    pub bkapp: BkApp,
    pub credentials_secret: Option<Secret>,
}

/// Turns a stored manifest revision into a cluster-applicable `BkApp`:
/// platform annotations overwritten, environment merged, credentials
/// materialised, status cleared.
pub struct ManifestAssembler {
    addons: Arc<dyn AddonNameSource>,
    builtin_env: Arc<dyn BuiltinEnvSource>,
    credentials: Arc<dyn ImageCredentialSource>,
}

impl ManifestAssembler {
    pub fn new(
        addons: Arc<dyn AddonNameSource>,
        builtin_env: Arc<dyn BuiltinEnvSource>,
        credentials: Arc<dyn ImageCredentialSource>,
    ) -> Self {
        Self {
            addons,
            builtin_env,
            credentials,
        }
    }

    pub async fn assemble(
        &self,
        manifest: &serde_json::Value,
        context: &DeployContext,
    ) -> DeployResult<AssembledDeploy> {
        let mut bkapp: BkApp = serde_json::from_value(manifest.clone())
            .map_err(|e| DeployError::InvalidManifest(e.to_string()))?;

        // The cluster-side identity comes from the engine app, never
        // from whatever the revision happened to store.
        bkapp.metadata.name = Some(context.engine_app.name.clone());
        bkapp.metadata.namespace = Some(context.engine_app.namespace.clone());
        bkapp.metadata.resource_version = None;
        bkapp.metadata.uid = None;
        bkapp.metadata.managed_fields = None;
        bkapp.metadata.creation_timestamp = None;

        let addon_names = self
            .addons
            .addon_names(&context.application, &context.module, context.environment)
            .await?;
        let dockerconfig = self.credentials.dockerconfig(context).await?;

        let annotations = bkapp.metadata.annotations.get_or_insert_with(BTreeMap::new);
        annotations.insert(ANNOT_REGION.to_string(), context.application.region.clone());
        annotations.insert(ANNOT_CODE.to_string(), context.application.code.clone());
        annotations.insert(ANNOT_NAME.to_string(), context.application.name.clone());
        annotations.insert(ANNOT_MODULE.to_string(), context.module.name.clone());
        annotations.insert(
            ANNOT_ENVIRONMENT.to_string(),
            context.environment.as_str().to_string(),
        );
        annotations.insert(ANNOT_DEPLOY_ID.to_string(), context.deploy_id.to_string());
        annotations.insert(
            ANNOT_ADDONS.to_string(),
            serde_json::to_string(&addon_names)
                .map_err(|e| DeployError::Internal(e.to_string()))?,
        );
        annotations.insert(
            ANNOT_IMAGE_CREDENTIALS.to_string(),
            if dockerconfig.is_some() { "true" } else { "" }.to_string(),
        );

        let mut builtins = self.builtin_env.builtin_env(context).await?;
        if !builtins.iter().any(|v| v.name == "PORT") {
            builtins.push(EnvVarSpec::new("PORT", DEFAULT_CONTAINER_PORT));
        }
        let configuration = bkapp.spec.configuration.get_or_insert_with(Default::default);
        configuration.env = merge_env(builtins, std::mem::take(&mut configuration.env));

        bkapp.status = None;

        let credentials_secret =
            dockerconfig.map(|config| dockerconfig_secret(&context.engine_app.namespace, &config));
        Ok(AssembledDeploy {
            bkapp,
            credentials_secret,
        })
    }
}

/// Caller-wins merge: built-ins come first, but any name the caller also
/// sets is dropped from the built-in side.
pub fn merge_env(builtins: Vec<EnvVarSpec>, caller: Vec<EnvVarSpec>) -> Vec<EnvVarSpec> {
    let mut merged: Vec<EnvVarSpec> = builtins
        .into_iter()
        .filter(|b| !caller.iter().any(|c| c.name == b.name))
        .collect();
    merged.extend(caller);
    merged
}

fn dockerconfig_secret(namespace: &str, dockerconfig: &str) -> Secret {
    let mut string_data = BTreeMap::new();
    string_data.insert(".dockerconfigjson".to_string(), dockerconfig.to_string());
    Secret {
        metadata: ObjectMeta {
            name: Some(IMAGE_CREDENTIALS_SECRET.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        string_data: Some(string_data),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_wins_on_name_collision() {
        let builtins = vec![
            EnvVarSpec::new("PORT", "5000"),
            EnvVarSpec::new("GANTRY_APP_CODE", "demo"),
        ];
        let caller = vec![
            EnvVarSpec::new("PORT", "8080"),
            EnvVarSpec::new("DEBUG", "1"),
        ];
        let merged = merge_env(builtins, caller);
        assert_eq!(
            merged,
            vec![
                EnvVarSpec::new("GANTRY_APP_CODE", "demo"),
                EnvVarSpec::new("PORT", "8080"),
                EnvVarSpec::new("DEBUG", "1"),
            ]
        );
    }

    #[test]
    fn empty_caller_keeps_builtins() {
        let builtins = vec![EnvVarSpec::new("PORT", "5000")];
        assert_eq!(merge_env(builtins.clone(), vec![]), builtins);
    }
}
