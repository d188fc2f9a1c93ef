use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};

/// Field manager for server-side apply; one manager for everything the
/// platform owns so successive applies replace each other's fields.
const FIELD_MANAGER: &str = "gantry";

/// Typed facade over one cluster's API server. Cheap to clone; all helpers
/// take `&self` and are safe for concurrent use.
#[derive(Clone)]
pub struct ClusterClient {
    client: kube::Client,
    config: Arc<ClusterConfig>,
}

impl ClusterClient {
    pub fn new(client: kube::Client, config: ClusterConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn kube(&self) -> kube::Client {
        self.client.clone()
    }

    pub fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    /// Server-side apply; creates or overwrites the platform-owned fields.
    pub async fn apply<K>(&self, namespace: &str, name: &str, object: &K) -> ClusterResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Serialize
            + DeserializeOwned
            + Clone
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        debug!(%namespace, %name, "applying object");
        let api: Api<K> = self.api(namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(api.patch(name, &params, &Patch::Apply(object)).await?)
    }

    /// Create-or-merge-patch. Unlike [`Self::apply`], fields absent from
    /// `object` survive on the live resource, which is what CRs shared
    /// with an external operator need.
    pub async fn merge_apply<K>(&self, namespace: &str, name: &str, object: &K) -> ClusterResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Serialize
            + DeserializeOwned
            + Clone
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.api(namespace);
        match api.get_opt(name).await? {
            Some(_) => {
                debug!(%namespace, %name, "merge-patching existing object");
                Ok(api
                    .patch(name, &PatchParams::default(), &Patch::Merge(object))
                    .await?)
            }
            None => {
                debug!(%namespace, %name, "creating object");
                Ok(api.create(&PostParams::default(), object).await?)
            }
        }
    }

    pub async fn get_opt<K>(&self, namespace: &str, name: &str) -> ClusterResult<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.api(namespace);
        Ok(api.get_opt(name).await?)
    }

    pub async fn delete_ignore_missing<K>(&self, namespace: &str, name: &str) -> ClusterResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + DeserializeOwned + Clone + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.api(namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn apply_dynamic(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        manifest: &serde_json::Value,
    ) -> ClusterResult<DynamicObject> {
        debug!(%namespace, %name, kind = %resource.kind, "applying dynamic object");
        let api = self.dynamic_api(resource, namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(api.patch(name, &params, &Patch::Apply(manifest)).await?)
    }

    pub async fn get_dynamic_opt(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<DynamicObject>> {
        let api = self.dynamic_api(resource, namespace);
        Ok(api.get_opt(name).await?)
    }

    /// Merge-patches an existing dynamic object. Fields absent from
    /// `patch` are left alone; arrays are replaced wholesale.
    pub async fn merge_patch_dynamic(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClusterResult<DynamicObject> {
        let api = self.dynamic_api(resource, namespace);
        Ok(api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    pub async fn delete_dynamic_ignore_missing(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<()> {
        let api = self.dynamic_api(resource, namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates the namespace when missing. A fresh namespace is unusable
    /// until kube-controller-manager provisions its default service
    /// account, so creation waits for it within `account_wait`.
    /// Returns whether the namespace was created by this call.
    pub async fn ensure_namespace(
        &self,
        namespace: &str,
        account_wait: Duration,
    ) -> ClusterResult<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if api.get_opt(namespace).await?.is_some() {
            return Ok(false);
        }

        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {}
            // Lost the race to another creator; the namespace exists.
            Err(kube::Error::Api(ae)) if ae.code == 409 => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        debug!(%namespace, "namespace created, waiting for default service account");
        self.wait_for_default_account(namespace, account_wait)
            .await?;
        Ok(true)
    }

    async fn wait_for_default_account(
        &self,
        namespace: &str,
        account_wait: Duration,
    ) -> ClusterResult<()> {
        let api: Api<ServiceAccount> = self.api(namespace);
        let deadline = Instant::now() + account_wait;
        loop {
            if api.get_opt("default").await?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ClusterError::Timeout(format!(
                    "default service account in namespace {namespace}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}
