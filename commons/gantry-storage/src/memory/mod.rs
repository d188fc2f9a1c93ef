mod lease;

pub use lease::MemoryBuildLeaseStore;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_models::{
    AddressSource, AppDomain, AppDomainCert, AppDomainSharedCert, AppModelDeploy,
    AppModelResource, AppModelRevision, AppSubpath, Application, CustomDomain, DeployStatus,
    EngineApp, EngineAppAttachment, Environment, Module, ModuleAttachment, ModuleEnv,
    SharedAttachment, SmartBuildRecord, UnboundEngineAppAttachment,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::*;

type MemoryStore<T> = Arc<RwLock<HashMap<Uuid, T>>>;

fn new_store<T>() -> MemoryStore<T> {
    Arc::new(RwLock::new(HashMap::new()))
}

#[derive(Clone)]
pub struct MemoryApplicationStorage {
    apps: MemoryStore<Application>,
    modules: MemoryStore<Module>,
    module_envs: MemoryStore<ModuleEnv>,
    engine_apps: MemoryStore<EngineApp>,
}

impl MemoryApplicationStorage {
    pub fn new() -> Self {
        Self {
            apps: new_store(),
            modules: new_store(),
            module_envs: new_store(),
            engine_apps: new_store(),
        }
    }
}

impl Default for MemoryApplicationStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageHealth for MemoryApplicationStorage {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ApplicationStorage for MemoryApplicationStorage {
    async fn store_application(&self, app: &Application) -> StorageResult<()> {
        let mut store = self.apps.write().await;
        let taken = store
            .values()
            .any(|existing| existing.code == app.code && existing.id != app.id);
        if taken {
            return Err(StorageError::AlreadyExists(app.code.clone()));
        }
        store.insert(app.id, app.clone());
        Ok(())
    }

    async fn get_application(&self, id: Uuid) -> StorageResult<Option<Application>> {
        let store = self.apps.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn get_application_by_code(&self, code: &str) -> StorageResult<Option<Application>> {
        let store = self.apps.read().await;
        Ok(store
            .values()
            .find(|app| app.code == code && !app.is_deleted)
            .cloned())
    }

    async fn mark_application_deleted(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.apps.write().await;
        match store.get_mut(&id) {
            Some(app) => {
                app.is_deleted = true;
                Ok(())
            }
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn store_module(&self, module: &Module) -> StorageResult<()> {
        let mut store = self.modules.write().await;
        for existing in store.values() {
            if existing.id == module.id {
                continue;
            }
            if existing.application_id != module.application_id {
                continue;
            }
            if existing.name == module.name {
                return Err(StorageError::AlreadyExists(module.name.clone()));
            }
            if module.is_default && existing.is_default {
                return Err(StorageError::Conflict(format!(
                    "application {} already has default module {}",
                    module.application_id, existing.name
                )));
            }
        }
        store.insert(module.id, module.clone());
        Ok(())
    }

    async fn get_module(&self, id: Uuid) -> StorageResult<Option<Module>> {
        let store = self.modules.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn list_modules(&self, application_id: Uuid) -> StorageResult<Vec<Module>> {
        let store = self.modules.read().await;
        Ok(store
            .values()
            .filter(|module| module.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn delete_module(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.modules.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn store_module_env(&self, env: &ModuleEnv) -> StorageResult<()> {
        let mut store = self.module_envs.write().await;
        let taken = store.values().any(|existing| {
            existing.module_id == env.module_id
                && existing.environment == env.environment
                && existing.id != env.id
        });
        if taken {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                env.module_id, env.environment
            )));
        }
        store.insert(env.id, env.clone());
        Ok(())
    }

    async fn list_module_envs(&self, module_id: Uuid) -> StorageResult<Vec<ModuleEnv>> {
        let store = self.module_envs.read().await;
        Ok(store
            .values()
            .filter(|env| env.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn delete_module_env(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.module_envs.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn store_engine_app(&self, engine_app: &EngineApp) -> StorageResult<()> {
        let mut store = self.engine_apps.write().await;
        store.insert(engine_app.id, engine_app.clone());
        Ok(())
    }

    async fn get_engine_app(&self, id: Uuid) -> StorageResult<Option<EngineApp>> {
        let store = self.engine_apps.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn delete_engine_app(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.engine_apps.write().await;
        store.remove(&id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryRoutingStorage {
    domains: MemoryStore<AppDomain>,
    subpaths: MemoryStore<AppSubpath>,
    custom_domains: MemoryStore<CustomDomain>,
}

impl MemoryRoutingStorage {
    pub fn new() -> Self {
        Self {
            domains: new_store(),
            subpaths: new_store(),
            custom_domains: new_store(),
        }
    }
}

impl Default for MemoryRoutingStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageHealth for MemoryRoutingStorage {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl RoutingStorage for MemoryRoutingStorage {
    async fn save_app_domain(&self, domain: &AppDomain) -> StorageResult<()> {
        let mut store = self.domains.write().await;
        let taken = store.values().any(|existing| {
            existing.region == domain.region
                && existing.host == domain.host
                && existing.path_prefix == domain.path_prefix
                && existing.id != domain.id
        });
        if taken {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}{}",
                domain.region, domain.host, domain.path_prefix
            )));
        }
        store.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn list_app_domains(&self, filter: AppDomainFilter) -> StorageResult<Vec<AppDomain>> {
        let store = self.domains.read().await;
        let domains = store
            .values()
            .filter(|domain| {
                if let Some(engine_app_id) = filter.engine_app_id {
                    if domain.engine_app_id != engine_app_id {
                        return false;
                    }
                }
                if let Some(ref region) = filter.region {
                    if domain.region != *region {
                        return false;
                    }
                }
                if let Some(source) = filter.source {
                    if domain.source != source {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        Ok(domains)
    }

    async fn get_domain_by_address(
        &self,
        region: &str,
        host: &str,
        path_prefix: &str,
    ) -> StorageResult<Option<AppDomain>> {
        let store = self.domains.read().await;
        Ok(store
            .values()
            .find(|domain| {
                domain.region == region
                    && domain.host == host
                    && domain.path_prefix == path_prefix
            })
            .cloned())
    }

    async fn delete_app_domain(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.domains.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn assign_app_domains(
        &self,
        engine_app_id: Uuid,
        source: AddressSource,
        domains: Vec<AppDomain>,
    ) -> StorageResult<Vec<Uuid>> {
        let mut store = self.domains.write().await;
        let mut affected = HashSet::new();
        let mut desired_addrs = HashSet::new();

        for mut domain in domains {
            domain.engine_app_id = engine_app_id;
            domain.source = source;
            desired_addrs.insert((domain.region.clone(), domain.host.clone(), domain.path_prefix.clone()));

            let existing = store
                .values()
                .find(|d| {
                    d.region == domain.region
                        && d.host == domain.host
                        && d.path_prefix == domain.path_prefix
                })
                .map(|d| (d.id, d.engine_app_id));
            if let Some((old_id, old_owner)) = existing {
                if old_owner != engine_app_id {
                    affected.insert(old_owner);
                }
                store.remove(&old_id);
            }
            store.insert(domain.id, domain);
        }

        let stale: Vec<Uuid> = store
            .values()
            .filter(|d| {
                d.engine_app_id == engine_app_id
                    && d.source == source
                    && !desired_addrs.contains(&(
                        d.region.clone(),
                        d.host.clone(),
                        d.path_prefix.clone(),
                    ))
            })
            .map(|d| d.id)
            .collect();
        for id in stale {
            store.remove(&id);
        }

        Ok(affected.into_iter().collect())
    }

    async fn assign_subpaths(
        &self,
        engine_app_id: Uuid,
        region: &str,
        subpaths: Vec<String>,
    ) -> StorageResult<Vec<Uuid>> {
        let mut store = self.subpaths.write().await;
        let mut affected = HashSet::new();
        let desired: HashSet<&String> = subpaths.iter().collect();

        for subpath in &subpaths {
            let existing = store
                .values_mut()
                .find(|row| row.region == region && row.subpath == *subpath);
            match existing {
                Some(row) => {
                    if row.engine_app_id != engine_app_id {
                        affected.insert(row.engine_app_id);
                        row.engine_app_id = engine_app_id;
                    }
                }
                None => {
                    let row = AppSubpath {
                        id: Uuid::new_v4(),
                        engine_app_id,
                        region: region.to_string(),
                        subpath: subpath.clone(),
                    };
                    store.insert(row.id, row);
                }
            }
        }

        let stale: Vec<Uuid> = store
            .values()
            .filter(|row| {
                row.engine_app_id == engine_app_id
                    && row.region == region
                    && !desired.contains(&row.subpath)
            })
            .map(|row| row.id)
            .collect();
        for id in stale {
            store.remove(&id);
        }

        Ok(affected.into_iter().collect())
    }

    async fn list_subpaths(&self, engine_app_id: Uuid) -> StorageResult<Vec<AppSubpath>> {
        let store = self.subpaths.read().await;
        Ok(store
            .values()
            .filter(|row| row.engine_app_id == engine_app_id)
            .cloned()
            .collect())
    }

    async fn save_custom_domain(&self, domain: &CustomDomain) -> StorageResult<()> {
        let mut store = self.custom_domains.write().await;
        let taken = store.values().any(|existing| {
            existing.host == domain.host
                && existing.path_prefix == domain.path_prefix
                && existing.id != domain.id
        });
        if taken {
            return Err(StorageError::AlreadyExists(format!(
                "{}{}",
                domain.host, domain.path_prefix
            )));
        }
        store.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn get_custom_domain(&self, id: Uuid) -> StorageResult<Option<CustomDomain>> {
        let store = self.custom_domains.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn list_custom_domains(&self, engine_app_id: Uuid) -> StorageResult<Vec<CustomDomain>> {
        let store = self.custom_domains.read().await;
        Ok(store
            .values()
            .filter(|domain| domain.engine_app_id == engine_app_id)
            .cloned()
            .collect())
    }

    async fn delete_custom_domain(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.custom_domains.write().await;
        store.remove(&id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryCertStorage {
    certs: MemoryStore<AppDomainCert>,
    shared_certs: MemoryStore<AppDomainSharedCert>,
}

impl MemoryCertStorage {
    pub fn new() -> Self {
        Self {
            certs: new_store(),
            shared_certs: new_store(),
        }
    }
}

impl Default for MemoryCertStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageHealth for MemoryCertStorage {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CertStorage for MemoryCertStorage {
    async fn save_cert(&self, cert: &AppDomainCert) -> StorageResult<()> {
        let mut store = self.certs.write().await;
        store.insert(cert.id, cert.clone());
        Ok(())
    }

    async fn get_cert(&self, id: Uuid) -> StorageResult<Option<AppDomainCert>> {
        let store = self.certs.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn delete_cert(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.certs.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn save_shared_cert(&self, cert: &AppDomainSharedCert) -> StorageResult<()> {
        let mut store = self.shared_certs.write().await;
        store.insert(cert.id, cert.clone());
        Ok(())
    }

    async fn get_shared_cert(&self, id: Uuid) -> StorageResult<Option<AppDomainSharedCert>> {
        let store = self.shared_certs.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn list_shared_certs(&self, region: &str) -> StorageResult<Vec<AppDomainSharedCert>> {
        let store = self.shared_certs.read().await;
        Ok(store
            .values()
            .filter(|cert| cert.region == region)
            .cloned()
            .collect())
    }

    async fn delete_shared_cert(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.shared_certs.write().await;
        store.remove(&id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryManifestStorage {
    revisions: MemoryStore<AppModelRevision>,
    resources: MemoryStore<AppModelResource>,
    deploys: MemoryStore<AppModelDeploy>,
}

impl MemoryManifestStorage {
    pub fn new() -> Self {
        Self {
            revisions: new_store(),
            resources: new_store(),
            deploys: new_store(),
        }
    }
}

impl Default for MemoryManifestStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageHealth for MemoryManifestStorage {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ManifestStorage for MemoryManifestStorage {
    async fn store_revision(&self, revision: &AppModelRevision) -> StorageResult<()> {
        let mut store = self.revisions.write().await;
        if store.contains_key(&revision.id) {
            return Err(StorageError::AlreadyExists(revision.id.to_string()));
        }
        store.insert(revision.id, revision.clone());
        Ok(())
    }

    async fn get_revision(&self, id: Uuid) -> StorageResult<Option<AppModelRevision>> {
        let store = self.revisions.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn set_active_revision(&self, module_id: Uuid, revision_id: Uuid) -> StorageResult<()> {
        {
            let revisions = self.revisions.read().await;
            if !revisions.contains_key(&revision_id) {
                return Err(StorageError::NotFound(revision_id.to_string()));
            }
        }
        let mut resources = self.resources.write().await;
        let existing_id = resources
            .values()
            .find(|resource| resource.module_id == module_id)
            .map(|resource| resource.id);
        match existing_id {
            Some(id) => {
                if let Some(resource) = resources.get_mut(&id) {
                    resource.revision_id = revision_id;
                }
            }
            None => {
                let resource = AppModelResource {
                    id: Uuid::new_v4(),
                    module_id,
                    revision_id,
                };
                resources.insert(resource.id, resource);
            }
        }
        Ok(())
    }

    async fn get_resource(&self, module_id: Uuid) -> StorageResult<Option<AppModelResource>> {
        let store = self.resources.read().await;
        Ok(store
            .values()
            .find(|resource| resource.module_id == module_id)
            .cloned())
    }

    async fn store_deploy(&self, deploy: &AppModelDeploy) -> StorageResult<()> {
        let mut store = self.deploys.write().await;
        store.insert(deploy.id, deploy.clone());
        Ok(())
    }

    async fn get_deploy(&self, id: Uuid) -> StorageResult<Option<AppModelDeploy>> {
        let store = self.deploys.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn list_deploys(
        &self,
        module_id: Uuid,
        environment: Environment,
    ) -> StorageResult<Vec<AppModelDeploy>> {
        let store = self.deploys.read().await;
        Ok(store
            .values()
            .filter(|deploy| deploy.module_id == module_id && deploy.environment == environment)
            .cloned()
            .collect())
    }

    async fn update_deploy_status(
        &self,
        id: Uuid,
        status: DeployStatus,
        reason: &str,
        message: &str,
        transition_time: Option<DateTime<Utc>>,
    ) -> StorageResult<AppModelDeploy> {
        let mut store = self.deploys.write().await;
        let deploy = store
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        if deploy.status.is_terminal() && !status.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "deploy {} already reached {:?}",
                id, deploy.status
            )));
        }
        deploy.status = status;
        deploy.reason = reason.to_string();
        deploy.message = message.to_string();
        deploy.last_transition_time = transition_time.unwrap_or_else(Utc::now);
        Ok(deploy.clone())
    }
}

#[derive(Clone)]
pub struct MemoryBuildStorage {
    builds: MemoryStore<SmartBuildRecord>,
}

impl MemoryBuildStorage {
    pub fn new() -> Self {
        Self {
            builds: new_store(),
        }
    }
}

impl Default for MemoryBuildStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageHealth for MemoryBuildStorage {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BuildStorage for MemoryBuildStorage {
    async fn store_build(&self, record: &SmartBuildRecord) -> StorageResult<()> {
        let mut store = self.builds.write().await;
        store.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_build(&self, id: Uuid) -> StorageResult<Option<SmartBuildRecord>> {
        let store = self.builds.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn list_builds(&self, module_id: Uuid) -> StorageResult<Vec<SmartBuildRecord>> {
        let store = self.builds.read().await;
        Ok(store
            .values()
            .filter(|record| record.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn request_interrupt(
        &self,
        id: Uuid,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<()> {
        let mut store = self.builds.write().await;
        let record = store
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.int_requested_at = Some(ts);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryAttachmentStorage {
    module_attachments: MemoryStore<ModuleAttachment>,
    engine_app_attachments: MemoryStore<EngineAppAttachment>,
    unbound_attachments: MemoryStore<UnboundEngineAppAttachment>,
    shared_attachments: MemoryStore<SharedAttachment>,
}

impl MemoryAttachmentStorage {
    pub fn new() -> Self {
        Self {
            module_attachments: new_store(),
            engine_app_attachments: new_store(),
            unbound_attachments: new_store(),
            shared_attachments: new_store(),
        }
    }
}

impl Default for MemoryAttachmentStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageHealth for MemoryAttachmentStorage {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl AttachmentStorage for MemoryAttachmentStorage {
    async fn store_module_attachment(&self, att: &ModuleAttachment) -> StorageResult<()> {
        let mut store = self.module_attachments.write().await;
        let taken = store.values().any(|existing| {
            existing.module_id == att.module_id
                && existing.service_id == att.service_id
                && existing.id != att.id
        });
        if taken {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                att.module_id, att.service_id
            )));
        }
        store.insert(att.id, att.clone());
        Ok(())
    }

    async fn get_module_attachment(
        &self,
        module_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<ModuleAttachment>> {
        let store = self.module_attachments.read().await;
        Ok(store
            .values()
            .find(|att| att.module_id == module_id && att.service_id == service_id)
            .cloned())
    }

    async fn list_module_attachments(
        &self,
        module_id: Uuid,
    ) -> StorageResult<Vec<ModuleAttachment>> {
        let store = self.module_attachments.read().await;
        Ok(store
            .values()
            .filter(|att| att.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn delete_module_attachment(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.module_attachments.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn store_engine_app_attachment(&self, att: &EngineAppAttachment) -> StorageResult<()> {
        let mut store = self.engine_app_attachments.write().await;
        let taken = store.values().any(|existing| {
            existing.engine_app_id == att.engine_app_id
                && existing.service_id == att.service_id
                && existing.id != att.id
        });
        if taken {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                att.engine_app_id, att.service_id
            )));
        }
        store.insert(att.id, att.clone());
        Ok(())
    }

    async fn get_engine_app_attachment(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<EngineAppAttachment>> {
        let store = self.engine_app_attachments.read().await;
        Ok(store
            .values()
            .find(|att| att.engine_app_id == engine_app_id && att.service_id == service_id)
            .cloned())
    }

    async fn list_engine_app_attachments(
        &self,
        filter: AttachmentFilter,
    ) -> StorageResult<Vec<EngineAppAttachment>> {
        let store = self.engine_app_attachments.read().await;
        let attachments = store
            .values()
            .filter(|att| {
                if let Some(engine_app_id) = filter.engine_app_id {
                    if att.engine_app_id != engine_app_id {
                        return false;
                    }
                }
                if let Some(ref service_id) = filter.service_id {
                    if att.service_id != *service_id {
                        return false;
                    }
                }
                if filter.unprovisioned_only && att.is_provisioned() {
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        Ok(attachments)
    }

    async fn delete_engine_app_attachment(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.engine_app_attachments.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn store_unbound_attachment(
        &self,
        att: &UnboundEngineAppAttachment,
    ) -> StorageResult<()> {
        let mut store = self.unbound_attachments.write().await;
        store.insert(att.id, att.clone());
        Ok(())
    }

    async fn get_unbound_attachment(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<UnboundEngineAppAttachment>> {
        let store = self.unbound_attachments.read().await;
        Ok(store
            .values()
            .find(|att| att.engine_app_id == engine_app_id && att.service_id == service_id)
            .cloned())
    }

    async fn list_unbound_attachments(&self) -> StorageResult<Vec<UnboundEngineAppAttachment>> {
        let store = self.unbound_attachments.read().await;
        Ok(store.values().cloned().collect())
    }

    async fn delete_unbound_attachment(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.unbound_attachments.write().await;
        store.remove(&id);
        Ok(())
    }

    async fn store_shared_attachment(&self, att: &SharedAttachment) -> StorageResult<()> {
        let mut store = self.shared_attachments.write().await;
        let taken = store.values().any(|existing| {
            existing.module_id == att.module_id
                && existing.service_id == att.service_id
                && existing.id != att.id
        });
        if taken {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                att.module_id, att.service_id
            )));
        }
        store.insert(att.id, att.clone());
        Ok(())
    }

    async fn list_shared_attachments(
        &self,
        filter: SharedAttachmentFilter,
    ) -> StorageResult<Vec<SharedAttachment>> {
        let store = self.shared_attachments.read().await;
        let attachments = store
            .values()
            .filter(|att| {
                if let Some(module_id) = filter.module_id {
                    if att.module_id != module_id {
                        return false;
                    }
                }
                if let Some(ref_module_id) = filter.ref_module_id {
                    if att.ref_module_id != ref_module_id {
                        return false;
                    }
                }
                if let Some(ref service_id) = filter.service_id {
                    if att.service_id != *service_id {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        Ok(attachments)
    }

    async fn delete_shared_attachment(&self, id: Uuid) -> StorageResult<()> {
        let mut store = self.shared_attachments.write().await;
        store.remove(&id);
        Ok(())
    }
}
