mod lease;

pub use lease::EtcdBuildLeaseStore;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etcd_client::{Client, Compare, CompareOp, ConnectOptions, GetOptions, Txn, TxnOp};
use gantry_models::{
    AddressSource, AppDomain, AppDomainCert, AppDomainSharedCert, AppModelDeploy,
    AppModelResource, AppModelRevision, AppSubpath, Application, CustomDomain, DeployStatus,
    EngineApp, EngineAppAttachment, Environment, Module, ModuleAttachment, ModuleEnv,
    SharedAttachment, SmartBuildRecord, UnboundEngineAppAttachment,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StorageError;
use crate::factory::EtcdOptions;
use crate::traits::*;

/// Entity store on etcd: JSON documents keyed by ID plus secondary index
/// keys for the addresses that must stay unique.
#[derive(Clone)]
pub struct EtcdStorage {
    client: Client,
    key_prefix: String,
}

impl EtcdStorage {
    pub async fn connect(options: &EtcdOptions) -> Result<Self, StorageError> {
        let mut connect = ConnectOptions::new();
        if let (Some(user), Some(password)) = (&options.username, &options.password) {
            connect = connect.with_user(user.clone(), password.clone());
        }
        if let Some(secs) = options.timeout_seconds {
            connect = connect.with_timeout(Duration::from_secs(secs));
        }
        let client = Client::connect(&options.endpoints, Some(connect))
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: options.key_prefix.clone(),
        })
    }

    pub fn raw_client(&self) -> Client {
        self.client.clone()
    }

    fn doc_key(&self, kind: &str, id: &str) -> String {
        format!("{}/{}/{}", self.key_prefix, kind, id)
    }

    fn scan_prefix(&self, kind: &str) -> String {
        format!("{}/{}/", self.key_prefix, kind)
    }

    async fn put_json<T: Serialize>(&self, key: String, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_vec(value)?;
        let mut client = self.client.clone();
        client.put(key, raw, None).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: String) -> StorageResult<Option<T>> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(serde_json::from_slice(kv.value())?)),
            None => Ok(None),
        }
    }

    async fn scan_json<T: DeserializeOwned>(&self, prefix: String) -> StorageResult<Vec<T>> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        let mut items = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            items.push(serde_json::from_slice(kv.value())?);
        }
        Ok(items)
    }

    async fn get_string(&self, key: String) -> StorageResult<Option<String>> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(kv.value_str()?.to_string())),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: String) -> StorageResult<()> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    /// Writes a document together with its index key in one transaction,
    /// enforcing that the index is free or already points at this ID.
    async fn put_indexed<T: Serialize>(
        &self,
        doc_key: String,
        index_key: String,
        id: Uuid,
        value: &T,
        stale_index: Option<String>,
    ) -> StorageResult<()> {
        if let Some(owner) = self.get_string(index_key.clone()).await? {
            if owner != id.to_string() {
                return Err(StorageError::AlreadyExists(index_key));
            }
        }
        let raw = serde_json::to_vec(value)?;
        let mut ops = vec![
            TxnOp::put(doc_key, raw, None),
            TxnOp::put(index_key, id.to_string(), None),
        ];
        if let Some(stale) = stale_index {
            ops.push(TxnOp::delete(stale, None));
        }
        let mut client = self.client.clone();
        client.txn(Txn::new().and_then(ops)).await?;
        Ok(())
    }

    async fn remove_with_index(&self, doc_key: String, index_key: String) -> StorageResult<()> {
        let mut client = self.client.clone();
        client
            .txn(Txn::new().and_then([
                TxnOp::delete(doc_key, None),
                TxnOp::delete(index_key, None),
            ]))
            .await?;
        Ok(())
    }

    fn domain_addr_key(&self, region: &str, host: &str, path_prefix: &str) -> String {
        format!(
            "{}/app-domain-addr/{}/{}{}",
            self.key_prefix, region, host, path_prefix
        )
    }

    fn subpath_addr_key(&self, region: &str, subpath: &str) -> String {
        format!(
            "{}/subpath-addr/{}/{}",
            self.key_prefix,
            region,
            subpath.trim_start_matches('/')
        )
    }

    fn custom_addr_key(&self, host: &str, path_prefix: &str) -> String {
        format!("{}/custom-domain-addr/{}{}", self.key_prefix, host, path_prefix)
    }
}

#[async_trait]
impl StorageHealth for EtcdStorage {
    async fn health(&self) -> StorageResult<()> {
        let mut client = self.client.clone();
        client
            .get(
                self.key_prefix.clone(),
                Some(GetOptions::new().with_prefix().with_count_only()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ApplicationStorage for EtcdStorage {
    async fn store_application(&self, app: &Application) -> StorageResult<()> {
        let code_key = self.doc_key("application-codes", &app.code);
        let stale = match self
            .get_json::<Application>(self.doc_key("applications", &app.id.to_string()))
            .await?
        {
            Some(old) if old.code != app.code => {
                Some(self.doc_key("application-codes", &old.code))
            }
            _ => None,
        };
        self.put_indexed(
            self.doc_key("applications", &app.id.to_string()),
            code_key,
            app.id,
            app,
            stale,
        )
        .await
    }

    async fn get_application(&self, id: Uuid) -> StorageResult<Option<Application>> {
        self.get_json(self.doc_key("applications", &id.to_string()))
            .await
    }

    async fn get_application_by_code(&self, code: &str) -> StorageResult<Option<Application>> {
        let Some(id) = self
            .get_string(self.doc_key("application-codes", code))
            .await?
        else {
            return Ok(None);
        };
        let app: Option<Application> =
            self.get_json(self.doc_key("applications", &id)).await?;
        Ok(app.filter(|a| !a.is_deleted))
    }

    async fn mark_application_deleted(&self, id: Uuid) -> StorageResult<()> {
        let key = self.doc_key("applications", &id.to_string());
        let mut app: Application = self
            .get_json(key.clone())
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        app.is_deleted = true;
        self.put_json(key, &app).await
    }

    async fn store_module(&self, module: &Module) -> StorageResult<()> {
        let siblings: Vec<Module> = self.scan_json(self.scan_prefix("modules")).await?;
        for existing in siblings {
            if existing.id == module.id || existing.application_id != module.application_id {
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
        self.put_json(self.doc_key("modules", &module.id.to_string()), module)
            .await
    }

    async fn get_module(&self, id: Uuid) -> StorageResult<Option<Module>> {
        self.get_json(self.doc_key("modules", &id.to_string())).await
    }

    async fn list_modules(&self, application_id: Uuid) -> StorageResult<Vec<Module>> {
        let all: Vec<Module> = self.scan_json(self.scan_prefix("modules")).await?;
        Ok(all
            .into_iter()
            .filter(|module| module.application_id == application_id)
            .collect())
    }

    async fn delete_module(&self, id: Uuid) -> StorageResult<()> {
        self.remove(self.doc_key("modules", &id.to_string())).await
    }

    async fn store_module_env(&self, env: &ModuleEnv) -> StorageResult<()> {
        let index_key = self.doc_key(
            "module-env-idx",
            &format!("{}/{}", env.module_id, env.environment),
        );
        self.put_indexed(
            self.doc_key("module-envs", &env.id.to_string()),
            index_key,
            env.id,
            env,
            None,
        )
        .await
    }

    async fn list_module_envs(&self, module_id: Uuid) -> StorageResult<Vec<ModuleEnv>> {
        let all: Vec<ModuleEnv> = self.scan_json(self.scan_prefix("module-envs")).await?;
        Ok(all
            .into_iter()
            .filter(|env| env.module_id == module_id)
            .collect())
    }

    async fn delete_module_env(&self, id: Uuid) -> StorageResult<()> {
        let key = self.doc_key("module-envs", &id.to_string());
        if let Some(env) = self.get_json::<ModuleEnv>(key.clone()).await? {
            let index_key = self.doc_key(
                "module-env-idx",
                &format!("{}/{}", env.module_id, env.environment),
            );
            return self.remove_with_index(key, index_key).await;
        }
        Ok(())
    }

    async fn store_engine_app(&self, engine_app: &EngineApp) -> StorageResult<()> {
        self.put_json(
            self.doc_key("engine-apps", &engine_app.id.to_string()),
            engine_app,
        )
        .await
    }

    async fn get_engine_app(&self, id: Uuid) -> StorageResult<Option<EngineApp>> {
        self.get_json(self.doc_key("engine-apps", &id.to_string()))
            .await
    }

    async fn delete_engine_app(&self, id: Uuid) -> StorageResult<()> {
        self.remove(self.doc_key("engine-apps", &id.to_string()))
            .await
    }
}

#[async_trait]
impl RoutingStorage for EtcdStorage {
    async fn save_app_domain(&self, domain: &AppDomain) -> StorageResult<()> {
        let addr_key = self.domain_addr_key(&domain.region, &domain.host, &domain.path_prefix);
        let doc_key = self.doc_key("app-domains", &domain.id.to_string());
        let stale = match self.get_json::<AppDomain>(doc_key.clone()).await? {
            Some(old) => {
                let old_addr = self.domain_addr_key(&old.region, &old.host, &old.path_prefix);
                (old_addr != addr_key).then_some(old_addr)
            }
            None => None,
        };
        self.put_indexed(doc_key, addr_key, domain.id, domain, stale)
            .await
    }

    async fn list_app_domains(&self, filter: AppDomainFilter) -> StorageResult<Vec<AppDomain>> {
        let all: Vec<AppDomain> = self.scan_json(self.scan_prefix("app-domains")).await?;
        Ok(all
            .into_iter()
            .filter(|domain| {
                filter
                    .engine_app_id
                    .map_or(true, |id| domain.engine_app_id == id)
                    && filter.region.as_ref().map_or(true, |r| domain.region == *r)
                    && filter.source.map_or(true, |s| domain.source == s)
            })
            .collect())
    }

    async fn get_domain_by_address(
        &self,
        region: &str,
        host: &str,
        path_prefix: &str,
    ) -> StorageResult<Option<AppDomain>> {
        let Some(id) = self
            .get_string(self.domain_addr_key(region, host, path_prefix))
            .await?
        else {
            return Ok(None);
        };
        self.get_json(self.doc_key("app-domains", &id)).await
    }

    async fn delete_app_domain(&self, id: Uuid) -> StorageResult<()> {
        let doc_key = self.doc_key("app-domains", &id.to_string());
        if let Some(domain) = self.get_json::<AppDomain>(doc_key.clone()).await? {
            let addr_key =
                self.domain_addr_key(&domain.region, &domain.host, &domain.path_prefix);
            return self.remove_with_index(doc_key, addr_key).await;
        }
        Ok(())
    }

    async fn assign_app_domains(
        &self,
        engine_app_id: Uuid,
        source: AddressSource,
        domains: Vec<AppDomain>,
    ) -> StorageResult<Vec<Uuid>> {
        let all: Vec<AppDomain> = self.scan_json(self.scan_prefix("app-domains")).await?;
        let mut affected = HashSet::new();
        let mut desired_addrs = HashSet::new();

        for mut domain in domains {
            domain.engine_app_id = engine_app_id;
            domain.source = source;
            let addr = (
                domain.region.clone(),
                domain.host.clone(),
                domain.path_prefix.clone(),
            );
            desired_addrs.insert(addr);

            if let Some(old) = all.iter().find(|d| {
                d.region == domain.region
                    && d.host == domain.host
                    && d.path_prefix == domain.path_prefix
            }) {
                if old.engine_app_id != engine_app_id {
                    affected.insert(old.engine_app_id);
                }
                if old.id != domain.id {
                    self.remove(self.doc_key("app-domains", &old.id.to_string()))
                        .await?;
                }
            }
            let addr_key =
                self.domain_addr_key(&domain.region, &domain.host, &domain.path_prefix);
            let doc_key = self.doc_key("app-domains", &domain.id.to_string());
            let raw = serde_json::to_vec(&domain)?;
            let mut client = self.client.clone();
            client
                .txn(Txn::new().and_then([
                    TxnOp::put(doc_key, raw, None),
                    TxnOp::put(addr_key, domain.id.to_string(), None),
                ]))
                .await?;
        }

        for old in all.iter().filter(|d| {
            d.engine_app_id == engine_app_id
                && d.source == source
                && !desired_addrs.contains(&(
                    d.region.clone(),
                    d.host.clone(),
                    d.path_prefix.clone(),
                ))
        }) {
            self.remove_with_index(
                self.doc_key("app-domains", &old.id.to_string()),
                self.domain_addr_key(&old.region, &old.host, &old.path_prefix),
            )
            .await?;
        }

        Ok(affected.into_iter().collect())
    }

    async fn assign_subpaths(
        &self,
        engine_app_id: Uuid,
        region: &str,
        subpaths: Vec<String>,
    ) -> StorageResult<Vec<Uuid>> {
        let all: Vec<AppSubpath> = self.scan_json(self.scan_prefix("subpaths")).await?;
        let mut affected = HashSet::new();
        let desired: HashSet<&String> = subpaths.iter().collect();

        for subpath in &subpaths {
            let existing = all
                .iter()
                .find(|row| row.region == region && row.subpath == *subpath);
            let row = match existing {
                Some(row) if row.engine_app_id == engine_app_id => continue,
                Some(row) => {
                    affected.insert(row.engine_app_id);
                    AppSubpath {
                        engine_app_id,
                        ..row.clone()
                    }
                }
                None => AppSubpath {
                    id: Uuid::new_v4(),
                    engine_app_id,
                    region: region.to_string(),
                    subpath: subpath.clone(),
                },
            };
            let doc_key = self.doc_key("subpaths", &row.id.to_string());
            let addr_key = self.subpath_addr_key(region, subpath);
            let raw = serde_json::to_vec(&row)?;
            let mut client = self.client.clone();
            client
                .txn(Txn::new().and_then([
                    TxnOp::put(doc_key, raw, None),
                    TxnOp::put(addr_key, row.id.to_string(), None),
                ]))
                .await?;
        }

        for old in all.iter().filter(|row| {
            row.engine_app_id == engine_app_id
                && row.region == region
                && !desired.contains(&row.subpath)
        }) {
            self.remove_with_index(
                self.doc_key("subpaths", &old.id.to_string()),
                self.subpath_addr_key(&old.region, &old.subpath),
            )
            .await?;
        }

        Ok(affected.into_iter().collect())
    }

    async fn list_subpaths(&self, engine_app_id: Uuid) -> StorageResult<Vec<AppSubpath>> {
        let all: Vec<AppSubpath> = self.scan_json(self.scan_prefix("subpaths")).await?;
        Ok(all
            .into_iter()
            .filter(|row| row.engine_app_id == engine_app_id)
            .collect())
    }

    async fn save_custom_domain(&self, domain: &CustomDomain) -> StorageResult<()> {
        let addr_key = self.custom_addr_key(&domain.host, &domain.path_prefix);
        let doc_key = self.doc_key("custom-domains", &domain.id.to_string());
        let stale = match self.get_json::<CustomDomain>(doc_key.clone()).await? {
            Some(old) => {
                let old_addr = self.custom_addr_key(&old.host, &old.path_prefix);
                (old_addr != addr_key).then_some(old_addr)
            }
            None => None,
        };
        self.put_indexed(doc_key, addr_key, domain.id, domain, stale)
            .await
    }

    async fn get_custom_domain(&self, id: Uuid) -> StorageResult<Option<CustomDomain>> {
        self.get_json(self.doc_key("custom-domains", &id.to_string()))
            .await
    }

    async fn list_custom_domains(&self, engine_app_id: Uuid) -> StorageResult<Vec<CustomDomain>> {
        let all: Vec<CustomDomain> = self.scan_json(self.scan_prefix("custom-domains")).await?;
        Ok(all
            .into_iter()
            .filter(|domain| domain.engine_app_id == engine_app_id)
            .collect())
    }

    async fn delete_custom_domain(&self, id: Uuid) -> StorageResult<()> {
        let doc_key = self.doc_key("custom-domains", &id.to_string());
        if let Some(domain) = self.get_json::<CustomDomain>(doc_key.clone()).await? {
            let addr_key = self.custom_addr_key(&domain.host, &domain.path_prefix);
            return self.remove_with_index(doc_key, addr_key).await;
        }
        Ok(())
    }
}

#[async_trait]
impl CertStorage for EtcdStorage {
    async fn save_cert(&self, cert: &AppDomainCert) -> StorageResult<()> {
        self.put_json(self.doc_key("certs", &cert.id.to_string()), cert)
            .await
    }

    async fn get_cert(&self, id: Uuid) -> StorageResult<Option<AppDomainCert>> {
        self.get_json(self.doc_key("certs", &id.to_string())).await
    }

    async fn delete_cert(&self, id: Uuid) -> StorageResult<()> {
        self.remove(self.doc_key("certs", &id.to_string())).await
    }

    async fn save_shared_cert(&self, cert: &AppDomainSharedCert) -> StorageResult<()> {
        self.put_json(self.doc_key("shared-certs", &cert.id.to_string()), cert)
            .await
    }

    async fn get_shared_cert(&self, id: Uuid) -> StorageResult<Option<AppDomainSharedCert>> {
        self.get_json(self.doc_key("shared-certs", &id.to_string()))
            .await
    }

    async fn list_shared_certs(&self, region: &str) -> StorageResult<Vec<AppDomainSharedCert>> {
        let all: Vec<AppDomainSharedCert> =
            self.scan_json(self.scan_prefix("shared-certs")).await?;
        Ok(all.into_iter().filter(|cert| cert.region == region).collect())
    }

    async fn delete_shared_cert(&self, id: Uuid) -> StorageResult<()> {
        self.remove(self.doc_key("shared-certs", &id.to_string()))
            .await
    }
}

#[async_trait]
impl ManifestStorage for EtcdStorage {
    async fn store_revision(&self, revision: &AppModelRevision) -> StorageResult<()> {
        let key = self.doc_key("revisions", &revision.id.to_string());
        let raw = serde_json::to_vec(revision)?;
        let mut client = self.client.clone();
        let resp = client
            .txn(
                Txn::new()
                    .when([Compare::create_revision(key.clone(), CompareOp::Equal, 0)])
                    .and_then([TxnOp::put(key, raw, None)]),
            )
            .await?;
        if !resp.succeeded() {
            return Err(StorageError::AlreadyExists(revision.id.to_string()));
        }
        Ok(())
    }

    async fn get_revision(&self, id: Uuid) -> StorageResult<Option<AppModelRevision>> {
        self.get_json(self.doc_key("revisions", &id.to_string()))
            .await
    }

    async fn set_active_revision(&self, module_id: Uuid, revision_id: Uuid) -> StorageResult<()> {
        let revision: Option<AppModelRevision> = self
            .get_json(self.doc_key("revisions", &revision_id.to_string()))
            .await?;
        if revision.is_none() {
            return Err(StorageError::NotFound(revision_id.to_string()));
        }
        let key = self.doc_key("resources", &module_id.to_string());
        let resource = match self.get_json::<AppModelResource>(key.clone()).await? {
            Some(mut existing) => {
                existing.revision_id = revision_id;
                existing
            }
            None => AppModelResource {
                id: Uuid::new_v4(),
                module_id,
                revision_id,
            },
        };
        self.put_json(key, &resource).await
    }

    async fn get_resource(&self, module_id: Uuid) -> StorageResult<Option<AppModelResource>> {
        self.get_json(self.doc_key("resources", &module_id.to_string()))
            .await
    }

    async fn store_deploy(&self, deploy: &AppModelDeploy) -> StorageResult<()> {
        self.put_json(self.doc_key("deploys", &deploy.id.to_string()), deploy)
            .await
    }

    async fn get_deploy(&self, id: Uuid) -> StorageResult<Option<AppModelDeploy>> {
        self.get_json(self.doc_key("deploys", &id.to_string())).await
    }

    async fn list_deploys(
        &self,
        module_id: Uuid,
        environment: Environment,
    ) -> StorageResult<Vec<AppModelDeploy>> {
        let all: Vec<AppModelDeploy> = self.scan_json(self.scan_prefix("deploys")).await?;
        Ok(all
            .into_iter()
            .filter(|deploy| deploy.module_id == module_id && deploy.environment == environment)
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
        let key = self.doc_key("deploys", &id.to_string());
        let mut client = self.client.clone();
        let resp = client.get(key.clone(), None).await?;
        let Some(kv) = resp.kvs().first() else {
            return Err(StorageError::NotFound(id.to_string()));
        };
        let mut deploy: AppModelDeploy = serde_json::from_slice(kv.value())?;
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

        let raw = serde_json::to_vec(&deploy)?;
        let guarded = client
            .txn(
                Txn::new()
                    .when([Compare::mod_revision(
                        key.clone(),
                        CompareOp::Equal,
                        kv.mod_revision(),
                    )])
                    .and_then([TxnOp::put(key, raw, None)]),
            )
            .await?;
        if !guarded.succeeded() {
            return Err(StorageError::Conflict(format!(
                "deploy {} was updated concurrently",
                id
            )));
        }
        Ok(deploy)
    }
}

#[async_trait]
impl BuildStorage for EtcdStorage {
    async fn store_build(&self, record: &SmartBuildRecord) -> StorageResult<()> {
        self.put_json(self.doc_key("builds", &record.id.to_string()), record)
            .await
    }

    async fn get_build(&self, id: Uuid) -> StorageResult<Option<SmartBuildRecord>> {
        self.get_json(self.doc_key("builds", &id.to_string())).await
    }

    async fn list_builds(&self, module_id: Uuid) -> StorageResult<Vec<SmartBuildRecord>> {
        let all: Vec<SmartBuildRecord> = self.scan_json(self.scan_prefix("builds")).await?;
        Ok(all
            .into_iter()
            .filter(|record| record.module_id == module_id)
            .collect())
    }

    async fn request_interrupt(
        &self,
        id: Uuid,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<()> {
        let key = self.doc_key("builds", &id.to_string());
        let mut record: SmartBuildRecord = self
            .get_json(key.clone())
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.int_requested_at = Some(ts);
        self.put_json(key, &record).await
    }
}

#[async_trait]
impl AttachmentStorage for EtcdStorage {
    async fn store_module_attachment(&self, att: &ModuleAttachment) -> StorageResult<()> {
        let index_key = self.doc_key(
            "module-attachment-idx",
            &format!("{}/{}", att.module_id, att.service_id),
        );
        self.put_indexed(
            self.doc_key("module-attachments", &att.id.to_string()),
            index_key,
            att.id,
            att,
            None,
        )
        .await
    }

    async fn get_module_attachment(
        &self,
        module_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<ModuleAttachment>> {
        let index_key = self.doc_key(
            "module-attachment-idx",
            &format!("{}/{}", module_id, service_id),
        );
        let Some(id) = self.get_string(index_key).await? else {
            return Ok(None);
        };
        self.get_json(self.doc_key("module-attachments", &id)).await
    }

    async fn list_module_attachments(
        &self,
        module_id: Uuid,
    ) -> StorageResult<Vec<ModuleAttachment>> {
        let all: Vec<ModuleAttachment> =
            self.scan_json(self.scan_prefix("module-attachments")).await?;
        Ok(all
            .into_iter()
            .filter(|att| att.module_id == module_id)
            .collect())
    }

    async fn delete_module_attachment(&self, id: Uuid) -> StorageResult<()> {
        let doc_key = self.doc_key("module-attachments", &id.to_string());
        if let Some(att) = self.get_json::<ModuleAttachment>(doc_key.clone()).await? {
            let index_key = self.doc_key(
                "module-attachment-idx",
                &format!("{}/{}", att.module_id, att.service_id),
            );
            return self.remove_with_index(doc_key, index_key).await;
        }
        Ok(())
    }

    async fn store_engine_app_attachment(&self, att: &EngineAppAttachment) -> StorageResult<()> {
        let index_key = self.doc_key(
            "engine-app-attachment-idx",
            &format!("{}/{}", att.engine_app_id, att.service_id),
        );
        self.put_indexed(
            self.doc_key("engine-app-attachments", &att.id.to_string()),
            index_key,
            att.id,
            att,
            None,
        )
        .await
    }

    async fn get_engine_app_attachment(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<EngineAppAttachment>> {
        let index_key = self.doc_key(
            "engine-app-attachment-idx",
            &format!("{}/{}", engine_app_id, service_id),
        );
        let Some(id) = self.get_string(index_key).await? else {
            return Ok(None);
        };
        self.get_json(self.doc_key("engine-app-attachments", &id))
            .await
    }

    async fn list_engine_app_attachments(
        &self,
        filter: AttachmentFilter,
    ) -> StorageResult<Vec<EngineAppAttachment>> {
        let all: Vec<EngineAppAttachment> = self
            .scan_json(self.scan_prefix("engine-app-attachments"))
            .await?;
        Ok(all
            .into_iter()
            .filter(|att| {
                filter
                    .engine_app_id
                    .map_or(true, |id| att.engine_app_id == id)
                    && filter
                        .service_id
                        .as_ref()
                        .map_or(true, |s| att.service_id == *s)
                    && (!filter.unprovisioned_only || !att.is_provisioned())
            })
            .collect())
    }

    async fn delete_engine_app_attachment(&self, id: Uuid) -> StorageResult<()> {
        let doc_key = self.doc_key("engine-app-attachments", &id.to_string());
        if let Some(att) = self
            .get_json::<EngineAppAttachment>(doc_key.clone())
            .await?
        {
            let index_key = self.doc_key(
                "engine-app-attachment-idx",
                &format!("{}/{}", att.engine_app_id, att.service_id),
            );
            return self.remove_with_index(doc_key, index_key).await;
        }
        Ok(())
    }

    async fn store_unbound_attachment(
        &self,
        att: &UnboundEngineAppAttachment,
    ) -> StorageResult<()> {
        let index_key = self.doc_key(
            "unbound-attachment-idx",
            &format!("{}/{}", att.engine_app_id, att.service_id),
        );
        self.put_indexed(
            self.doc_key("unbound-attachments", &att.id.to_string()),
            index_key,
            att.id,
            att,
            None,
        )
        .await
    }

    async fn get_unbound_attachment(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<UnboundEngineAppAttachment>> {
        let index_key = self.doc_key(
            "unbound-attachment-idx",
            &format!("{}/{}", engine_app_id, service_id),
        );
        let Some(id) = self.get_string(index_key).await? else {
            return Ok(None);
        };
        self.get_json(self.doc_key("unbound-attachments", &id)).await
    }

    async fn list_unbound_attachments(&self) -> StorageResult<Vec<UnboundEngineAppAttachment>> {
        self.scan_json(self.scan_prefix("unbound-attachments")).await
    }

    async fn delete_unbound_attachment(&self, id: Uuid) -> StorageResult<()> {
        let doc_key = self.doc_key("unbound-attachments", &id.to_string());
        if let Some(att) = self
            .get_json::<UnboundEngineAppAttachment>(doc_key.clone())
            .await?
        {
            let index_key = self.doc_key(
                "unbound-attachment-idx",
                &format!("{}/{}", att.engine_app_id, att.service_id),
            );
            return self.remove_with_index(doc_key, index_key).await;
        }
        Ok(())
    }

    async fn store_shared_attachment(&self, att: &SharedAttachment) -> StorageResult<()> {
        let index_key = self.doc_key(
            "shared-attachment-idx",
            &format!("{}/{}", att.module_id, att.service_id),
        );
        self.put_indexed(
            self.doc_key("shared-attachments", &att.id.to_string()),
            index_key,
            att.id,
            att,
            None,
        )
        .await
    }

    async fn list_shared_attachments(
        &self,
        filter: SharedAttachmentFilter,
    ) -> StorageResult<Vec<SharedAttachment>> {
        let all: Vec<SharedAttachment> =
            self.scan_json(self.scan_prefix("shared-attachments")).await?;
        Ok(all
            .into_iter()
            .filter(|att| {
                filter.module_id.map_or(true, |id| att.module_id == id)
                    && filter
                        .ref_module_id
                        .map_or(true, |id| att.ref_module_id == id)
                    && filter
                        .service_id
                        .as_ref()
                        .map_or(true, |s| att.service_id == *s)
            })
            .collect())
    }

    async fn delete_shared_attachment(&self, id: Uuid) -> StorageResult<()> {
        let doc_key = self.doc_key("shared-attachments", &id.to_string());
        if let Some(att) = self.get_json::<SharedAttachment>(doc_key.clone()).await? {
            let index_key = self.doc_key(
                "shared-attachment-idx",
                &format!("{}/{}", att.module_id, att.service_id),
            );
            return self.remove_with_index(doc_key, index_key).await;
        }
        Ok(())
    }
}
