use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_models::{
    AddressSource, AppDomain, AppDomainCert, AppDomainSharedCert, AppModelDeploy,
    AppModelResource, AppModelRevision, AppSubpath, Application, CustomDomain, DeployStatus,
    EngineApp, EngineAppAttachment, Environment, Module, ModuleAttachment, ModuleEnv,
    SharedAttachment, SmartBuildRecord, UnboundEngineAppAttachment,
};
use uuid::Uuid;

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait StorageHealth: Send + Sync {
    /// Lightweight connectivity check to the backing store.
    async fn health(&self) -> StorageResult<()>;
}

#[async_trait]
pub trait ApplicationStorage: Send + Sync + StorageHealth {
    /// Upserts by ID. App codes stay unique across live and soft-deleted
    /// rows alike.
    async fn store_application(&self, app: &Application) -> StorageResult<()>;
    async fn get_application(&self, id: Uuid) -> StorageResult<Option<Application>>;
    /// Soft-deleted rows are invisible to code lookups.
    async fn get_application_by_code(&self, code: &str) -> StorageResult<Option<Application>>;
    async fn mark_application_deleted(&self, id: Uuid) -> StorageResult<()>;

    /// Upserts by ID. Module names are unique within their application and
    /// at most one module per application carries the default flag.
    async fn store_module(&self, module: &Module) -> StorageResult<()>;
    async fn get_module(&self, id: Uuid) -> StorageResult<Option<Module>>;
    async fn list_modules(&self, application_id: Uuid) -> StorageResult<Vec<Module>>;
    async fn delete_module(&self, id: Uuid) -> StorageResult<()>;

    /// Upserts by ID with `(module, environment)` unique.
    async fn store_module_env(&self, env: &ModuleEnv) -> StorageResult<()>;
    async fn list_module_envs(&self, module_id: Uuid) -> StorageResult<Vec<ModuleEnv>>;
    async fn delete_module_env(&self, id: Uuid) -> StorageResult<()>;

    async fn store_engine_app(&self, engine_app: &EngineApp) -> StorageResult<()>;
    async fn get_engine_app(&self, id: Uuid) -> StorageResult<Option<EngineApp>>;
    async fn delete_engine_app(&self, id: Uuid) -> StorageResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct AppDomainFilter {
    pub engine_app_id: Option<Uuid>,
    pub region: Option<String>,
    pub source: Option<AddressSource>,
}

#[async_trait]
pub trait RoutingStorage: Send + Sync + StorageHealth {
    /// Upserts one domain row. `(region, host, path_prefix)` owned by a
    /// different row is an `AlreadyExists` error.
    async fn save_app_domain(&self, domain: &AppDomain) -> StorageResult<()>;
    async fn list_app_domains(&self, filter: AppDomainFilter) -> StorageResult<Vec<AppDomain>>;
    async fn get_domain_by_address(
        &self,
        region: &str,
        host: &str,
        path_prefix: &str,
    ) -> StorageResult<Option<AppDomain>>;
    async fn delete_app_domain(&self, id: Uuid) -> StorageResult<()>;

    /// Replaces the `(engine_app, source)` domain set. Addresses held by
    /// other engine apps move here; returns the previous owners so their
    /// ingresses can be re-synced.
    async fn assign_app_domains(
        &self,
        engine_app_id: Uuid,
        source: AddressSource,
        domains: Vec<AppDomain>,
    ) -> StorageResult<Vec<Uuid>>;

    /// Replaces the engine app's subpath set under `(region, subpath)`
    /// uniqueness. Returns the engine apps that lost a subpath.
    async fn assign_subpaths(
        &self,
        engine_app_id: Uuid,
        region: &str,
        subpaths: Vec<String>,
    ) -> StorageResult<Vec<Uuid>>;
    async fn list_subpaths(&self, engine_app_id: Uuid) -> StorageResult<Vec<AppSubpath>>;

    /// Upserts by ID; `(host, path_prefix)` unique among custom domains.
    async fn save_custom_domain(&self, domain: &CustomDomain) -> StorageResult<()>;
    async fn get_custom_domain(&self, id: Uuid) -> StorageResult<Option<CustomDomain>>;
    async fn list_custom_domains(&self, engine_app_id: Uuid) -> StorageResult<Vec<CustomDomain>>;
    async fn delete_custom_domain(&self, id: Uuid) -> StorageResult<()>;
}

#[async_trait]
pub trait CertStorage: Send + Sync + StorageHealth {
    async fn save_cert(&self, cert: &AppDomainCert) -> StorageResult<()>;
    async fn get_cert(&self, id: Uuid) -> StorageResult<Option<AppDomainCert>>;
    async fn delete_cert(&self, id: Uuid) -> StorageResult<()>;

    async fn save_shared_cert(&self, cert: &AppDomainSharedCert) -> StorageResult<()>;
    async fn get_shared_cert(&self, id: Uuid) -> StorageResult<Option<AppDomainSharedCert>>;
    async fn list_shared_certs(&self, region: &str) -> StorageResult<Vec<AppDomainSharedCert>>;
    async fn delete_shared_cert(&self, id: Uuid) -> StorageResult<()>;
}

#[async_trait]
pub trait ManifestStorage: Send + Sync + StorageHealth {
    /// Revisions are append-only; re-storing an existing ID is an error.
    async fn store_revision(&self, revision: &AppModelRevision) -> StorageResult<()>;
    async fn get_revision(&self, id: Uuid) -> StorageResult<Option<AppModelRevision>>;
    async fn set_active_revision(&self, module_id: Uuid, revision_id: Uuid) -> StorageResult<()>;
    async fn get_resource(&self, module_id: Uuid) -> StorageResult<Option<AppModelResource>>;

    async fn store_deploy(&self, deploy: &AppModelDeploy) -> StorageResult<()>;
    async fn get_deploy(&self, id: Uuid) -> StorageResult<Option<AppModelDeploy>>;
    async fn list_deploys(
        &self,
        module_id: Uuid,
        environment: Environment,
    ) -> StorageResult<Vec<AppModelDeploy>>;

    /// Status writes refresh `last_transition_time`, either to
    /// `transition_time` (the cluster-reported instant) or to now. A
    /// terminal row never moves back to an in-flight status; such a
    /// write is a `Conflict`.
    async fn update_deploy_status(
        &self,
        id: Uuid,
        status: DeployStatus,
        reason: &str,
        message: &str,
        transition_time: Option<DateTime<Utc>>,
    ) -> StorageResult<AppModelDeploy>;
}

#[async_trait]
pub trait BuildStorage: Send + Sync + StorageHealth {
    async fn store_build(&self, record: &SmartBuildRecord) -> StorageResult<()>;
    async fn get_build(&self, id: Uuid) -> StorageResult<Option<SmartBuildRecord>>;
    async fn list_builds(&self, module_id: Uuid) -> StorageResult<Vec<SmartBuildRecord>>;
    /// Marks the record as interruption-requested without touching the
    /// fields the running task owns.
    async fn request_interrupt(
        &self,
        id: Uuid,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentFilter {
    pub engine_app_id: Option<Uuid>,
    pub service_id: Option<String>,
    pub unprovisioned_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SharedAttachmentFilter {
    pub module_id: Option<Uuid>,
    pub ref_module_id: Option<Uuid>,
    pub service_id: Option<String>,
}

#[async_trait]
pub trait AttachmentStorage: Send + Sync + StorageHealth {
    /// Upserts by ID with `(module, service)` unique.
    async fn store_module_attachment(&self, att: &ModuleAttachment) -> StorageResult<()>;
    async fn get_module_attachment(
        &self,
        module_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<ModuleAttachment>>;
    async fn list_module_attachments(&self, module_id: Uuid)
        -> StorageResult<Vec<ModuleAttachment>>;
    async fn delete_module_attachment(&self, id: Uuid) -> StorageResult<()>;

    /// Upserts by ID with `(engine_app, service)` unique.
    async fn store_engine_app_attachment(&self, att: &EngineAppAttachment) -> StorageResult<()>;
    async fn get_engine_app_attachment(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<EngineAppAttachment>>;
    async fn list_engine_app_attachments(
        &self,
        filter: AttachmentFilter,
    ) -> StorageResult<Vec<EngineAppAttachment>>;
    async fn delete_engine_app_attachment(&self, id: Uuid) -> StorageResult<()>;

    async fn store_unbound_attachment(
        &self,
        att: &UnboundEngineAppAttachment,
    ) -> StorageResult<()>;
    async fn get_unbound_attachment(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> StorageResult<Option<UnboundEngineAppAttachment>>;
    async fn list_unbound_attachments(&self) -> StorageResult<Vec<UnboundEngineAppAttachment>>;
    async fn delete_unbound_attachment(&self, id: Uuid) -> StorageResult<()>;

    /// Upserts by ID with `(module, service)` unique.
    async fn store_shared_attachment(&self, att: &SharedAttachment) -> StorageResult<()>;
    async fn list_shared_attachments(
        &self,
        filter: SharedAttachmentFilter,
    ) -> StorageResult<Vec<SharedAttachment>>;
    async fn delete_shared_attachment(&self, id: Uuid) -> StorageResult<()>;
}
