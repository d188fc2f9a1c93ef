use std::sync::Arc;

use async_trait::async_trait;
use gantry_addons::AddonBinder;
use gantry_ingress::{IngressKind, IngressResult, IngressService};
use gantry_models::{EngineApp, ModuleEnv};
use gantry_storage::{
    AppDomainFilter, ApplicationStorage, AttachmentStorage, RoutingStorage,
    SharedAttachmentFilter,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{DeliveryError, DeliveryResult};

/// Cluster-facing side of a teardown. Satisfied by [`IngressService`];
/// tests substitute a recorder.
#[async_trait]
pub trait IngressRemover: Send + Sync {
    async fn remove(&self, engine_app: &EngineApp, kind: &IngressKind) -> IngressResult<()>;
}

#[async_trait]
impl IngressRemover for IngressService {
    async fn remove(&self, engine_app: &EngineApp, kind: &IngressKind) -> IngressResult<()> {
        self.delete(engine_app, kind).await
    }
}

/// Removes everything a module owns, cluster objects before stored
/// rows: a host must stop resolving before the row that claims it
/// disappears, and an add-on instance must reach the provider's
/// recycle queue before the attachment row goes.
pub struct ModuleTeardown {
    apps: Arc<dyn ApplicationStorage>,
    routing: Arc<dyn RoutingStorage>,
    attachments: Arc<dyn AttachmentStorage>,
    ingress: Arc<dyn IngressRemover>,
    binder: Arc<AddonBinder>,
}

impl ModuleTeardown {
    pub fn new(
        apps: Arc<dyn ApplicationStorage>,
        routing: Arc<dyn RoutingStorage>,
        attachments: Arc<dyn AttachmentStorage>,
        ingress: Arc<dyn IngressRemover>,
        binder: Arc<AddonBinder>,
    ) -> Self {
        Self {
            apps,
            routing,
            attachments,
            ingress,
            binder,
        }
    }

    /// Destroys the module and all of its environments. Refused while
    /// another module still references one of its service bindings.
    #[tracing::instrument(skip(self))]
    pub async fn destroy_module(&self, module_id: Uuid) -> DeliveryResult<()> {
        let references = self.binder.references_to(module_id).await?;
        if !references.is_empty() {
            let mut holders: Vec<String> = references
                .iter()
                .map(|row| row.module_id.to_string())
                .collect();
            holders.sort();
            holders.dedup();
            return Err(DeliveryError::Conflict(format!(
                "module {module_id} is still referenced by module(s) {}",
                holders.join(", ")
            )));
        }

        for env in self.apps.list_module_envs(module_id).await? {
            self.destroy_environment(&env).await?;
        }

        // Module-level rows: plan choices and this module's own shares
        // die with it.
        for attachment in self.attachments.list_module_attachments(module_id).await? {
            self.attachments
                .delete_module_attachment(attachment.id)
                .await?;
        }
        let own_shares = self
            .attachments
            .list_shared_attachments(SharedAttachmentFilter {
                module_id: Some(module_id),
                ..Default::default()
            })
            .await?;
        for share in own_shares {
            self.attachments.delete_shared_attachment(share.id).await?;
        }

        self.apps.delete_module(module_id).await?;
        info!(module = %module_id, "module torn down");
        Ok(())
    }

    /// Destroys every module of the application, then soft-deletes the
    /// application row so its code stays reserved.
    pub async fn destroy_application(&self, application_id: Uuid) -> DeliveryResult<()> {
        for module in self.apps.list_modules(application_id).await? {
            self.destroy_module(module.id).await?;
        }
        self.apps.mark_application_deleted(application_id).await?;
        info!(application = %application_id, "application torn down");
        Ok(())
    }

    /// One environment, in order: custom-domain ingresses, default
    /// ingresses, address rows, add-on instances, engine app row.
    async fn destroy_environment(&self, env: &ModuleEnv) -> DeliveryResult<()> {
        let Some(engine_app) = self.apps.get_engine_app(env.engine_app_id).await? else {
            self.apps.delete_module_env(env.id).await?;
            return Ok(());
        };

        for domain in self.routing.list_custom_domains(engine_app.id).await? {
            self.ingress
                .remove(
                    &engine_app,
                    &IngressKind::Custom {
                        domain_id: domain.id,
                    },
                )
                .await?;
            self.routing.delete_custom_domain(domain.id).await?;
        }

        self.ingress
            .remove(&engine_app, &IngressKind::Subdomain)
            .await?;
        self.ingress
            .remove(&engine_app, &IngressKind::Subpath)
            .await?;
        self.ingress
            .remove(&engine_app, &IngressKind::Legacy)
            .await?;

        for row in self
            .routing
            .list_app_domains(AppDomainFilter {
                engine_app_id: Some(engine_app.id),
                ..Default::default()
            })
            .await?
        {
            self.routing.delete_app_domain(row.id).await?;
        }
        self.routing
            .assign_subpaths(engine_app.id, &engine_app.region, Vec::new())
            .await?;

        let recycled = self.binder.recycle_engine_app(engine_app.id).await?;
        if recycled > 0 {
            info!(
                engine_app = %engine_app.name,
                count = recycled,
                "recycling queued for bound add-on instances"
            );
        }

        self.apps.delete_engine_app(engine_app.id).await?;
        self.apps.delete_module_env(env.id).await?;
        Ok(())
    }
}
