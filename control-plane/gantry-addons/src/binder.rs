use std::sync::Arc;

use chrono::Utc;
use gantry_models::{
    Application, EngineAppAttachment, Module, ModuleAttachment, ModuleEnv, SharedAttachment,
    UnboundEngineAppAttachment,
};
use gantry_storage::{AttachmentFilter, AttachmentStorage, SharedAttachmentFilter};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AddonError, AddonResult};
use crate::plans::{select_plan, PlanSelector};
use crate::provider::{ProvisionContext, RecycleOutcome, RemotePlan, RemoteProviderClient};

/// Maintains module-to-service and engine-app-to-instance relations and
/// drives the remote provider for the instance lifecycle.
pub struct AddonBinder {
    storage: Arc<dyn AttachmentStorage>,
    provider: Arc<RemoteProviderClient>,
}

impl AddonBinder {
    pub fn new(storage: Arc<dyn AttachmentStorage>, provider: Arc<RemoteProviderClient>) -> Self {
        Self { storage, provider }
    }

    /// Enables `service_id` for the module: one attachment per environment
    /// with the selected plan. All checks run before the first write, so a
    /// refused bind changes nothing.
    pub async fn bind(
        &self,
        application: &Application,
        module: &Module,
        envs: &[ModuleEnv],
        service_id: &str,
        selector: &PlanSelector,
    ) -> AddonResult<ModuleAttachment> {
        let spec = self.provider.service_spec(service_id).await?;

        let mut rows = Vec::with_capacity(envs.len());
        for env in envs {
            if self
                .storage
                .get_unbound_attachment(env.engine_app_id, service_id)
                .await?
                .is_some()
            {
                return Err(AddonError::Conflict(format!(
                    "service {service_id} is still being recycled for {}",
                    env.environment
                )));
            }

            let plan_id = select_plan(selector, env.environment, &spec)?;
            match self
                .storage
                .get_engine_app_attachment(env.engine_app_id, service_id)
                .await?
            {
                Some(existing) if existing.is_provisioned() => {
                    if existing.plan_id != plan_id {
                        return Err(AddonError::Conflict(format!(
                            "attachment {} is provisioned, plan change refused",
                            existing.id
                        )));
                    }
                }
                Some(mut existing) => {
                    existing.plan_id = plan_id;
                    rows.push(existing);
                }
                None => rows.push(EngineAppAttachment {
                    id: Uuid::new_v4(),
                    engine_app_id: env.engine_app_id,
                    service_id: service_id.to_string(),
                    plan_id,
                    service_instance_id: None,
                }),
            }
        }

        for row in &rows {
            self.storage.store_engine_app_attachment(row).await?;
        }

        let attachment = match self
            .storage
            .get_module_attachment(module.id, service_id)
            .await?
        {
            Some(existing) => existing,
            None => {
                let created = ModuleAttachment {
                    id: Uuid::new_v4(),
                    module_id: module.id,
                    service_id: service_id.to_string(),
                    tenant_id: application.tenant_id.clone(),
                };
                self.storage.store_module_attachment(&created).await?;
                created
            }
        };
        info!(module = %module.name, service_id, "add-on bound");
        Ok(attachment)
    }

    /// Provisions every unprovisioned attachment of the engine app, or only
    /// those of one service. Provisioned rows are untouched, so retries are
    /// idempotent.
    pub async fn provision(
        &self,
        engine_app_id: Uuid,
        service_id: Option<&str>,
        context: &ProvisionContext,
    ) -> AddonResult<usize> {
        let pending = self
            .storage
            .list_engine_app_attachments(AttachmentFilter {
                engine_app_id: Some(engine_app_id),
                service_id: service_id.map(str::to_string),
                unprovisioned_only: true,
            })
            .await?;

        let mut provisioned = 0usize;
        for mut attachment in pending {
            let spec = self.provider.service_spec(&attachment.service_id).await?;
            let params = context.render(&spec.parameter_template);
            let instance = self
                .provider
                .provision(&attachment.service_id, &attachment.plan_id, &params)
                .await?;
            attachment.service_instance_id = Some(instance.uuid.clone());
            self.storage.store_engine_app_attachment(&attachment).await?;
            provisioned += 1;
            info!(
                service = %attachment.service_id,
                instance = %instance.uuid,
                "instance provisioned"
            );

            if spec.features().supports_instance_config_sync() {
                if let Err(error) = self
                    .provider
                    .update_instance_config(
                        &attachment.service_id,
                        &instance.uuid,
                        &context.identity(),
                    )
                    .await
                {
                    warn!(%error, instance = %instance.uuid, "instance config sync failed");
                }
            }
        }
        Ok(provisioned)
    }

    /// Tears the module's binding down. Refused while another module still
    /// references it.
    pub async fn unbind(
        &self,
        module_id: Uuid,
        envs: &[ModuleEnv],
        service_id: &str,
    ) -> AddonResult<()> {
        let references = self
            .storage
            .list_shared_attachments(SharedAttachmentFilter {
                ref_module_id: Some(module_id),
                service_id: Some(service_id.to_string()),
                ..Default::default()
            })
            .await?;
        if !references.is_empty() {
            return Err(AddonError::Conflict(format!(
                "service {service_id} is referenced by {} module(s)",
                references.len()
            )));
        }

        for env in envs {
            if let Some(attachment) = self
                .storage
                .get_engine_app_attachment(env.engine_app_id, service_id)
                .await?
            {
                self.recycle(&attachment).await?;
            }
        }

        if let Some(module_attachment) = self
            .storage
            .get_module_attachment(module_id, service_id)
            .await?
        {
            self.storage
                .delete_module_attachment(module_attachment.id)
                .await?;
        }
        info!(%module_id, service_id, "add-on unbound");
        Ok(())
    }

    /// Recycles one attachment: asks the provider to delete the instance,
    /// parks asynchronous recycles in the unbound table, then drops the row.
    pub async fn recycle(&self, attachment: &EngineAppAttachment) -> AddonResult<()> {
        if let Some(instance_id) = &attachment.service_instance_id {
            match self
                .provider
                .delete_instance(&attachment.service_id, instance_id)
                .await?
            {
                RecycleOutcome::Completed => {
                    info!(instance = %instance_id, "instance recycled");
                }
                RecycleOutcome::Pending => {
                    self.storage
                        .store_unbound_attachment(&UnboundEngineAppAttachment {
                            id: Uuid::new_v4(),
                            engine_app_id: attachment.engine_app_id,
                            service_id: attachment.service_id.clone(),
                            service_instance_id: instance_id.clone(),
                            created_at: Utc::now(),
                        })
                        .await?;
                    info!(instance = %instance_id, "instance recycling asynchronously");
                }
            }
        }
        self.storage
            .delete_engine_app_attachment(attachment.id)
            .await?;
        Ok(())
    }

    /// Recycles everything attached to one engine app. Module teardown
    /// calls this per environment.
    pub async fn recycle_engine_app(&self, engine_app_id: Uuid) -> AddonResult<usize> {
        let attachments = self
            .storage
            .list_engine_app_attachments(AttachmentFilter {
                engine_app_id: Some(engine_app_id),
                ..Default::default()
            })
            .await?;
        for attachment in &attachments {
            self.recycle(attachment).await?;
        }
        Ok(attachments.len())
    }

    /// Declares that `module_id` reuses `ref_module_id`'s binding.
    pub async fn share(
        &self,
        module_id: Uuid,
        ref_module_id: Uuid,
        service_id: &str,
    ) -> AddonResult<SharedAttachment> {
        if module_id == ref_module_id {
            return Err(AddonError::Validation(
                "a module cannot reference its own binding".to_string(),
            ));
        }
        if self
            .storage
            .get_module_attachment(ref_module_id, service_id)
            .await?
            .is_none()
        {
            return Err(AddonError::Validation(format!(
                "module {ref_module_id} has no binding for {service_id}"
            )));
        }
        // No transitive sharing: the source must own the binding itself.
        let source_shares = self
            .storage
            .list_shared_attachments(SharedAttachmentFilter {
                module_id: Some(ref_module_id),
                service_id: Some(service_id.to_string()),
                ..Default::default()
            })
            .await?;
        if !source_shares.is_empty() {
            return Err(AddonError::Validation(format!(
                "module {ref_module_id} itself references {service_id}, sharing is not transitive"
            )));
        }

        let shared = SharedAttachment {
            id: Uuid::new_v4(),
            module_id,
            ref_module_id,
            service_id: service_id.to_string(),
        };
        self.storage.store_shared_attachment(&shared).await?;
        Ok(shared)
    }

    pub async fn unshare(&self, module_id: Uuid, service_id: &str) -> AddonResult<()> {
        let rows = self
            .storage
            .list_shared_attachments(SharedAttachmentFilter {
                module_id: Some(module_id),
                service_id: Some(service_id.to_string()),
                ..Default::default()
            })
            .await?;
        for row in rows {
            self.storage.delete_shared_attachment(row.id).await?;
        }
        Ok(())
    }

    /// Shared rows pointing at this module's bindings; teardown is refused
    /// while any exist.
    pub async fn references_to(&self, module_id: Uuid) -> AddonResult<Vec<SharedAttachment>> {
        Ok(self
            .storage
            .list_shared_attachments(SharedAttachmentFilter {
                ref_module_id: Some(module_id),
                ..Default::default()
            })
            .await?)
    }

    /// The plan currently bound for `(engine_app, service)`, resolved
    /// against the provider's catalogue.
    pub async fn bound_plan(
        &self,
        engine_app_id: Uuid,
        service_id: &str,
    ) -> AddonResult<RemotePlan> {
        let attachment = self
            .storage
            .get_engine_app_attachment(engine_app_id, service_id)
            .await?
            .ok_or_else(|| AddonError::NotFound(format!("attachment for service {service_id}")))?;
        let spec = self.provider.service_spec(service_id).await?;
        spec.plans
            .into_iter()
            .find(|plan| plan.uuid == attachment.plan_id)
            .ok_or_else(|| AddonError::NotFound(format!("plan {}", attachment.plan_id)))
    }

    /// Pushes a plan definition to the provider, if its version allows.
    pub async fn upsert_plan(&self, service_id: &str, plan: &RemotePlan) -> AddonResult<()> {
        let spec = self.provider.service_spec(service_id).await?;
        if !spec.features().supports_plan_upsert() {
            let version = if spec.version.is_empty() {
                "unknown"
            } else {
                spec.version.as_str()
            };
            return Err(AddonError::Validation(format!(
                "service {} (version {version}) does not accept plan upserts",
                spec.name
            )));
        }
        self.provider.upsert_plan(service_id, plan).await
    }

    /// Service names enabled for the module, shared bindings included.
    /// Feeds the add-on annotation of assembled manifests.
    pub async fn service_names(&self, module_id: Uuid) -> AddonResult<Vec<String>> {
        let mut names: Vec<String> = self
            .storage
            .list_module_attachments(module_id)
            .await?
            .into_iter()
            .map(|attachment| attachment.service_id)
            .collect();
        let shared = self
            .storage
            .list_shared_attachments(SharedAttachmentFilter {
                module_id: Some(module_id),
                ..Default::default()
            })
            .await?;
        names.extend(shared.into_iter().map(|row| row.service_id));
        names.sort();
        names.dedup();
        Ok(names)
    }
}
