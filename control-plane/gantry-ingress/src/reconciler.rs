use std::collections::BTreeMap;
use std::sync::Arc;

use gantry_kube::{ClusterClient, ClusterConfig, ClusterRegistry};
use gantry_models::{AddressSource, AppDomain, CustomDomain, EngineApp};
use gantry_storage::{ApplicationStorage, CertStorage, RoutingStorage};
use k8s_openapi::api::networking::v1::{
    Ingress, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::api::{ApiResource, GroupVersionKind, ObjectMeta};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adaptor::adaptor_for;
use crate::certs::CertResolver;
use crate::domains::{materialise_tls_secrets, shortest_path, DesiredDomain, DomainPlanner};
use crate::error::{IngressError, IngressResult};
use crate::plugins::{join_snippets, IngressPlugin};
use crate::synth::{
    compose_snippet, strip_managed_snippet, PlatformIngress, ANNOTATION_CONFIGURATION_SNIPPET,
};

/// New ingresses point at this port of the backend service; updates keep
/// whatever the live object already uses.
const DEFAULT_SERVICE_PORT_NAME: &str = "http";

fn legacy_ingress_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("extensions", "v1beta1", "Ingress"))
}

/// The platform-managed ingresses of one engine app: three fixed kinds
/// plus one per user-registered domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressKind {
    /// Pre-subdomain object kept under the bare engine app name.
    Legacy,
    Subdomain,
    Subpath,
    Custom { domain_id: Uuid },
}

impl IngressKind {
    /// Object names are deterministic so a re-sync always lands on the
    /// same cluster object.
    pub fn object_name(&self, engine_app_name: &str) -> String {
        match self {
            IngressKind::Legacy => engine_app_name.to_string(),
            IngressKind::Subdomain => format!("{engine_app_name}-subdomain"),
            IngressKind::Subpath => format!("{engine_app_name}-subpath"),
            IngressKind::Custom { domain_id } => format!("custom-{engine_app_name}-{domain_id}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Backend service for a newly created ingress. Ignored when the
    /// object already exists.
    pub default_service_name: Option<String>,
    /// Delete the object instead of failing when the desired domain set
    /// is empty.
    pub delete_when_empty: bool,
}

/// Backend and caller-owned annotation content recovered from the live
/// object before a sync overwrites it.
struct ExistingIngress {
    service_name: String,
    service_port_name: String,
    caller_snippet: String,
}

/// Computes desired domains and drives them into cluster ingress
/// objects. One instance serves every cluster in the registry.
pub struct IngressService {
    routing: Arc<dyn RoutingStorage>,
    planner: DomainPlanner,
    clusters: Arc<ClusterRegistry>,
    plugins: Vec<Arc<dyn IngressPlugin>>,
}

impl IngressService {
    pub fn new(
        routing: Arc<dyn RoutingStorage>,
        certs: Arc<dyn CertStorage>,
        clusters: Arc<ClusterRegistry>,
        plugins: Vec<Arc<dyn IngressPlugin>>,
    ) -> Self {
        let planner = DomainPlanner::new(routing.clone(), CertResolver::new(certs));
        Self {
            routing,
            planner,
            clusters,
            plugins,
        }
    }

    /// Brings one ingress in line with the stored addresses. An empty
    /// desired set either deletes the object or fails, depending on
    /// `options.delete_when_empty`.
    pub async fn sync(
        &self,
        engine_app: &EngineApp,
        kind: &IngressKind,
        options: &SyncOptions,
    ) -> IngressResult<()> {
        let cluster = self.clusters.get(&engine_app.cluster_name)?;
        let config = cluster.config();
        let name = kind.object_name(&engine_app.name);

        let mut desired = self.desired_domains(engine_app, kind, config).await?;
        if desired.is_empty() {
            if options.delete_when_empty {
                info!(ingress = %name, "desired domain set is empty, deleting");
                return self.delete(engine_app, kind).await;
            }
            return Err(IngressError::EmptyIngress);
        }

        materialise_tls_secrets(cluster, &engine_app.namespace, &mut desired).await;

        let existing = self
            .read_existing(cluster, config, &engine_app.namespace, &name)
            .await?;
        let caller_snippet = existing
            .as_ref()
            .map(|e| e.caller_snippet.clone())
            .unwrap_or_default();
        let (service_name, service_port_name) = match &existing {
            Some(e) => (e.service_name.clone(), e.service_port_name.clone()),
            None => (
                options
                    .default_service_name
                    .clone()
                    .ok_or(IngressError::MissingServiceName)?,
                DEFAULT_SERVICE_PORT_NAME.to_string(),
            ),
        };

        let adaptor = adaptor_for(config);
        let server_snippet = join_snippets(
            self.plugins
                .iter()
                .map(|p| p.render_server_snippet(engine_app, &desired))
                .collect(),
        );
        let mut platform = PlatformIngress {
            name: name.clone(),
            namespace: engine_app.namespace.clone(),
            service_name,
            service_port_name,
            domains: desired,
            server_snippet,
            configuration_snippet: String::new(),
            extra_annotations: self.extra_annotations(config),
            labels: self.labels(engine_app),
        };

        let mut parts = Vec::new();
        if platform.needs_rewrite() {
            parts.push(adaptor.make_configuration_snippet(&shortest_path(&platform.domains)));
        }
        for plugin in &self.plugins {
            parts.push(plugin.render_configuration_snippet(engine_app, &platform.domains));
        }
        platform.configuration_snippet = compose_snippet(&caller_snippet, &join_snippets(parts));

        if config.legacy_ingress_api {
            cluster
                .apply_dynamic(
                    &legacy_ingress_resource(),
                    &engine_app.namespace,
                    &name,
                    &platform.build_legacy(adaptor.as_ref()),
                )
                .await?;
        } else {
            cluster
                .apply(
                    &engine_app.namespace,
                    &name,
                    &platform.build_v1(adaptor.as_ref()),
                )
                .await?;
        }
        info!(
            ingress = %name,
            hosts = platform.domains.len(),
            "ingress synced"
        );
        Ok(())
    }

    /// Syncs the three default ingresses and every custom domain of the
    /// engine app. Callers normally allow empty kinds to delete
    /// themselves.
    pub async fn sync_all(
        &self,
        engine_app: &EngineApp,
        options: &SyncOptions,
    ) -> IngressResult<()> {
        for kind in [
            IngressKind::Legacy,
            IngressKind::Subdomain,
            IngressKind::Subpath,
        ] {
            self.sync(engine_app, &kind, options).await?;
        }
        for row in self.routing.list_custom_domains(engine_app.id).await? {
            let kind = IngressKind::Custom { domain_id: row.id };
            self.sync(engine_app, &kind, options).await?;
        }
        Ok(())
    }

    /// Points every rule of the ingress at a new backend. Domains and
    /// snippets are untouched.
    pub async fn update_target(
        &self,
        engine_app: &EngineApp,
        kind: &IngressKind,
        service_name: &str,
        service_port_name: &str,
    ) -> IngressResult<()> {
        let cluster = self.clusters.get(&engine_app.cluster_name)?;
        let name = kind.object_name(&engine_app.name);

        if cluster.config().legacy_ingress_api {
            let resource = legacy_ingress_resource();
            let existing = cluster
                .get_dynamic_opt(&resource, &engine_app.namespace, &name)
                .await?
                .ok_or_else(|| IngressError::NotFound(name.clone()))?;
            let mut rules = existing.data["spec"]["rules"].clone();
            if let Some(items) = rules.as_array_mut() {
                for rule in items {
                    if let Some(paths) = rule["http"]["paths"].as_array_mut() {
                        for path in paths {
                            path["backend"]["serviceName"] = json!(service_name);
                            path["backend"]["servicePort"] = json!(service_port_name);
                        }
                    }
                }
            }
            cluster
                .merge_patch_dynamic(
                    &resource,
                    &engine_app.namespace,
                    &name,
                    &json!({"spec": {"rules": rules}}),
                )
                .await?;
        } else {
            let existing: Ingress = cluster
                .get_opt(&engine_app.namespace, &name)
                .await?
                .ok_or_else(|| IngressError::NotFound(name.clone()))?;
            let mut rules = existing.spec.and_then(|s| s.rules).unwrap_or_default();
            for rule in &mut rules {
                if let Some(http) = rule.http.as_mut() {
                    for path in &mut http.paths {
                        path.backend.service = Some(IngressServiceBackend {
                            name: service_name.to_string(),
                            port: Some(ServiceBackendPort {
                                name: Some(service_port_name.to_string()),
                                number: None,
                            }),
                        });
                        path.backend.resource = None;
                    }
                }
            }
            let patch = Ingress {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(engine_app.namespace.clone()),
                    ..Default::default()
                },
                spec: Some(IngressSpec {
                    rules: Some(rules),
                    ..Default::default()
                }),
                status: None,
            };
            cluster
                .merge_apply(&engine_app.namespace, &name, &patch)
                .await?;
        }
        info!(ingress = %name, backend = %service_name, "ingress retargeted");
        Ok(())
    }

    pub async fn delete(&self, engine_app: &EngineApp, kind: &IngressKind) -> IngressResult<()> {
        let cluster = self.clusters.get(&engine_app.cluster_name)?;
        let name = kind.object_name(&engine_app.name);
        if cluster.config().legacy_ingress_api {
            cluster
                .delete_dynamic_ignore_missing(
                    &legacy_ingress_resource(),
                    &engine_app.namespace,
                    &name,
                )
                .await?;
        } else {
            cluster
                .delete_ignore_missing::<Ingress>(&engine_app.namespace, &name)
                .await?;
        }
        Ok(())
    }

    async fn desired_domains(
        &self,
        engine_app: &EngineApp,
        kind: &IngressKind,
        config: &ClusterConfig,
    ) -> IngressResult<Vec<DesiredDomain>> {
        match kind {
            IngressKind::Legacy => self.planner.legacy_domains(engine_app).await,
            IngressKind::Subdomain => self.planner.subdomain_domains(engine_app).await,
            IngressKind::Subpath => self.planner.subpath_domains(engine_app, config).await,
            IngressKind::Custom { domain_id } => {
                match self.routing.get_custom_domain(*domain_id).await? {
                    Some(row) => self.planner.custom_domain(&row, &engine_app.region).await,
                    // Row gone: an empty set lets the object be deleted.
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    async fn read_existing(
        &self,
        cluster: &ClusterClient,
        config: &ClusterConfig,
        namespace: &str,
        name: &str,
    ) -> IngressResult<Option<ExistingIngress>> {
        if config.legacy_ingress_api {
            let Some(object) = cluster
                .get_dynamic_opt(&legacy_ingress_resource(), namespace, name)
                .await?
            else {
                return Ok(None);
            };
            let backend = &object.data["spec"]["rules"][0]["http"]["paths"][0]["backend"];
            let service_name = backend["serviceName"].as_str().unwrap_or_default();
            if service_name.is_empty() {
                return Ok(None);
            }
            let caller_snippet = object
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_CONFIGURATION_SNIPPET))
                .map(|s| strip_managed_snippet(s))
                .unwrap_or_default();
            Ok(Some(ExistingIngress {
                service_name: service_name.to_string(),
                service_port_name: backend["servicePort"]
                    .as_str()
                    .unwrap_or(DEFAULT_SERVICE_PORT_NAME)
                    .to_string(),
                caller_snippet,
            }))
        } else {
            let Some(object) = cluster.get_opt::<Ingress>(namespace, name).await? else {
                return Ok(None);
            };
            let backend = object
                .spec
                .as_ref()
                .and_then(|s| s.rules.as_ref())
                .and_then(|rules| rules.first())
                .and_then(|rule| rule.http.as_ref())
                .and_then(|http| http.paths.first())
                .and_then(|path| path.backend.service.as_ref());
            let Some(backend) = backend else {
                return Ok(None);
            };
            let caller_snippet = object
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_CONFIGURATION_SNIPPET))
                .map(|s| strip_managed_snippet(s))
                .unwrap_or_default();
            Ok(Some(ExistingIngress {
                service_name: backend.name.clone(),
                service_port_name: backend
                    .port
                    .as_ref()
                    .and_then(|p| p.name.clone())
                    .unwrap_or_else(|| DEFAULT_SERVICE_PORT_NAME.to_string()),
                caller_snippet,
            }))
        }
    }

    fn extra_annotations(&self, config: &ClusterConfig) -> BTreeMap<String, String> {
        let mut extra = config.extra_ingress_annotations.clone();
        if let Some(class) = &config.ingress_class {
            extra.insert("kubernetes.io/ingress.class".to_string(), class.clone());
        }
        extra
    }

    fn labels(&self, engine_app: &EngineApp) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "app.kubernetes.io/managed-by".to_string(),
                "gantry".to_string(),
            ),
            ("gantry.io/engine-app".to_string(), engine_app.name.clone()),
        ])
    }
}

/// Couples routing-table writes with the ingress syncs they require.
/// Address moves re-sync every engine app whose desired set changed.
pub struct RoutingUpdater {
    ingress: Arc<IngressService>,
    routing: Arc<dyn RoutingStorage>,
    applications: Arc<dyn ApplicationStorage>,
}

impl RoutingUpdater {
    pub fn new(
        ingress: Arc<IngressService>,
        routing: Arc<dyn RoutingStorage>,
        applications: Arc<dyn ApplicationStorage>,
    ) -> Self {
        Self {
            ingress,
            routing,
            applications,
        }
    }

    /// Replaces the engine app's subpath set, then syncs its subpath
    /// ingress and the ingress of every app that lost a subpath.
    pub async fn assign_subpaths(
        &self,
        engine_app: &EngineApp,
        subpaths: Vec<String>,
        default_service_name: Option<String>,
    ) -> IngressResult<()> {
        let affected = self
            .routing
            .assign_subpaths(engine_app.id, &engine_app.region, subpaths)
            .await?;
        let options = SyncOptions {
            default_service_name,
            delete_when_empty: true,
        };
        self.ingress
            .sync(engine_app, &IngressKind::Subpath, &options)
            .await?;
        self.resync_affected(affected, &IngressKind::Subpath).await
    }

    /// Replaces the engine app's domains of one source. Independent
    /// rows are address reservations with no default ingress of their
    /// own, so only storage changes for them.
    pub async fn assign_app_domains(
        &self,
        engine_app: &EngineApp,
        source: AddressSource,
        domains: Vec<AppDomain>,
        default_service_name: Option<String>,
    ) -> IngressResult<()> {
        let kind = match source {
            AddressSource::AutoGen => Some(IngressKind::Subdomain),
            AddressSource::BuiltIn => Some(IngressKind::Legacy),
            AddressSource::Independent => None,
        };
        let affected = self
            .routing
            .assign_app_domains(engine_app.id, source, domains)
            .await?;
        if let Some(kind) = kind {
            let options = SyncOptions {
                default_service_name,
                delete_when_empty: true,
            };
            self.ingress.sync(engine_app, &kind, &options).await?;
            self.resync_affected(affected, &kind).await?;
        }
        Ok(())
    }

    pub async fn save_custom_domain(
        &self,
        engine_app: &EngineApp,
        row: &CustomDomain,
        default_service_name: Option<String>,
    ) -> IngressResult<()> {
        self.routing.save_custom_domain(row).await?;
        let options = SyncOptions {
            default_service_name,
            delete_when_empty: false,
        };
        self.ingress
            .sync(engine_app, &IngressKind::Custom { domain_id: row.id }, &options)
            .await
    }

    pub async fn delete_custom_domain(
        &self,
        engine_app: &EngineApp,
        domain_id: Uuid,
    ) -> IngressResult<()> {
        self.routing.delete_custom_domain(domain_id).await?;
        self.ingress
            .delete(engine_app, &IngressKind::Custom { domain_id })
            .await
    }

    async fn resync_affected(
        &self,
        affected: Vec<Uuid>,
        kind: &IngressKind,
    ) -> IngressResult<()> {
        let options = SyncOptions {
            default_service_name: None,
            delete_when_empty: true,
        };
        for id in affected {
            let Some(other) = self.applications.get_engine_app(id).await? else {
                warn!(engine_app = %id, "engine app for moved address is gone, skipping");
                continue;
            };
            self.ingress.sync(&other, kind, &options).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_are_deterministic() {
        let id = Uuid::nil();
        assert_eq!(IngressKind::Legacy.object_name("demo-stag"), "demo-stag");
        assert_eq!(
            IngressKind::Subdomain.object_name("demo-stag"),
            "demo-stag-subdomain"
        );
        assert_eq!(
            IngressKind::Subpath.object_name("demo-stag"),
            "demo-stag-subpath"
        );
        assert_eq!(
            IngressKind::Custom { domain_id: id }.object_name("demo-stag"),
            format!("custom-demo-stag-{id}")
        );
    }
}
