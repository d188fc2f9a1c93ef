use std::sync::Arc;
use std::time::Duration;

use gantry_ingress::{
    materialise_tls_secrets, CertResolver, DesiredDomain, DomainPlanner,
};
use gantry_kube::{ClusterClient, ClusterRegistry};
use gantry_models::EngineApp;
use gantry_storage::{CertStorage, RoutingStorage};
use k8s_openapi::api::core::v1::Secret;
use tracing::info;

use crate::assembler::{AssembledDeploy, DeployContext, IMAGE_CREDENTIALS_SECRET};
use crate::crd::{
    BkApp, DomainGroup, DomainGroupMapping, DomainGroupMappingSpec, DomainSourceType,
    MappedDomain, MappingRef,
};
use crate::error::DeployResult;

/// Namespace creation blocks until the default service account shows up,
/// at most this long.
const NAMESPACE_ACCOUNT_WAIT: Duration = Duration::from_secs(15);

/// Places an assembled deploy into its target cluster in dependency
/// order: namespace, pull secret, application CR, routing CR.
pub struct ManifestDeployer {
    clusters: Arc<ClusterRegistry>,
    routing: Arc<dyn RoutingStorage>,
    planner: DomainPlanner,
}

impl ManifestDeployer {
    pub fn new(
        clusters: Arc<ClusterRegistry>,
        routing: Arc<dyn RoutingStorage>,
        certs: Arc<dyn CertStorage>,
    ) -> Self {
        let planner = DomainPlanner::new(routing.clone(), CertResolver::new(certs));
        Self {
            clusters,
            routing,
            planner,
        }
    }

    pub async fn deploy(
        &self,
        assembled: &AssembledDeploy,
        context: &DeployContext,
    ) -> DeployResult<()> {
        let engine_app = &context.engine_app;
        let cluster = self.clusters.get(&engine_app.cluster_name)?;
        let namespace = &engine_app.namespace;

        cluster
            .ensure_namespace(namespace, NAMESPACE_ACCOUNT_WAIT)
            .await?;
        if let Some(secret) = &assembled.credentials_secret {
            cluster
                .merge_apply::<Secret>(namespace, IMAGE_CREDENTIALS_SECRET, secret)
                .await?;
        }
        // Merge, not replace: fields the manifest leaves unset must not
        // wipe what the operator wrote onto the live object.
        cluster
            .merge_apply::<BkApp>(namespace, &engine_app.name, &assembled.bkapp)
            .await?;

        let mapping = self.domain_group_mapping(cluster, engine_app).await?;
        cluster
            .apply::<DomainGroupMapping>(namespace, &engine_app.name, &mapping)
            .await?;
        info!(deploy = %context.deploy_id, engine_app = %engine_app.name, "manifest applied");
        Ok(())
    }

    /// One cluster object carrying every address of the app, consumed by
    /// the in-cluster operator instead of per-kind Ingresses. Host-routed
    /// rows (built-in and generated) land in the `subdomain` group.
    pub async fn domain_group_mapping(
        &self,
        cluster: &ClusterClient,
        engine_app: &EngineApp,
    ) -> DeployResult<DomainGroupMapping> {
        let namespace = &engine_app.namespace;
        let mut data = Vec::new();

        let mut subdomains = self.planner.legacy_domains(engine_app).await?;
        subdomains.extend(self.planner.subdomain_domains(engine_app).await?);
        subdomains.sort_by(|a, b| a.host.cmp(&b.host));
        subdomains.dedup_by(|a, b| a.host == b.host);
        materialise_tls_secrets(cluster, namespace, &mut subdomains).await;
        if !subdomains.is_empty() {
            data.push(DomainGroup {
                source_type: DomainSourceType::Subdomain,
                domains: subdomains.iter().map(|d| mapped_domain(d, None)).collect(),
            });
        }

        let mut subpaths = self
            .planner
            .subpath_domains(engine_app, cluster.config())
            .await?;
        materialise_tls_secrets(cluster, namespace, &mut subpaths).await;
        if !subpaths.is_empty() {
            data.push(DomainGroup {
                source_type: DomainSourceType::Subpath,
                domains: subpaths.iter().map(|d| mapped_domain(d, None)).collect(),
            });
        }

        let mut customs = Vec::new();
        for row in self.routing.list_custom_domains(engine_app.id).await? {
            let mut desired = self
                .planner
                .custom_domain(&row, &engine_app.region)
                .await?;
            materialise_tls_secrets(cluster, namespace, &mut desired).await;
            customs.extend(
                desired
                    .iter()
                    .map(|d| mapped_domain(d, Some(row.id.to_string()))),
            );
        }
        if !customs.is_empty() {
            data.push(DomainGroup {
                source_type: DomainSourceType::Custom,
                domains: customs,
            });
        }

        let mut mapping = DomainGroupMapping::new(
            &engine_app.name,
            DomainGroupMappingSpec {
                reference: MappingRef {
                    name: engine_app.name.clone(),
                    kind: Some("BkApp".to_string()),
                },
                data,
            },
        );
        mapping.metadata.namespace = Some(namespace.clone());
        Ok(mapping)
    }
}

fn mapped_domain(domain: &DesiredDomain, name: Option<String>) -> MappedDomain {
    MappedDomain {
        host: domain.host.clone(),
        path_prefix_list: domain.path_prefixes.clone(),
        tls_secret_name: domain
            .cert
            .as_ref()
            .filter(|_| domain.https_enabled)
            .map(|c| c.secret_name()),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_ingress::ResolvedCert;
    use gantry_models::AppDomainCert;
    use uuid::Uuid;

    #[test]
    fn mapped_domain_carries_secret_only_when_https() {
        let cert = ResolvedCert::Normal(AppDomainCert {
            id: Uuid::new_v4(),
            region: "default".to_string(),
            name: "demo".to_string(),
            cert_data: "PEM".to_string(),
            key_data: "KEY".to_string(),
        });
        let mut domain = DesiredDomain {
            host: "demo.example.com".to_string(),
            path_prefixes: vec!["/".to_string()],
            https_enabled: true,
            cert: Some(cert),
        };
        assert_eq!(
            mapped_domain(&domain, None).tls_secret_name.as_deref(),
            Some("cert-demo")
        );

        domain.degrade_to_http();
        assert_eq!(mapped_domain(&domain, None).tls_secret_name, None);
    }
}
