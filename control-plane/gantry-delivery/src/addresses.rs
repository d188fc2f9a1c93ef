use std::sync::Arc;

use gantry_ingress::{CertResolver, DesiredDomain, DomainPlanner};
use gantry_kube::ClusterConfig;
use gantry_models::{
    normalize_path_prefix, AddressType, AppDomain, CustomDomain, EngineApp, ExposedUrl,
};
use gantry_storage::{ApplicationStorage, CertStorage, RoutingStorage};

use crate::error::{DeliveryError, DeliveryResult};

/// Read-side facade over the address store: the URLs an engine app is
/// reachable at, and the reverse lookup from a request address to the
/// app that owns it.
pub struct AddressDirectory {
    apps: Arc<dyn ApplicationStorage>,
    routing: Arc<dyn RoutingStorage>,
    planner: DomainPlanner,
}

impl AddressDirectory {
    pub fn new(
        apps: Arc<dyn ApplicationStorage>,
        routing: Arc<dyn RoutingStorage>,
        certs: Arc<dyn CertStorage>,
    ) -> Self {
        let planner = DomainPlanner::new(routing.clone(), CertResolver::new(certs));
        Self {
            apps,
            routing,
            planner,
        }
    }

    /// Every URL the engine app serves: custom domains first, then
    /// auto-generated subdomains, then shared-domain subpaths. The
    /// scheme of each URL follows cert availability for its host.
    pub async fn exposed_urls(
        &self,
        engine_app: &EngineApp,
        config: &ClusterConfig,
    ) -> DeliveryResult<Vec<ExposedUrl>> {
        let mut urls = Vec::new();

        for row in self.routing.list_custom_domains(engine_app.id).await? {
            for domain in self.planner.custom_domain(&row, &engine_app.region).await? {
                urls.push(exposed(AddressType::Custom, &domain));
            }
        }
        for domain in self.planner.subdomain_domains(engine_app).await? {
            urls.push(exposed(AddressType::Subdomain, &domain));
        }
        for domain in self.planner.subpath_domains(engine_app, config).await? {
            for prefix in &domain.path_prefixes {
                urls.push(ExposedUrl::new(
                    AddressType::Subpath,
                    domain.https_enabled,
                    &domain.host,
                    visible_path(prefix),
                ));
            }
        }

        urls.sort_by_key(|url| std::cmp::Reverse(url.address_type.preference()));
        Ok(urls)
    }

    /// The single best URL, or none while the app has no address yet.
    pub async fn preferred_url(
        &self,
        engine_app: &EngineApp,
        config: &ClusterConfig,
    ) -> DeliveryResult<Option<ExposedUrl>> {
        Ok(self
            .exposed_urls(engine_app, config)
            .await?
            .into_iter()
            .next())
    }

    /// Which stored domain answers a request for `host` + `path`. The
    /// longest stored prefix wins, mirroring nginx location selection.
    pub async fn owner_of(
        &self,
        region: &str,
        host: &str,
        path: &str,
    ) -> DeliveryResult<Option<AppDomain>> {
        for prefix in prefix_chain(path) {
            if let Some(row) = self
                .routing
                .get_domain_by_address(region, host, &prefix)
                .await?
            {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Validates and stores a user-registered domain. The address must
    /// collide with neither platform-managed rows nor another custom
    /// domain; the backend enforces the latter on save.
    pub async fn register_custom_domain(&self, domain: &CustomDomain) -> DeliveryResult<()> {
        domain.validate_business_rules()?;
        let engine_app = self
            .apps
            .get_engine_app(domain.engine_app_id)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(format!("engine app {}", domain.engine_app_id)))?;

        let path = normalize_path_prefix(&domain.path_prefix)?;
        if let Some(owner) = self
            .routing
            .get_domain_by_address(&engine_app.region, &domain.host, &path)
            .await?
        {
            return Err(DeliveryError::Conflict(format!(
                "{}{} already routes to engine app {}",
                domain.host, path, owner.engine_app_id
            )));
        }

        self.routing.save_custom_domain(domain).await?;
        Ok(())
    }
}

fn exposed(address_type: AddressType, domain: &DesiredDomain) -> ExposedUrl {
    let path = domain
        .path_prefixes
        .first()
        .map(String::as_str)
        .unwrap_or("/");
    ExposedUrl::new(
        address_type,
        domain.https_enabled,
        &domain.host,
        visible_path(path),
    )
}

/// The root prefix collapses so the URL reads `scheme://host`.
fn visible_path(prefix: &str) -> &str {
    if prefix == "/" { "" } else { prefix }
}

/// `/a/b/c` probes `/a/b/c`, `/a/b`, `/a`, `/` in that order.
fn prefix_chain(path: &str) -> Vec<String> {
    let trimmed = path.trim_end_matches('/');
    let mut chain = Vec::new();
    if !trimmed.is_empty() {
        let mut current = trimmed.to_string();
        loop {
            chain.push(current.clone());
            match current.rfind('/') {
                Some(0) | None => break,
                Some(index) => current.truncate(index),
            }
        }
    }
    chain.push("/".to_string());
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_chain_walks_from_longest_to_root() {
        assert_eq!(
            prefix_chain("/team/app/api"),
            vec!["/team/app/api", "/team/app", "/team", "/"]
        );
        assert_eq!(prefix_chain("/team/"), vec!["/team", "/"]);
        assert_eq!(prefix_chain("/"), vec!["/"]);
        assert_eq!(prefix_chain(""), vec!["/"]);
    }

    #[test]
    fn root_prefix_disappears_from_urls() {
        assert_eq!(visible_path("/"), "");
        assert_eq!(visible_path("/demo"), "/demo");
    }
}
