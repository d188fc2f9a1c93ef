use std::collections::BTreeSet;
use std::sync::Arc;

use gantry_kube::{ClusterClient, ClusterConfig};
use gantry_models::{AddressSource, CustomDomain, EngineApp};
use gantry_storage::{AppDomainFilter, RoutingStorage};
use k8s_openapi::api::core::v1::Secret;
use tracing::warn;

use crate::certs::{CertResolver, ResolvedCert};
use crate::error::{IngressError, IngressResult};

/// One host of a desired ingress, with every path prefix routed to the
/// app under that host. `path_prefixes` is sorted shortest-first; the
/// first entry doubles as the static fallback for header snippets.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredDomain {
    pub host: String,
    pub path_prefixes: Vec<String>,
    pub https_enabled: bool,
    pub cert: Option<ResolvedCert>,
}

impl DesiredDomain {
    pub fn http(host: String, path_prefixes: Vec<String>) -> Self {
        Self {
            host,
            path_prefixes,
            https_enabled: false,
            cert: None,
        }
    }

    /// Drops the TLS side of this domain. Used when a cert cannot be
    /// turned into a cluster secret.
    pub fn degrade_to_http(&mut self) {
        self.https_enabled = false;
        self.cert = None;
    }
}

fn sort_prefixes(prefixes: &mut [String]) {
    prefixes.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
}

/// Computes the desired domain set for each ingress kind from stored
/// addresses and certificates. Produces deterministic output: hosts are
/// sorted, prefixes are sorted shortest-first.
#[derive(Clone)]
pub struct DomainPlanner {
    routing: Arc<dyn RoutingStorage>,
    resolver: CertResolver,
}

impl DomainPlanner {
    pub fn new(routing: Arc<dyn RoutingStorage>, resolver: CertResolver) -> Self {
        Self { routing, resolver }
    }

    /// Auto-generated subdomains, one host per row, everything at `/`.
    pub async fn subdomain_domains(
        &self,
        engine_app: &EngineApp,
    ) -> IngressResult<Vec<DesiredDomain>> {
        self.app_domains(engine_app, AddressSource::AutoGen).await
    }

    /// Built-in domains kept for the pre-subdomain ingress name.
    pub async fn legacy_domains(
        &self,
        engine_app: &EngineApp,
    ) -> IngressResult<Vec<DesiredDomain>> {
        self.app_domains(engine_app, AddressSource::BuiltIn).await
    }

    async fn app_domains(
        &self,
        engine_app: &EngineApp,
        source: AddressSource,
    ) -> IngressResult<Vec<DesiredDomain>> {
        let rows = self
            .routing
            .list_app_domains(AppDomainFilter {
                engine_app_id: Some(engine_app.id),
                region: Some(engine_app.region.clone()),
                source: Some(source),
            })
            .await?;

        let mut desired = Vec::with_capacity(rows.len());
        for row in rows {
            let cert = self
                .resolver
                .resolve(&row.region, &row.host, row.cert_id, row.shared_cert_id)
                .await?;
            desired.push(DesiredDomain {
                host: row.host,
                path_prefixes: vec![row.path_prefix],
                https_enabled: cert.is_some(),
                cert,
            });
        }
        desired.sort_by(|a, b| a.host.cmp(&b.host));
        Ok(desired)
    }

    /// Cross product of the cluster's subpath root-domains and the app's
    /// subpaths, collapsed to one entry per host. A cluster without
    /// configured root-domains yields an empty set.
    pub async fn subpath_domains(
        &self,
        engine_app: &EngineApp,
        config: &ClusterConfig,
    ) -> IngressResult<Vec<DesiredDomain>> {
        if config.sub_path_domains.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.routing.list_subpaths(engine_app.id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut prefixes: Vec<String> = rows.into_iter().map(|r| r.subpath).collect();
        sort_prefixes(&mut prefixes);

        let mut hosts = config.sub_path_domains.clone();
        hosts.sort();
        let mut desired = Vec::with_capacity(hosts.len());
        for host in hosts {
            let cert = self.resolver.auto_match(&engine_app.region, &host).await?;
            desired.push(DesiredDomain {
                host,
                path_prefixes: prefixes.clone(),
                https_enabled: cert.is_some(),
                cert,
            });
        }
        Ok(desired)
    }

    /// A user-registered domain is its own ingress with a single host.
    /// HTTPS is kept only when the bound cert still resolves.
    pub async fn custom_domain(
        &self,
        row: &CustomDomain,
        region: &str,
    ) -> IngressResult<Vec<DesiredDomain>> {
        let cert = if row.https_enabled {
            self.resolver
                .resolve(region, &row.host, row.cert_id, None)
                .await?
        } else {
            None
        };
        Ok(vec![DesiredDomain {
            host: row.host.clone(),
            path_prefixes: vec![row.path_prefix.clone()],
            https_enabled: row.https_enabled && cert.is_some(),
            cert,
        }])
    }
}

/// Shortest path across all hosts, used as the static fallback when a
/// snippet cannot recover the matched location at request time.
pub fn shortest_path(domains: &[DesiredDomain]) -> String {
    domains
        .iter()
        .flat_map(|d| d.path_prefixes.iter())
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .cloned()
        .unwrap_or_else(|| "/".to_string())
}

/// Writes the TLS secret behind every HTTPS domain into the app
/// namespace. A domain whose secret cannot be written keeps serving,
/// over HTTP. Duplicate secret names are applied once.
pub async fn materialise_tls_secrets(
    cluster: &ClusterClient,
    namespace: &str,
    desired: &mut [DesiredDomain],
) {
    let mut applied: BTreeSet<String> = BTreeSet::new();
    for domain in desired.iter_mut() {
        if !domain.https_enabled {
            continue;
        }
        let Some(cert) = domain.cert.clone() else {
            domain.degrade_to_http();
            continue;
        };
        let secret_name = cert.secret_name();
        if applied.contains(&secret_name) {
            continue;
        }
        let outcome = match cert.tls_secret(namespace) {
            Ok(secret) => cluster
                .apply::<Secret>(namespace, &secret_name, &secret)
                .await
                .map(|_| ())
                .map_err(IngressError::from),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                applied.insert(secret_name);
            }
            Err(error) => {
                warn!(%error, host = %domain.host, "cannot write TLS secret, serving over HTTP");
                domain.degrade_to_http();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_sort_shortest_first() {
        let mut prefixes = vec![
            "/stag--demo".to_string(),
            "/v2".to_string(),
            "/prod--app".to_string(),
        ];
        sort_prefixes(&mut prefixes);
        assert_eq!(prefixes, ["/v2", "/prod--app", "/stag--demo"]);
    }

    #[test]
    fn shortest_path_spans_all_hosts() {
        let domains = vec![
            DesiredDomain::http("a.example.com".into(), vec!["/longer".into()]),
            DesiredDomain::http("b.example.com".into(), vec!["/x".into(), "/other".into()]),
        ];
        assert_eq!(shortest_path(&domains), "/x");
        assert_eq!(shortest_path(&[]), "/");
    }
}
