use std::collections::BTreeMap;
use std::sync::Arc;

use gantry_models::{AppDomainCert, AppDomainSharedCert};
use gantry_storage::CertStorage;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use uuid::Uuid;

use crate::error::{IngressError, IngressResult};

/// Certificate chosen for one HTTPS domain.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCert {
    Normal(AppDomainCert),
    Shared(AppDomainSharedCert),
}

impl ResolvedCert {
    /// Secret names derive from the certificate name alone, so every
    /// domain secured by one cert references the same secret object.
    pub fn secret_name(&self) -> String {
        match self {
            ResolvedCert::Normal(c) => format!("cert-{}", c.name),
            ResolvedCert::Shared(c) => format!("shared-cert-{}", c.name),
        }
    }

    fn cert_name(&self) -> &str {
        match self {
            ResolvedCert::Normal(c) => &c.name,
            ResolvedCert::Shared(c) => &c.name,
        }
    }

    fn pem_pair(&self) -> (&str, &str) {
        match self {
            ResolvedCert::Normal(c) => (&c.cert_data, &c.key_data),
            ResolvedCert::Shared(c) => (&c.cert_data, &c.key_data),
        }
    }

    /// Renders the cert as a `kubernetes.io/tls` secret.
    pub fn tls_secret(&self, namespace: &str) -> IngressResult<Secret> {
        let (cert_data, key_data) = self.pem_pair();
        if cert_data.trim().is_empty() || key_data.trim().is_empty() {
            return Err(IngressError::InvalidCert(
                self.cert_name().to_string(),
                "empty certificate or key data".to_string(),
            ));
        }
        let mut string_data = BTreeMap::new();
        string_data.insert("tls.crt".to_string(), cert_data.to_string());
        string_data.insert("tls.key".to_string(), key_data.to_string());
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(self.secret_name()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            string_data: Some(string_data),
            ..Default::default()
        })
    }
}

/// Picks the certificate securing one hostname. An explicit cert bound
/// to the domain wins over a named shared cert, which wins over CN
/// auto-matching across the region's shared certs.
#[derive(Clone)]
pub struct CertResolver {
    certs: Arc<dyn CertStorage>,
}

impl CertResolver {
    pub fn new(certs: Arc<dyn CertStorage>) -> Self {
        Self { certs }
    }

    pub async fn resolve(
        &self,
        region: &str,
        host: &str,
        cert_id: Option<Uuid>,
        shared_cert_id: Option<Uuid>,
    ) -> IngressResult<Option<ResolvedCert>> {
        if let Some(id) = cert_id {
            if let Some(cert) = self.certs.get_cert(id).await? {
                return Ok(Some(ResolvedCert::Normal(cert)));
            }
            tracing::warn!(%id, host, "bound cert is gone, trying shared certs");
        }
        if let Some(id) = shared_cert_id {
            if let Some(cert) = self.certs.get_shared_cert(id).await? {
                return Ok(Some(ResolvedCert::Shared(cert)));
            }
            tracing::warn!(%id, host, "bound shared cert is gone, trying auto-match");
        }
        self.auto_match(region, host).await
    }

    /// CN auto-matching only; used for hostnames that carry no explicit
    /// binding, such as subpath root-domains.
    pub async fn auto_match(
        &self,
        region: &str,
        host: &str,
    ) -> IngressResult<Option<ResolvedCert>> {
        let shared = self.certs.list_shared_certs(region).await?;
        Ok(shared
            .into_iter()
            .find(|c| c.matches_hostname(host))
            .map(ResolvedCert::Shared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_storage::memory::MemoryCertStorage;
    use gantry_storage::CertStorage as _;

    fn shared(region: &str, name: &str, cns: &[&str]) -> AppDomainSharedCert {
        AppDomainSharedCert {
            id: Uuid::new_v4(),
            region: region.to_string(),
            name: name.to_string(),
            cert_data: "PEM CERT".to_string(),
            key_data: "PEM KEY".to_string(),
            auto_match_cns: cns.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn explicit_cert_wins_over_auto_match() {
        let store = Arc::new(MemoryCertStorage::new());
        let normal = AppDomainCert {
            id: Uuid::new_v4(),
            region: "ieod".to_string(),
            name: "demo-cert".to_string(),
            cert_data: "PEM CERT".to_string(),
            key_data: "PEM KEY".to_string(),
        };
        store.save_cert(&normal).await.unwrap();
        store
            .save_shared_cert(&shared("ieod", "wild", &["*.example.com"]))
            .await
            .unwrap();

        let resolver = CertResolver::new(store);
        let resolved = resolver
            .resolve("ieod", "demo.example.com", Some(normal.id), None)
            .await
            .unwrap();
        assert_eq!(resolved, Some(ResolvedCert::Normal(normal)));
    }

    #[tokio::test]
    async fn dangling_cert_falls_back_to_auto_match() {
        let store = Arc::new(MemoryCertStorage::new());
        let wild = shared("ieod", "wild", &["*.example.com"]);
        store.save_shared_cert(&wild).await.unwrap();

        let resolver = CertResolver::new(store);
        let resolved = resolver
            .resolve("ieod", "demo.example.com", Some(Uuid::new_v4()), None)
            .await
            .unwrap();
        assert_eq!(resolved, Some(ResolvedCert::Shared(wild)));

        let missed = resolver
            .resolve("ieod", "demo.other.io", None, None)
            .await
            .unwrap();
        assert_eq!(missed, None);
    }

    #[test]
    fn secret_names_are_deterministic_per_cert() {
        let cert = ResolvedCert::Shared(shared("ieod", "wild", &["*.example.com"]));
        assert_eq!(cert.secret_name(), "shared-cert-wild");

        let secret = cert.tls_secret("gantry-demo-stag").unwrap();
        assert_eq!(secret.metadata.name.as_deref(), Some("shared-cert-wild"));
        assert_eq!(secret.type_.as_deref(), Some("kubernetes.io/tls"));
        let data = secret.string_data.unwrap();
        assert_eq!(data.get("tls.crt").map(String::as_str), Some("PEM CERT"));
        assert_eq!(data.get("tls.key").map(String::as_str), Some("PEM KEY"));
    }

    #[test]
    fn empty_key_data_is_rejected() {
        let mut wild = shared("ieod", "wild", &[]);
        wild.key_data = String::new();
        let err = ResolvedCert::Shared(wild).tls_secret("ns").unwrap_err();
        assert!(matches!(err, IngressError::InvalidCert(name, _) if name == "wild"));
    }
}
