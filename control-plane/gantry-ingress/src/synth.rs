use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use serde_json::{json, Value};

use crate::adaptor::PathAdaptor;
use crate::domains::DesiredDomain;

const SNIPPET_BEGIN: &str = "# -- gantry managed configuration begin --";
const SNIPPET_END: &str = "# -- gantry managed configuration end --";

pub(crate) const ANNOTATION_CONFIGURATION_SNIPPET: &str =
    "nginx.ingress.kubernetes.io/configuration-snippet";

/// Appends platform content to a caller-supplied configuration snippet,
/// fenced by sentinel comments. Re-composing replaces only the fenced
/// portion, so caller content survives every sync.
pub fn compose_snippet(existing: &str, platform: &str) -> String {
    let kept = strip_managed_snippet(existing);
    if platform.is_empty() {
        return kept;
    }
    if kept.is_empty() {
        format!("{SNIPPET_BEGIN}\n{platform}\n{SNIPPET_END}")
    } else {
        format!("{kept}\n{SNIPPET_BEGIN}\n{platform}\n{SNIPPET_END}")
    }
}

/// Removes the platform-contributed portion, returning caller content.
pub fn strip_managed_snippet(existing: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut inside = false;
    for line in existing.lines() {
        if line.trim() == SNIPPET_BEGIN {
            inside = true;
            continue;
        }
        if line.trim() == SNIPPET_END {
            inside = false;
            continue;
        }
        if !inside {
            kept.push(line);
        }
    }
    kept.join("\n").trim_end().to_string()
}

/// Full description of one platform-managed ingress, independent of the
/// cluster's API generation. Snippet fields hold the final composed
/// strings; composition happens in the reconciler.
#[derive(Debug, Clone)]
pub struct PlatformIngress {
    pub name: String,
    pub namespace: String,
    pub service_name: String,
    pub service_port_name: String,
    pub domains: Vec<DesiredDomain>,
    pub server_snippet: String,
    pub configuration_snippet: String,
    /// Caller passthroughs and cluster-level extras. Platform keys win
    /// on collision.
    pub extra_annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl PlatformIngress {
    /// Paths other than `/` are routed by stripping the platform prefix,
    /// which requires a rewrite rule on the controller side.
    pub fn needs_rewrite(&self) -> bool {
        self.domains
            .iter()
            .flat_map(|d| d.path_prefixes.iter())
            .any(|p| p != "/")
    }

    pub fn annotations(&self, adaptor: &dyn PathAdaptor) -> BTreeMap<String, String> {
        let mut annotations = self.extra_annotations.clone();
        annotations.insert(
            "nginx.ingress.kubernetes.io/ssl-redirect".to_string(),
            "false".to_string(),
        );
        annotations.insert(
            "bkbcs.tencent.com/skip-filter-clb".to_string(),
            "true".to_string(),
        );
        if !self.server_snippet.is_empty() {
            annotations.insert(
                "nginx.ingress.kubernetes.io/server-snippet".to_string(),
                self.server_snippet.clone(),
            );
        }
        if !self.configuration_snippet.is_empty() {
            annotations.insert(
                ANNOTATION_CONFIGURATION_SNIPPET.to_string(),
                self.configuration_snippet.clone(),
            );
        }
        if self.needs_rewrite() {
            annotations.insert(
                "nginx.ingress.kubernetes.io/rewrite-target".to_string(),
                adaptor.make_rewrite_target(),
            );
        }
        annotations
    }

    fn tls_sections(&self) -> Vec<(String, Vec<String>)> {
        let mut by_secret: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for domain in &self.domains {
            if !domain.https_enabled {
                continue;
            }
            if let Some(cert) = &domain.cert {
                by_secret
                    .entry(cert.secret_name())
                    .or_default()
                    .push(domain.host.clone());
            }
        }
        by_secret.into_iter().collect()
    }

    /// `networking.k8s.io/v1` rendition.
    pub fn build_v1(&self, adaptor: &dyn PathAdaptor) -> Ingress {
        let rules = self
            .domains
            .iter()
            .map(|domain| IngressRule {
                host: Some(domain.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: domain
                        .path_prefixes
                        .iter()
                        .map(|prefix| HTTPIngressPath {
                            path: Some(adaptor.make_location_path(prefix)),
                            path_type: "ImplementationSpecific".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: self.service_name.clone(),
                                    port: Some(ServiceBackendPort {
                                        name: Some(self.service_port_name.clone()),
                                        number: None,
                                    }),
                                }),
                                resource: None,
                            },
                        })
                        .collect(),
                }),
            })
            .collect();

        let tls: Vec<IngressTLS> = self
            .tls_sections()
            .into_iter()
            .map(|(secret_name, hosts)| IngressTLS {
                hosts: Some(hosts),
                secret_name: Some(secret_name),
            })
            .collect();

        Ingress {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                annotations: Some(self.annotations(adaptor)),
                labels: if self.labels.is_empty() {
                    None
                } else {
                    Some(self.labels.clone())
                },
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(rules),
                tls: if tls.is_empty() { None } else { Some(tls) },
                ..Default::default()
            }),
            status: None,
        }
    }

    /// `extensions/v1beta1` rendition for clusters that predate the v1
    /// ingress API. Untyped because k8s-openapi no longer ships it.
    pub fn build_legacy(&self, adaptor: &dyn PathAdaptor) -> Value {
        let rules: Vec<Value> = self
            .domains
            .iter()
            .map(|domain| {
                let paths: Vec<Value> = domain
                    .path_prefixes
                    .iter()
                    .map(|prefix| {
                        json!({
                            "path": adaptor.make_location_path(prefix),
                            "backend": {
                                "serviceName": self.service_name,
                                "servicePort": self.service_port_name,
                            },
                        })
                    })
                    .collect();
                json!({"host": domain.host, "http": {"paths": paths}})
            })
            .collect();

        let tls: Vec<Value> = self
            .tls_sections()
            .into_iter()
            .map(|(secret_name, hosts)| json!({"hosts": hosts, "secretName": secret_name}))
            .collect();

        let mut spec = json!({"rules": rules});
        if !tls.is_empty() {
            spec["tls"] = Value::from(tls);
        }
        json!({
            "apiVersion": "extensions/v1beta1",
            "kind": "Ingress",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "annotations": self.annotations(adaptor),
                "labels": self.labels,
            },
            "spec": spec,
        })
    }
}
