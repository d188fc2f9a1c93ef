use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use envconfig::Envconfig;
use gantry_build::{BuilderTemplate, RunnerSettings};
use gantry_deploy::PollerSettings;
use gantry_kube::ClusterConfig;
use gantry_storage::{EtcdOptions, LeaseSettings, StorageBackend, StorageOptions};
use k8s_openapi::api::core::v1::Toleration;
use tracing::warn;

use crate::error::{DeliveryError, DeliveryResult};

/// Registry credential stamped into deploys as a pull secret.
#[derive(Debug, Clone)]
pub struct RegistryCredential {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Envconfig)]
pub struct DeliveryConfig {
    // Storage configuration
    #[envconfig(from = "GANTRY_STORAGE_BACKEND", default = "memory")]
    pub storage_backend: String,

    #[envconfig(from = "GANTRY_ETCD_ENDPOINTS", default = "http://localhost:2379")]
    pub etcd_endpoints: String,

    #[envconfig(from = "GANTRY_ETCD_KEY_PREFIX", default = "/gantry")]
    pub etcd_key_prefix: String,

    #[envconfig(from = "GANTRY_ETCD_USERNAME")]
    pub etcd_username: Option<String>,

    #[envconfig(from = "GANTRY_ETCD_PASSWORD")]
    pub etcd_password: Option<String>,

    #[envconfig(from = "GANTRY_ETCD_TIMEOUT", default = "30")]
    pub etcd_timeout_seconds: u64,

    // Build slot lease
    #[envconfig(from = "GANTRY_BUILD_SLOT_TTL", default = "900")]
    pub build_slot_ttl_seconds: u64,

    #[envconfig(from = "GANTRY_BUILD_HEARTBEAT_TIMEOUT", default = "90")]
    pub build_heartbeat_timeout_seconds: u64,

    // Cluster configuration
    #[envconfig(from = "GANTRY_CLUSTER_NAME", default = "default")]
    pub cluster_name: String,

    #[envconfig(from = "GANTRY_LEGACY_INGRESS_API", default = "false")]
    pub legacy_ingress_api: bool,

    #[envconfig(from = "GANTRY_REGEX_PATHS", default = "true")]
    pub regex_paths: bool,

    #[envconfig(from = "GANTRY_KEEP_TRAILING_SLASH", default = "false")]
    pub keep_trailing_slash: bool,

    #[envconfig(from = "GANTRY_INGRESS_CLASS")]
    pub ingress_class: Option<String>,

    #[envconfig(from = "GANTRY_APP_ROOT_DOMAINS", default = "")]
    pub app_root_domains: String,

    #[envconfig(from = "GANTRY_SUB_PATH_DOMAINS", default = "")]
    pub sub_path_domains: String,

    #[envconfig(from = "GANTRY_INGRESS_ANNOTATIONS_JSON")]
    pub ingress_annotations_json: Option<String>,

    // Add-on provider
    #[envconfig(from = "GANTRY_PROVIDER_URL", default = "http://localhost:8620")]
    pub provider_url: String,

    #[envconfig(from = "GANTRY_PROVIDER_TOKEN")]
    pub provider_token: Option<String>,

    #[envconfig(from = "GANTRY_PROVIDER_TIMEOUT", default = "30")]
    pub provider_timeout_seconds: u64,

    // Builder pods
    #[envconfig(from = "GANTRY_BUILDER_IMAGE", default = "ghcr.io/gantry/smart-builder:latest")]
    pub builder_image: String,

    #[envconfig(from = "GANTRY_BUILDER_NAMESPACE", default = "gantry-builders")]
    pub builder_namespace: String,

    #[envconfig(from = "GANTRY_BUILDER_PRIVILEGED", default = "false")]
    pub builder_privileged: bool,

    #[envconfig(from = "GANTRY_BUILDER_NODE_SELECTOR_JSON")]
    pub builder_node_selector_json: Option<String>,

    #[envconfig(from = "GANTRY_BUILDER_TOLERATIONS_JSON")]
    pub builder_tolerations_json: Option<String>,

    #[envconfig(from = "GANTRY_BUILD_POLL_INTERVAL", default = "5")]
    pub build_poll_interval_seconds: u64,

    #[envconfig(from = "GANTRY_BUILD_TIMEOUT", default = "1800")]
    pub build_timeout_seconds: u64,

    #[envconfig(from = "GANTRY_BUILDER_MAX_POD_AGE", default = "3600")]
    pub builder_max_pod_age_seconds: u64,

    // Image registry credential for deploys
    #[envconfig(from = "GANTRY_REGISTRY_HOST")]
    pub registry_host: Option<String>,

    #[envconfig(from = "GANTRY_REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    #[envconfig(from = "GANTRY_REGISTRY_PASSWORD")]
    pub registry_password: Option<String>,

    // Deploy status polling
    #[envconfig(from = "GANTRY_DEPLOY_POLL_INTERVAL", default = "2")]
    pub deploy_poll_interval_seconds: u64,

    #[envconfig(from = "GANTRY_DEPLOY_TIMEOUT", default = "1800")]
    pub deploy_timeout_seconds: u64,

    // Worker pool and background loops
    #[envconfig(from = "GANTRY_WORKERS", default = "4")]
    pub worker_count: usize,

    #[envconfig(from = "GANTRY_TASK_QUEUE_CAPACITY", default = "256")]
    pub task_queue_capacity: usize,

    #[envconfig(from = "GANTRY_RECYCLE_SWEEP_INTERVAL", default = "60")]
    pub recycle_sweep_interval_seconds: u64,

    #[envconfig(from = "GANTRY_REAP_INTERVAL", default = "120")]
    pub reap_interval_seconds: u64,
}

impl DeliveryConfig {
    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self> {
        Ok(Self::init_from_env()?)
    }

    // Helper methods to get derived configurations
    pub fn storage(&self) -> StorageOptions {
        let backend = match StorageBackend::from_str(&self.storage_backend) {
            Ok(backend) => backend,
            Err(_) => {
                warn!(
                    "Unrecognized storage backend '{}', falling back to 'memory'.",
                    self.storage_backend
                );
                StorageBackend::Memory
            }
        };

        StorageOptions {
            backend,
            etcd: if backend == StorageBackend::Etcd {
                Some(EtcdOptions {
                    endpoints: split_list(&self.etcd_endpoints),
                    key_prefix: self.etcd_key_prefix.clone(),
                    username: self.etcd_username.clone(),
                    password: self.etcd_password.clone(),
                    timeout_seconds: Some(self.etcd_timeout_seconds),
                })
            } else {
                None
            },
            lease: LeaseSettings {
                ttl: Duration::from_secs(self.build_slot_ttl_seconds),
                heartbeat_timeout: Duration::from_secs(self.build_heartbeat_timeout_seconds),
            },
        }
    }

    pub fn cluster(&self) -> DeliveryResult<ClusterConfig> {
        let extra_ingress_annotations: BTreeMap<String, String> =
            match &self.ingress_annotations_json {
                Some(raw) => serde_json::from_str(raw).map_err(|error| {
                    DeliveryError::Config(format!(
                        "GANTRY_INGRESS_ANNOTATIONS_JSON is not a string map: {error}"
                    ))
                })?,
                None => BTreeMap::new(),
            };

        Ok(ClusterConfig {
            name: self.cluster_name.clone(),
            legacy_ingress_api: self.legacy_ingress_api,
            regex_paths: self.regex_paths,
            keep_trailing_slash: self.keep_trailing_slash,
            ingress_class: self.ingress_class.clone(),
            app_root_domains: split_list(&self.app_root_domains),
            sub_path_domains: split_list(&self.sub_path_domains),
            extra_ingress_annotations,
        })
    }

    pub fn builder_template(&self) -> DeliveryResult<BuilderTemplate> {
        let node_selector: BTreeMap<String, String> = match &self.builder_node_selector_json {
            Some(raw) => serde_json::from_str(raw).map_err(|error| {
                DeliveryError::Config(format!(
                    "GANTRY_BUILDER_NODE_SELECTOR_JSON is not a string map: {error}"
                ))
            })?,
            None => BTreeMap::new(),
        };
        let tolerations: Vec<Toleration> = match &self.builder_tolerations_json {
            Some(raw) => serde_json::from_str(raw).map_err(|error| {
                DeliveryError::Config(format!(
                    "GANTRY_BUILDER_TOLERATIONS_JSON is not a toleration list: {error}"
                ))
            })?,
            None => Vec::new(),
        };

        Ok(BuilderTemplate {
            image: self.builder_image.clone(),
            namespace: self.builder_namespace.clone(),
            privileged: self.builder_privileged,
            node_selector,
            tolerations,
        })
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            poll_interval: Duration::from_secs(self.build_poll_interval_seconds),
            timeout: Duration::from_secs(self.build_timeout_seconds),
            max_pod_age: Duration::from_secs(self.builder_max_pod_age_seconds),
        }
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_secs(self.deploy_poll_interval_seconds),
            timeout: Duration::from_secs(self.deploy_timeout_seconds),
        }
    }

    /// All three registry variables must be present for a credential.
    pub fn registry_credential(&self) -> Option<RegistryCredential> {
        match (
            &self.registry_host,
            &self.registry_username,
            &self.registry_password,
        ) {
            (Some(host), Some(username), Some(password)) => Some(RegistryCredential {
                host: host.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None, None) => None,
            _ => {
                warn!("Partial registry credential in environment, ignoring it.");
                None
            }
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn recycle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.recycle_sweep_interval_seconds)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_seconds)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> DeliveryConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DeliveryConfig::init_from_hashmap(&map).unwrap()
    }

    #[test]
    fn defaults_build_a_memory_backed_core() {
        let config = from_map(&[]);

        let storage = config.storage();
        assert_eq!(storage.backend, StorageBackend::Memory);
        assert!(storage.etcd.is_none());
        assert_eq!(storage.lease.heartbeat_timeout, Duration::from_secs(90));

        let cluster = config.cluster().unwrap();
        assert_eq!(cluster.name, "default");
        assert!(cluster.app_root_domains.is_empty());
        assert!(config.registry_credential().is_none());
    }

    #[test]
    fn etcd_backend_collects_endpoints_and_lease_settings() {
        let config = from_map(&[
            ("GANTRY_STORAGE_BACKEND", "etcd"),
            (
                "GANTRY_ETCD_ENDPOINTS",
                "http://etcd-0:2379, http://etcd-1:2379",
            ),
            ("GANTRY_BUILD_SLOT_TTL", "120"),
        ]);

        let storage = config.storage();
        assert_eq!(storage.backend, StorageBackend::Etcd);
        let etcd = storage.etcd.unwrap();
        assert_eq!(
            etcd.endpoints,
            vec![
                "http://etcd-0:2379".to_string(),
                "http://etcd-1:2379".to_string()
            ]
        );
        assert_eq!(storage.lease.ttl, Duration::from_secs(120));
    }

    #[test]
    fn unknown_backend_falls_back_to_memory() {
        let config = from_map(&[("GANTRY_STORAGE_BACKEND", "postgres")]);
        assert_eq!(config.storage().backend, StorageBackend::Memory);
    }

    #[test]
    fn cluster_config_parses_domain_lists_and_annotations() {
        let config = from_map(&[
            ("GANTRY_APP_ROOT_DOMAINS", "apps.example.com,alt.example.com"),
            ("GANTRY_SUB_PATH_DOMAINS", "shared.example.com"),
            (
                "GANTRY_INGRESS_ANNOTATIONS_JSON",
                r#"{"nginx.ingress.kubernetes.io/proxy-body-size": "50m"}"#,
            ),
        ]);

        let cluster = config.cluster().unwrap();
        assert_eq!(
            cluster.app_root_domains,
            vec!["apps.example.com".to_string(), "alt.example.com".to_string()]
        );
        assert_eq!(cluster.sub_path_domains, vec!["shared.example.com".to_string()]);
        assert_eq!(
            cluster
                .extra_ingress_annotations
                .get("nginx.ingress.kubernetes.io/proxy-body-size")
                .map(String::as_str),
            Some("50m")
        );
    }

    #[test]
    fn malformed_annotation_json_is_a_config_error() {
        let config = from_map(&[("GANTRY_INGRESS_ANNOTATIONS_JSON", "not json")]);
        assert!(config.cluster().is_err());
    }

    #[test]
    fn builder_template_reads_scheduling_hints() {
        let config = from_map(&[
            ("GANTRY_BUILDER_PRIVILEGED", "true"),
            (
                "GANTRY_BUILDER_NODE_SELECTOR_JSON",
                r#"{"gantry.io/builder": "true"}"#,
            ),
            (
                "GANTRY_BUILDER_TOLERATIONS_JSON",
                r#"[{"key": "builder", "operator": "Exists", "effect": "NoSchedule"}]"#,
            ),
        ]);

        let template = config.builder_template().unwrap();
        assert!(template.privileged);
        assert_eq!(
            template.node_selector.get("gantry.io/builder").map(String::as_str),
            Some("true")
        );
        assert_eq!(template.tolerations.len(), 1);
        assert_eq!(template.tolerations[0].key.as_deref(), Some("builder"));
    }

    #[test]
    fn partial_registry_credential_is_ignored() {
        let config = from_map(&[("GANTRY_REGISTRY_HOST", "registry.example.com")]);
        assert!(config.registry_credential().is_none());

        let config = from_map(&[
            ("GANTRY_REGISTRY_HOST", "registry.example.com"),
            ("GANTRY_REGISTRY_USERNAME", "robot"),
            ("GANTRY_REGISTRY_PASSWORD", "hunter2"),
        ]);
        let credential = config.registry_credential().unwrap();
        assert_eq!(credential.host, "registry.example.com");
    }
}
