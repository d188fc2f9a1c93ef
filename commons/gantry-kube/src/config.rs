use std::collections::BTreeMap;

/// Per-cluster settings the delivery core needs beyond API connectivity.
/// Routing behaviour differs per cluster, not per application, so the
/// ingress feature flags live here.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,

    /// Serve `extensions/v1beta1` ingresses instead of `networking.k8s.io/v1`.
    pub legacy_ingress_api: bool,

    /// The installed ingress-nginx understands regex location paths. Old
    /// controllers (<= 0.21) only take literal paths.
    pub regex_paths: bool,

    /// Keep a trailing slash visible in synthesised location patterns.
    pub keep_trailing_slash: bool,

    /// Value for the `kubernetes.io/ingress.class` annotation, when one
    /// controller among several must pick up platform ingresses.
    pub ingress_class: Option<String>,

    /// Root domains under which per-app subdomains are allocated.
    pub app_root_domains: Vec<String>,

    /// Shared domains whose subpaths are handed out to apps. Empty means
    /// the cluster does not offer subpath addresses.
    pub sub_path_domains: Vec<String>,

    /// Operator-maintained annotations stamped onto every platform ingress.
    pub extra_ingress_annotations: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            name: "default".to_string(),
            legacy_ingress_api: false,
            regex_paths: true,
            keep_trailing_slash: false,
            ingress_class: None,
            app_root_domains: Vec::new(),
            sub_path_domains: Vec::new(),
            extra_ingress_annotations: BTreeMap::new(),
        }
    }
}
