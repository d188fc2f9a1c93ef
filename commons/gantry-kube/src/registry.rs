use std::collections::HashMap;

use crate::client::ClusterClient;
use crate::error::{ClusterError, ClusterResult};

/// All clusters the platform may schedule onto, keyed by cluster name.
/// Engine apps that carry no cluster name land on the default cluster.
pub struct ClusterRegistry {
    clusters: HashMap<String, ClusterClient>,
    default_cluster: String,
}

impl ClusterRegistry {
    pub fn new(default_cluster: impl Into<String>) -> Self {
        Self {
            clusters: HashMap::new(),
            default_cluster: default_cluster.into(),
        }
    }

    pub fn insert(&mut self, client: ClusterClient) {
        self.clusters.insert(client.config().name.clone(), client);
    }

    pub fn get(&self, cluster_name: &str) -> ClusterResult<&ClusterClient> {
        let key = self.select(cluster_name);
        self.clusters
            .get(key)
            .ok_or_else(|| ClusterError::UnknownCluster(key.to_string()))
    }

    pub fn default_cluster(&self) -> ClusterResult<&ClusterClient> {
        self.get("")
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    fn select<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() {
            &self.default_cluster
        } else {
            requested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_falls_back_to_default() {
        let registry = ClusterRegistry::new("main");
        assert_eq!(registry.select(""), "main");
        assert_eq!(registry.select("edge-1"), "edge-1");
    }

    #[test]
    fn unknown_cluster_is_an_error() {
        let registry = ClusterRegistry::new("main");
        assert!(matches!(
            registry.get("nowhere"),
            Err(ClusterError::UnknownCluster(name)) if name == "nowhere"
        ));
    }
}
