#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("cluster '{0}' is not registered")]
    UnknownCluster(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
