use gantry_ingress::IngressError;
use gantry_kube::ClusterError;
use gantry_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("deployment did not stabilise: {0}")]
    Timeout(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Ingress(#[from] IngressError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),
}

pub type DeployResult<T> = Result<T, DeployError>;
