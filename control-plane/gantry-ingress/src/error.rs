use gantry_kube::ClusterError;
use gantry_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// The desired domain set is empty and the caller did not permit
    /// deletion.
    #[error("no desired domains for this ingress")]
    EmptyIngress,

    #[error("creating an ingress requires a default service name")]
    MissingServiceName,

    #[error("ingress {0} does not exist")]
    NotFound(String),

    /// Certificate data that cannot become a TLS secret. Sync degrades
    /// the affected rule to HTTP instead of failing.
    #[error("certificate {0} is unusable: {1}")]
    InvalidCert(String, String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type IngressResult<T> = Result<T, IngressError>;
