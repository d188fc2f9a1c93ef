use gantry_addons::AddonError;
use gantry_build::BuildError;
use gantry_deploy::DeployError;
use gantry_ingress::IngressError;
use gantry_kube::ClusterError;
use gantry_models::ValidationError;
use gantry_storage::StorageError;
use thiserror::Error;

/// Top of the error chain: every subsystem error converts into this one
/// at the delivery boundary.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("task queue refused: {0}")]
    Queue(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Ingress(#[from] IngressError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Addon(#[from] AddonError),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
