use gantry_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AddonError {
    #[error("invalid add-on request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("add-on conflict: {0}")]
    Conflict(String),

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type AddonResult<T> = Result<T, AddonError>;
