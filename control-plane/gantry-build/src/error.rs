use gantry_kube::ClusterError;
use gantry_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Another build currently holds this signature's slot.
    #[error("a build for signature {0} is already in flight")]
    AlreadyInFlight(String),

    /// A builder pod with this name is already running and young enough
    /// to be someone else's live build.
    #[error("builder pod {0} is already running")]
    ResourceDuplicate(String),

    /// User asked for the build to stop. Raised at the next step
    /// boundary, never mid-step.
    #[error("build {0} interrupted by user")]
    Interrupted(String),

    #[error("invalid source package: {0}")]
    InvalidPackage(String),

    /// The secret scan matched; the offending path is named, the content
    /// is not echoed.
    #[error("sensitive content in source package: {0}")]
    SensitiveContent(String),

    #[error("step {step} of phase {phase} failed: {source}")]
    StepFailed {
        phase: String,
        step: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("builder pod finished with a failure phase")]
    BuilderFailed,

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

pub type BuildResult<T> = Result<T, BuildError>;
