//! Source builds: serialises releases per artifact signature, walks the
//! staged release pipeline while narrating progress on an event stream,
//! and runs the actual build in a supervised in-cluster pod.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod pod;
pub mod runner;
pub mod source;
pub mod steps;
pub mod task;

pub use coordinator::BuildCoordinator;
pub use error::{BuildError, BuildResult};
pub use events::{EventStatus, EventStream, LogStream, StreamEvent};
pub use pod::{builder_pod, BuildPlan, BuilderTemplate};
pub use runner::{BuildOutcome, BuilderPodRunner, RunnerSettings};
pub use source::{
    is_valid_signature, load_descriptor, parse_descriptor, scan_for_secrets, source_signature,
    verify_layout, ModuleDescriptor, SmartDescriptor, DESCRIPTOR_FILE,
};
pub use steps::{
    smart_release_phases, InitBuildSpec, RunSmartBuild, ScanSecrets, ValidateDescriptor,
    VerifyLayout, PHASE_BUILD, PHASE_PREPARATION,
};
pub use task::{ReleaseContext, ReleasePhase, ReleaseStep, ReleaseTask};
