use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BuildError, BuildResult};
use crate::events::EventStream;
use crate::pod::builder_pod;
use crate::runner::{BuildOutcome, BuilderPodRunner};
use crate::source::{load_descriptor, scan_for_secrets, verify_layout, DESCRIPTOR_FILE};
use crate::task::{ReleaseContext, ReleasePhase, ReleaseStep};

pub const PHASE_PREPARATION: &str = "preparation";
pub const PHASE_BUILD: &str = "build";

/// The fixed S-mart pipeline: package checks first, then the builder pod.
pub fn smart_release_phases(runner: Arc<BuilderPodRunner>) -> Vec<ReleasePhase> {
    vec![
        ReleasePhase {
            name: PHASE_PREPARATION,
            steps: vec![
                Box::new(ValidateDescriptor),
                Box::new(VerifyLayout),
                Box::new(ScanSecrets),
            ],
        },
        ReleasePhase {
            name: PHASE_BUILD,
            steps: vec![Box::new(InitBuildSpec), Box::new(RunSmartBuild { runner })],
        },
    ]
}

/// Parses the package descriptor and reports what it declares.
pub struct ValidateDescriptor;

#[async_trait]
impl ReleaseStep for ValidateDescriptor {
    fn name(&self) -> &'static str {
        "validate_app_desc"
    }

    async fn run(&self, context: &ReleaseContext, events: &EventStream) -> BuildResult<()> {
        let descriptor = load_descriptor(&context.workspace)?;
        events.title(format!(
            "{DESCRIPTOR_FILE} ok: spec version {}, {} module(s)",
            descriptor.spec_version.unwrap_or_default(),
            descriptor.modules.len()
        ));
        Ok(())
    }
}

/// Checks that every declared module has its source directory in the
/// package. The descriptor is re-parsed here: steps share nothing.
pub struct VerifyLayout;

#[async_trait]
impl ReleaseStep for VerifyLayout {
    fn name(&self) -> &'static str {
        "verify_package_layout"
    }

    async fn run(&self, context: &ReleaseContext, events: &EventStream) -> BuildResult<()> {
        let descriptor = load_descriptor(&context.workspace)?;
        verify_layout(&context.workspace, &descriptor)?;
        events.title("package layout verified");
        Ok(())
    }
}

/// Walks the whole package for key material. The walk is blocking file
/// I/O, so it runs off the async workers.
pub struct ScanSecrets;

#[async_trait]
impl ReleaseStep for ScanSecrets {
    fn name(&self) -> &'static str {
        "scan_sensitive_files"
    }

    async fn run(&self, context: &ReleaseContext, events: &EventStream) -> BuildResult<()> {
        let workspace = context.workspace.clone();
        tokio::task::spawn_blocking(move || scan_for_secrets(&workspace))
            .await
            .map_err(|error| BuildError::Internal(error.to_string()))??;
        events.title("no sensitive content found");
        Ok(())
    }
}

/// Resolves the builder pod spec and announces the plan. The spec is
/// rebuilt from the context again at run time, so this step only has to
/// prove it resolves.
pub struct InitBuildSpec;

#[async_trait]
impl ReleaseStep for InitBuildSpec {
    fn name(&self) -> &'static str {
        "init_build_spec"
    }

    async fn run(&self, context: &ReleaseContext, events: &EventStream) -> BuildResult<()> {
        let pod = builder_pod(&context.template, &context.plan);
        let name = pod
            .metadata
            .name
            .ok_or_else(|| BuildError::Internal("builder pod has no name".to_string()))?;
        events.title(format!(
            "builder {name} uses image {}",
            context.template.image
        ));
        Ok(())
    }
}

/// Hands the pod to the runner and maps its outcome: a pod that ran to
/// `Failed` is a build failure, not an infrastructure error.
pub struct RunSmartBuild {
    pub runner: Arc<BuilderPodRunner>,
}

#[async_trait]
impl ReleaseStep for RunSmartBuild {
    fn name(&self) -> &'static str {
        "run_smart_build_process"
    }

    async fn run(&self, context: &ReleaseContext, events: &EventStream) -> BuildResult<()> {
        let pod = builder_pod(&context.template, &context.plan);
        match self.runner.run(pod, events).await? {
            BuildOutcome::Succeeded => Ok(()),
            BuildOutcome::Failed => Err(BuildError::BuilderFailed),
        }
    }
}
