use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gantry_models::{BuildStatus, SmartBuildRecord};
use gantry_storage::BuildStorage;
use tracing::{info, warn};

use crate::coordinator::BuildCoordinator;
use crate::error::{BuildError, BuildResult};
use crate::events::{EventStatus, EventStream};
use crate::pod::{BuildPlan, BuilderTemplate};

/// Read-only inputs shared by every step of one release. Work products
/// cross step boundaries through the cluster, the store, or the event
/// stream, never through mutable shared state.
pub struct ReleaseContext {
    pub plan: BuildPlan,
    /// Unpacked source tree the preparation steps inspect.
    pub workspace: PathBuf,
    pub template: BuilderTemplate,
}

/// One unit of release work. Steps are retried by re-running the whole
/// build, so they must tolerate a half-finished previous attempt.
#[async_trait]
pub trait ReleaseStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, context: &ReleaseContext, events: &EventStream) -> BuildResult<()>;
}

pub struct ReleasePhase {
    pub name: &'static str,
    pub steps: Vec<Box<dyn ReleaseStep>>,
}

/// Drives one build through its phases, narrating progress on the event
/// stream and serialising on the signature slot. The terminal record is
/// written before the slot is freed so a waiting duplicate can never
/// observe a stale status.
pub struct ReleaseTask {
    coordinator: BuildCoordinator,
    builds: Arc<dyn BuildStorage>,
    context: ReleaseContext,
    phases: Vec<ReleasePhase>,
    events: EventStream,
}

impl ReleaseTask {
    pub fn new(
        coordinator: BuildCoordinator,
        builds: Arc<dyn BuildStorage>,
        context: ReleaseContext,
        phases: Vec<ReleasePhase>,
        events: EventStream,
    ) -> Self {
        Self {
            coordinator,
            builds,
            context,
            phases,
            events,
        }
    }

    pub async fn execute(self) -> BuildResult<SmartBuildRecord> {
        let signature = self.context.plan.record.signature.clone();
        let build_id = self.context.plan.record.id;

        self.coordinator.claim(&signature, build_id).await?;
        self.events.title(format!("starting build {build_id}"));

        let started = Instant::now();
        let outcome = self.run_phases().await;
        let record = self.terminal_record(&outcome, started.elapsed()).await;

        let stored = self.builds.store_build(&record).await;
        let released = self.coordinator.release(&signature, Some(build_id)).await;
        info!(%build_id, signature, status = ?record.status, "build finished");

        outcome?;
        stored?;
        released?;
        Ok(record)
    }

    async fn run_phases(&self) -> BuildResult<()> {
        let mut running = self.context.plan.record.clone();
        running.status = BuildStatus::Running;
        self.builds.store_build(&running).await?;

        for phase in &self.phases {
            self.events.phase(phase.name, EventStatus::Started);
            for step in &phase.steps {
                if let Err(error) = self.run_step(phase.name, step.as_ref()).await {
                    let status = if is_interruption(&error) {
                        EventStatus::Interruption
                    } else {
                        EventStatus::Failed
                    };
                    self.events.phase(phase.name, status);
                    return Err(error);
                }
            }
            self.events.phase(phase.name, EventStatus::Completed);
        }
        Ok(())
    }

    /// Step boundary: honour a pending interruption before emitting any
    /// step event, then refresh the heartbeat and run the step.
    async fn run_step(&self, phase: &str, step: &dyn ReleaseStep) -> BuildResult<()> {
        let signature = &self.context.plan.record.signature;
        let build_id = self.context.plan.record.id;

        if self
            .coordinator
            .interrupted_since(signature)
            .await?
            .is_some()
        {
            warn!(
                %build_id,
                step = step.name(),
                "interruption honoured at step boundary"
            );
            return Err(BuildError::Interrupted(signature.clone()));
        }
        self.coordinator.heartbeat(signature, build_id).await?;

        self.events.step(step.name(), EventStatus::Started);
        match step.run(&self.context, &self.events).await {
            Ok(()) => {
                self.events.step(step.name(), EventStatus::Completed);
                Ok(())
            }
            Err(error) => {
                self.events.step(step.name(), EventStatus::Failed);
                Err(BuildError::StepFailed {
                    phase: phase.to_string(),
                    step: step.name().to_string(),
                    source: Box::new(error),
                })
            }
        }
    }

    /// Re-reads the stored row so fields owned by the API side, such as
    /// the interruption request mark, survive the terminal write.
    async fn terminal_record(
        &self,
        outcome: &BuildResult<()>,
        elapsed: Duration,
    ) -> SmartBuildRecord {
        let plan = &self.context.plan;
        let mut record = match self.builds.get_build(plan.record.id).await {
            Ok(Some(current)) => current,
            _ => plan.record.clone(),
        };
        record.status = match outcome {
            Ok(()) => BuildStatus::Successful,
            Err(error) if is_interruption(error) => BuildStatus::Interrupted,
            Err(_) => BuildStatus::Failed,
        };
        record.time_spent_seconds = Some(elapsed.as_secs());
        if record.status == BuildStatus::Successful {
            record.artifact_url = Some(plan.artifact_url.clone());
        }
        record
    }
}

fn is_interruption(error: &BuildError) -> bool {
    match error {
        BuildError::Interrupted(_) => true,
        BuildError::StepFailed { source, .. } => is_interruption(source),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_is_detected_through_step_wrapping() {
        let inner = BuildError::Interrupted("abc".to_string());
        let wrapped = BuildError::StepFailed {
            phase: "build".to_string(),
            step: "run_smart_build_process".to_string(),
            source: Box::new(inner),
        };
        assert!(is_interruption(&wrapped));
        assert!(!is_interruption(&BuildError::BuilderFailed));
    }
}
