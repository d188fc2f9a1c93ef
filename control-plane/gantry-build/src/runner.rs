use std::time::Duration;

use chrono::Utc;
use gantry_kube::{ClusterClient, ClusterError};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::runtime::wait::await_condition;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BuildError, BuildResult};
use crate::events::{EventStream, LogStream};

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Sub-wait between log pulls while the pod runs.
    pub poll_interval: Duration,
    /// Wall limit for the whole run; crossing it reads as `Failed`.
    pub timeout: Duration,
    /// A pre-existing builder pod older than this is evicted instead of
    /// blocking the new run, whatever its phase.
    pub max_pod_age: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
            max_pod_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Terminal phase of one builder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed,
}

/// Runs one builder pod to completion, tailing its log into the build's
/// event stream. The pod is removed on every exit path past creation.
pub struct BuilderPodRunner {
    cluster: ClusterClient,
    settings: RunnerSettings,
}

impl BuilderPodRunner {
    pub fn new(cluster: ClusterClient, settings: RunnerSettings) -> Self {
        Self { cluster, settings }
    }

    pub async fn run(&self, pod: Pod, events: &EventStream) -> BuildResult<BuildOutcome> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| BuildError::Internal("builder pod has no name".to_string()))?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| BuildError::Internal("builder pod has no namespace".to_string()))?;
        let api: Api<Pod> = self.cluster.api(&namespace);

        if let Some(existing) = self.cluster.get_opt::<Pod>(&namespace, &name).await? {
            if pod_age(&existing) <= self.settings.max_pod_age && phase(Some(&existing)) == Some("Running")
            {
                return Err(BuildError::ResourceDuplicate(name));
            }
            self.evict(&api, &existing, &name).await?;
        }

        api.create(&PostParams::default(), &pod)
            .await
            .map_err(ClusterError::from)?;
        info!(pod = %name, %namespace, "builder pod created");
        events.title(format!("builder pod {name} started"));

        let mut log_offset = 0usize;
        let outcome = self.supervise(&api, &name, &mut log_offset, events).await;

        self.pump_logs(&api, &name, &mut log_offset, events).await;
        if let Err(error) = self
            .cluster
            .delete_ignore_missing::<Pod>(&namespace, &name)
            .await
        {
            warn!(%error, pod = %name, "builder pod cleanup failed");
        }
        outcome
    }

    async fn supervise(
        &self,
        api: &Api<Pod>,
        name: &str,
        log_offset: &mut usize,
        events: &EventStream,
    ) -> BuildResult<BuildOutcome> {
        let deadline = Instant::now() + self.settings.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                events.message(
                    format!(
                        "builder did not finish within {}s",
                        self.settings.timeout.as_secs()
                    ),
                    LogStream::Stderr,
                );
                return Ok(BuildOutcome::Failed);
            }

            let settled = await_condition(api.clone(), name, pod_settled);
            match tokio::time::timeout(remaining.min(self.settings.poll_interval), settled).await
            {
                Ok(Ok(pod)) => {
                    let outcome = match phase(pod.as_ref()) {
                        Some("Succeeded") => BuildOutcome::Succeeded,
                        _ => BuildOutcome::Failed,
                    };
                    return Ok(outcome);
                }
                Ok(Err(error)) => {
                    return Err(BuildError::Internal(format!(
                        "watching builder pod {name}: {error}"
                    )));
                }
                Err(_elapsed) => {
                    self.pump_logs(api, name, log_offset, events).await;
                }
            }
        }
    }

    /// Drains log bytes past the high-water mark into the stream. Builder
    /// images write everything to stdout.
    async fn pump_logs(
        &self,
        api: &Api<Pod>,
        name: &str,
        offset: &mut usize,
        events: &EventStream,
    ) {
        match api.logs(name, &LogParams::default()).await {
            Ok(text) => {
                if text.len() > *offset {
                    if let Some(fresh) = text.get(*offset..) {
                        for line in fresh.lines() {
                            events.message(line, LogStream::Stdout);
                        }
                    }
                    *offset = text.len();
                }
            }
            Err(error) => {
                // Logs 400 until the container actually starts.
                debug!(%error, pod = %name, "builder logs not available yet");
            }
        }
    }

    /// Removes a leftover pod and waits until the name is free again.
    async fn evict(&self, api: &Api<Pod>, existing: &Pod, name: &str) -> BuildResult<()> {
        info!(pod = %name, "evicting stale builder pod");
        let params = DeleteParams::default().grace_period(0);
        match api.delete(name, &params).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
            Err(e) => return Err(ClusterError::from(e).into()),
        }
        if let Some(uid) = existing.metadata.uid.as_deref() {
            let gone = await_condition(
                api.clone(),
                name,
                kube::runtime::wait::conditions::is_deleted(uid),
            );
            tokio::time::timeout(Duration::from_secs(30), gone)
                .await
                .map_err(|_| ClusterError::Timeout(format!("deletion of pod {name}")))?
                .map_err(|error| {
                    BuildError::Internal(format!("watching eviction of pod {name}: {error}"))
                })?;
        }
        Ok(())
    }
}

fn phase(pod: Option<&Pod>) -> Option<&str> {
    pod.and_then(|p| p.status.as_ref()).and_then(|s| s.phase.as_deref())
}

fn pod_settled(pod: Option<&Pod>) -> bool {
    matches!(phase(pod), Some("Succeeded") | Some("Failed"))
}

fn pod_age(pod: &Pod) -> Duration {
    pod.metadata
        .creation_timestamp
        .as_ref()
        .and_then(|t| (Utc::now() - t.0).to_std().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn pod_in_phase(phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta::default(),
            spec: None,
            status: Some(k8s_openapi::api::core::v1::PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn only_terminal_phases_settle() {
        assert!(pod_settled(Some(&pod_in_phase("Succeeded"))));
        assert!(pod_settled(Some(&pod_in_phase("Failed"))));
        assert!(!pod_settled(Some(&pod_in_phase("Running"))));
        assert!(!pod_settled(Some(&pod_in_phase("Pending"))));
        assert!(!pod_settled(None));
    }

    #[test]
    fn age_of_unstamped_pod_is_zero() {
        let pod = pod_in_phase("Running");
        assert_eq!(pod_age(&pod), Duration::ZERO);
    }
}
