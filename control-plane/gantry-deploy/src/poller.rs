use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gantry_kube::ClusterRegistry;
use gantry_models::{DeployStatus, EngineApp};
use gantry_storage::ManifestStorage;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crd::{BkApp, BkAppCondition, BkAppConditionType, BkAppPhase, BkAppStatus, ConditionStatus};
use crate::error::{DeployError, DeployResult};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Wall limit for one deploy to settle. Crossing it records an
    /// internal error on the deploy row.
    pub timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// What one look at the live resource says about the deploy.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Nothing worth recording: object missing, or its status still
    /// describes an older generation.
    Pending,
    Progressing {
        reason: String,
        message: String,
    },
    Ready {
        reason: String,
        message: String,
        reported_at: Option<DateTime<Utc>>,
    },
    Error {
        reason: String,
        message: String,
        reported_at: Option<DateTime<Utc>>,
    },
}

/// Classifies a live `BkApp` the way the deploy record understands it.
/// Terminal verdicts carry the operator's own `status.lastUpdate` so the
/// record reflects when the cluster settled, not when we noticed.
pub fn observe(object: Option<&BkApp>) -> Verdict {
    let Some(app) = object else {
        return Verdict::Pending;
    };
    let default_status = BkAppStatus::default();
    let status = app.status.as_ref().unwrap_or(&default_status);

    let generation = app.metadata.generation.unwrap_or_default();
    if generation > status.observed_generation.unwrap_or_default() {
        return Verdict::Pending;
    }
    let reported_at = status.last_update.as_deref().and_then(parse_reported_at);

    if let Some(available) = condition(status, BkAppConditionType::AppAvailable) {
        if available.status == ConditionStatus::True {
            return Verdict::Ready {
                reason: available.reason.clone().unwrap_or_default(),
                message: available.message.clone().unwrap_or_default(),
                reported_at,
            };
        }
    }

    if status.phase == Some(BkAppPhase::Failed) {
        let failed = status.conditions.iter().find(|c| {
            c.status == ConditionStatus::False
                && c.message.as_deref().is_some_and(|m| !m.is_empty())
        });
        if let Some(failed) = failed {
            return Verdict::Error {
                reason: failed.reason.clone().unwrap_or_default(),
                message: failed.message.clone().unwrap_or_default(),
                reported_at,
            };
        }
    }

    let progressing = condition(status, BkAppConditionType::AppProgressing);
    Verdict::Progressing {
        reason: progressing
            .and_then(|c| c.reason.clone())
            .unwrap_or_default(),
        message: progressing
            .and_then(|c| c.message.clone())
            .unwrap_or_default(),
    }
}

fn condition(status: &BkAppStatus, type_: BkAppConditionType) -> Option<&BkAppCondition> {
    status.conditions.iter().find(|c| c.type_ == type_)
}

fn parse_reported_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Watches one deployed `BkApp` until the operator settles it, mirroring
/// every observation into the deploy record.
pub struct DeployStatusPoller {
    clusters: Arc<ClusterRegistry>,
    manifests: Arc<dyn ManifestStorage>,
    settings: PollerSettings,
}

impl DeployStatusPoller {
    pub fn new(
        clusters: Arc<ClusterRegistry>,
        manifests: Arc<dyn ManifestStorage>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            clusters,
            manifests,
            settings,
        }
    }

    /// Returns the terminal status, or `Timeout` after recording an
    /// internal error when the wall limit passes first.
    pub async fn poll_until_settled(
        &self,
        deploy_id: Uuid,
        engine_app: &EngineApp,
    ) -> DeployResult<DeployStatus> {
        let cluster = self.clusters.get(&engine_app.cluster_name)?;
        let deadline = Instant::now() + self.settings.timeout;

        loop {
            let object = cluster
                .get_opt::<BkApp>(&engine_app.namespace, &engine_app.name)
                .await?;
            match observe(object.as_ref()) {
                Verdict::Pending => {}
                Verdict::Progressing { reason, message } => {
                    self.manifests
                        .update_deploy_status(
                            deploy_id,
                            DeployStatus::Progressing,
                            &reason,
                            &message,
                            None,
                        )
                        .await?;
                }
                Verdict::Ready {
                    reason,
                    message,
                    reported_at,
                } => {
                    self.manifests
                        .update_deploy_status(
                            deploy_id,
                            DeployStatus::Ready,
                            &reason,
                            &message,
                            reported_at,
                        )
                        .await?;
                    info!(deploy = %deploy_id, engine_app = %engine_app.name, "deploy is ready");
                    return Ok(DeployStatus::Ready);
                }
                Verdict::Error {
                    reason,
                    message,
                    reported_at,
                } => {
                    self.manifests
                        .update_deploy_status(
                            deploy_id,
                            DeployStatus::Error,
                            &reason,
                            &message,
                            reported_at,
                        )
                        .await?;
                    warn!(deploy = %deploy_id, engine_app = %engine_app.name, %reason, "deploy failed");
                    return Ok(DeployStatus::Error);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let message = format!(
                    "no terminal condition within {}s",
                    self.settings.timeout.as_secs()
                );
                self.manifests
                    .update_deploy_status(
                        deploy_id,
                        DeployStatus::Error,
                        "internal_error",
                        &message,
                        None,
                    )
                    .await?;
                return Err(DeployError::Timeout(message));
            }
            tokio::time::sleep(remaining.min(self.settings.interval)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::BkAppSpec;

    fn app_with_status(generation: i64, status: BkAppStatus) -> BkApp {
        let mut app = BkApp::new("demo-stag", BkAppSpec::default());
        app.metadata.generation = Some(generation);
        app.status = Some(status);
        app
    }

    fn available(status: ConditionStatus) -> BkAppCondition {
        BkAppCondition {
            type_: BkAppConditionType::AppAvailable,
            status,
            reason: Some("AppAvailable".to_string()),
            message: Some("all processes running".to_string()),
            observed_generation: None,
        }
    }

    #[test]
    fn missing_object_stays_pending() {
        assert_eq!(observe(None), Verdict::Pending);
    }

    #[test]
    fn stale_observed_generation_stays_pending() {
        let app = app_with_status(
            3,
            BkAppStatus {
                observed_generation: Some(2),
                conditions: vec![available(ConditionStatus::True)],
                ..Default::default()
            },
        );
        assert_eq!(observe(Some(&app)), Verdict::Pending);
    }

    #[test]
    fn available_condition_settles_ready_with_reported_time() {
        let app = app_with_status(
            3,
            BkAppStatus {
                phase: Some(BkAppPhase::Running),
                observed_generation: Some(3),
                conditions: vec![available(ConditionStatus::True)],
                last_update: Some("2024-05-01T10:00:00Z".to_string()),
            },
        );
        let Verdict::Ready {
            reason,
            message,
            reported_at,
        } = observe(Some(&app))
        else {
            panic!("want ready");
        };
        assert_eq!(reason, "AppAvailable");
        assert_eq!(message, "all processes running");
        let reported = reported_at.unwrap();
        assert_eq!(reported.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn failed_phase_picks_first_false_condition_with_message() {
        let quiet_failure = BkAppCondition {
            type_: BkAppConditionType::HooksFinished,
            status: ConditionStatus::False,
            reason: Some("HookBroken".to_string()),
            message: None,
            observed_generation: None,
        };
        let loud_failure = BkAppCondition {
            type_: BkAppConditionType::AppProgressing,
            status: ConditionStatus::False,
            reason: Some("ReplicaSetFailed".to_string()),
            message: Some("image pull backoff".to_string()),
            observed_generation: None,
        };
        let app = app_with_status(
            1,
            BkAppStatus {
                phase: Some(BkAppPhase::Failed),
                observed_generation: Some(1),
                conditions: vec![quiet_failure, loud_failure],
                ..Default::default()
            },
        );
        let Verdict::Error { reason, message, .. } = observe(Some(&app)) else {
            panic!("want error");
        };
        assert_eq!(reason, "ReplicaSetFailed");
        assert_eq!(message, "image pull backoff");
    }

    #[test]
    fn anything_else_keeps_progressing() {
        let app = app_with_status(
            1,
            BkAppStatus {
                phase: Some(BkAppPhase::Pending),
                observed_generation: Some(1),
                conditions: vec![BkAppCondition {
                    type_: BkAppConditionType::AppProgressing,
                    status: ConditionStatus::Unknown,
                    reason: Some("Rolling".to_string()),
                    message: Some("2 of 3 replicas updated".to_string()),
                    observed_generation: None,
                }],
                ..Default::default()
            },
        );
        assert_eq!(
            observe(Some(&app)),
            Verdict::Progressing {
                reason: "Rolling".to_string(),
                message: "2 of 3 replicas updated".to_string(),
            }
        );
    }
}
