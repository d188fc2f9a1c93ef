use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};
use gantry_addons::RecyclingPoller;
use gantry_build::{BuildCoordinator, ReleaseTask};
use gantry_deploy::DeployStatusPoller;
use gantry_models::EngineApp;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DeliveryError, DeliveryResult};

/// Work items the delivery core hands to its worker pool.
pub enum DeliveryTask {
    /// Follow one applied deploy until the operator settles it.
    PollDeploy {
        deploy_id: Uuid,
        engine_app: EngineApp,
    },
    /// Walk one release pipeline end to end.
    ExecuteRelease(Box<ReleaseTask>),
}

/// Bounded MPMC handle the API side submits through. Cloneable; all
/// workers share one receiver.
#[derive(Clone)]
pub struct TaskQueue {
    tx: Sender<DeliveryTask>,
}

impl TaskQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<DeliveryTask>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }

    /// Refuses instead of blocking when the pool is saturated.
    pub fn submit(&self, task: DeliveryTask) -> DeliveryResult<()> {
        self.tx.try_send(task).map_err(|error| match error {
            TrySendError::Full(_) => DeliveryError::Queue("queue is full".to_string()),
            TrySendError::Disconnected(_) => {
                DeliveryError::Queue("worker pool is gone".to_string())
            }
        })
    }
}

pub fn spawn_workers(
    count: usize,
    tasks: Receiver<DeliveryTask>,
    poller: Arc<DeployStatusPoller>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|index| {
            let tasks = tasks.clone();
            let poller = poller.clone();
            tokio::spawn(async move { worker_loop(index, tasks, poller).await })
        })
        .collect()
}

/// Runs until every queue sender is dropped and the backlog is drained.
async fn worker_loop(index: usize, tasks: Receiver<DeliveryTask>, poller: Arc<DeployStatusPoller>) {
    while let Ok(task) = tasks.recv_async().await {
        match task {
            DeliveryTask::PollDeploy {
                deploy_id,
                engine_app,
            } => match poller.poll_until_settled(deploy_id, &engine_app).await {
                Ok(status) => {
                    info!(worker = index, deploy = %deploy_id, ?status, "deploy settled")
                }
                Err(error) => {
                    warn!(worker = index, deploy = %deploy_id, %error, "deploy poll failed")
                }
            },
            DeliveryTask::ExecuteRelease(release) => match release.execute().await {
                Ok(record) => {
                    info!(worker = index, build = %record.id, status = ?record.status, "release finished")
                }
                Err(error) => warn!(worker = index, %error, "release failed"),
            },
        }
    }
    info!(worker = index, "task queue closed, worker exiting");
}

/// Builds launched by this process. The reaper sweeps the ledger and
/// frees slots whose worker died mid-run; entries whose slot is already
/// released, or owned by a newer build, are simply forgotten.
pub struct BuildLedger {
    coordinator: BuildCoordinator,
    active: Mutex<HashMap<String, Uuid>>,
}

impl BuildLedger {
    pub fn new(coordinator: BuildCoordinator) -> Self {
        Self {
            coordinator,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Remembers a launched build until a sweep sees its slot freed.
    pub async fn track(&self, signature: impl Into<String>, build_id: Uuid) {
        self.active.lock().await.insert(signature.into(), build_id);
    }

    /// Returns how many dead slots were freed.
    pub async fn sweep(&self) -> DeliveryResult<usize> {
        let entries: Vec<(String, Uuid)> = {
            let active = self.active.lock().await;
            active
                .iter()
                .map(|(signature, id)| (signature.clone(), *id))
                .collect()
        };

        let mut reaped = 0;
        for (signature, build_id) in entries {
            match self.coordinator.current_build(&signature).await? {
                Some(current) if current == build_id => {
                    if self.coordinator.reap_if_dead(&signature, build_id).await? {
                        warn!(%signature, build = %build_id, "freed the slot of a dead build");
                        reaped += 1;
                        self.active.lock().await.remove(&signature);
                    }
                }
                _ => {
                    self.active.lock().await.remove(&signature);
                }
            }
        }
        Ok(reaped)
    }
}

/// Confirms provider-side recycles on a fixed cadence.
pub fn spawn_recycler(recycler: Arc<RecyclingPoller>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match recycler.sweep().await {
                Ok(0) => {}
                Ok(dropped) => info!(dropped, "recycling sweep confirmed instances"),
                Err(error) => warn!(%error, "recycling sweep failed"),
            }
        }
    })
}

/// Frees build slots of workers that stopped heartbeating.
pub fn spawn_reaper(ledger: Arc<BuildLedger>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = ledger.sweep().await {
                warn!(%error, "build slot sweep failed");
            }
        }
    })
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
