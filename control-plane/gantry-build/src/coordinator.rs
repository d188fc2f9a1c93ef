use std::sync::Arc;

use chrono::{DateTime, Utc};
use gantry_storage::BuildLeaseStore;
use tracing::info;
use uuid::Uuid;

use crate::error::{BuildError, BuildResult};

/// Serialises builds per artifact signature on the shared lease store,
/// and carries the user-interruption flag between the API side and the
/// running task.
#[derive(Clone)]
pub struct BuildCoordinator {
    leases: Arc<dyn BuildLeaseStore>,
}

impl BuildCoordinator {
    pub fn new(leases: Arc<dyn BuildLeaseStore>) -> Self {
        Self { leases }
    }

    /// Takes the signature's slot for `build_id`, or refuses when a
    /// different build already holds it.
    pub async fn claim(&self, signature: &str, build_id: Uuid) -> BuildResult<()> {
        if !self.leases.acquire(signature).await? {
            return Err(BuildError::AlreadyInFlight(signature.to_string()));
        }
        self.leases.set_build(signature, build_id).await?;
        info!(%build_id, signature, "build slot claimed");
        Ok(())
    }

    /// Re-asserts the in-flight build, refreshing the heartbeat. Called
    /// at every step boundary so a silent worker reads as dead.
    pub async fn heartbeat(&self, signature: &str, build_id: Uuid) -> BuildResult<()> {
        self.leases.set_build(signature, build_id).await?;
        Ok(())
    }

    pub async fn current_build(&self, signature: &str) -> BuildResult<Option<Uuid>> {
        Ok(self.leases.get_current_build(signature).await?)
    }

    /// Flags the running build for cancellation; workers notice at the
    /// next step boundary.
    pub async fn interrupt(&self, signature: &str, ts: DateTime<Utc>) -> BuildResult<()> {
        self.leases.set_interrupted(signature, ts).await?;
        Ok(())
    }

    pub async fn interrupted_since(
        &self,
        signature: &str,
    ) -> BuildResult<Option<DateTime<Utc>>> {
        Ok(self.leases.get_interrupted_time(signature).await?)
    }

    /// Frees the slot. With `expected_build`, a holder mismatch is a hard
    /// error so a stale worker cannot free its successor's slot.
    pub async fn release(&self, signature: &str, expected_build: Option<Uuid>) -> BuildResult<()> {
        self.leases.release(signature, expected_build).await?;
        info!(signature, "build slot released");
        Ok(())
    }

    /// Frees a slot whose holder stopped heartbeating. Returns whether a
    /// release happened.
    pub async fn reap_if_dead(&self, signature: &str, build_id: Uuid) -> BuildResult<bool> {
        let released = self
            .leases
            .release_if_polling_timed_out(signature, build_id)
            .await?;
        if released {
            info!(%build_id, signature, "released slot of a dead worker");
        }
        Ok(released)
    }
}
