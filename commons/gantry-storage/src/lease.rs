use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::traits::{StorageHealth, StorageResult};

/// TTL applied to every key of a signature's lease, and the heartbeat
/// silence after which a poller is presumed dead.
#[derive(Debug, Clone, Copy)]
pub struct LeaseSettings {
    pub ttl: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        LeaseSettings {
            ttl: Duration::from_secs(15 * 60),
            heartbeat_timeout: Duration::from_secs(90),
        }
    }
}

/// Distributed build slot per artifact signature. Four pieces of state
/// share one TTL: the mutex itself, the in-flight build ID, the
/// user-interruption timestamp, and the poller heartbeat.
#[async_trait]
pub trait BuildLeaseStore: Send + Sync + StorageHealth {
    /// Set-if-absent with TTL. True means this caller owns the slot.
    async fn acquire(&self, signature: &str) -> StorageResult<bool>;

    /// Records which build holds the slot and refreshes the heartbeat.
    async fn set_build(&self, signature: &str, build_id: Uuid) -> StorageResult<()>;
    async fn get_current_build(&self, signature: &str) -> StorageResult<Option<Uuid>>;

    async fn set_interrupted(&self, signature: &str, ts: DateTime<Utc>) -> StorageResult<()>;
    async fn get_interrupted_time(&self, signature: &str)
        -> StorageResult<Option<DateTime<Utc>>>;

    /// Clears every key of the slot. With `expected_build` set, the stored
    /// build must match or the release fails with `Conflict`.
    async fn release(&self, signature: &str, expected_build: Option<Uuid>) -> StorageResult<()>;

    /// Releases the slot only when `build_id` still holds it and no
    /// heartbeat arrived within the configured timeout. Returns whether a
    /// release happened.
    async fn release_if_polling_timed_out(
        &self,
        signature: &str,
        build_id: Uuid,
    ) -> StorageResult<bool>;
}
