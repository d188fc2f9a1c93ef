use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StorageError;
use crate::lease::{BuildLeaseStore, LeaseSettings};
use crate::traits::{StorageHealth, StorageResult};

struct LeaseEntry {
    expires_at: Instant,
    build_id: Option<Uuid>,
    interrupted_at: Option<DateTime<Utc>>,
    heartbeat_at: Instant,
}

impl LeaseEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Single-process rendition of the build slot. Expiry is evaluated lazily
/// on access, mirroring how TTL-reaped keys simply stop existing.
#[derive(Clone)]
pub struct MemoryBuildLeaseStore {
    settings: LeaseSettings,
    slots: Arc<RwLock<HashMap<String, LeaseEntry>>>,
}

impl MemoryBuildLeaseStore {
    pub fn new(settings: LeaseSettings) -> Self {
        Self {
            settings,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl StorageHealth for MemoryBuildLeaseStore {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BuildLeaseStore for MemoryBuildLeaseStore {
    async fn acquire(&self, signature: &str) -> StorageResult<bool> {
        let mut slots = self.slots.write().await;
        if let Some(entry) = slots.get(signature) {
            if entry.is_live() {
                return Ok(false);
            }
            slots.remove(signature);
        }
        let now = Instant::now();
        slots.insert(
            signature.to_string(),
            LeaseEntry {
                expires_at: now + self.settings.ttl,
                build_id: None,
                interrupted_at: None,
                heartbeat_at: now,
            },
        );
        Ok(true)
    }

    async fn set_build(&self, signature: &str, build_id: Uuid) -> StorageResult<()> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(signature) {
            Some(entry) if entry.is_live() => {
                entry.build_id = Some(build_id);
                entry.heartbeat_at = Instant::now();
                Ok(())
            }
            _ => Err(StorageError::NotFound(signature.to_string())),
        }
    }

    async fn get_current_build(&self, signature: &str) -> StorageResult<Option<Uuid>> {
        let slots = self.slots.read().await;
        Ok(slots
            .get(signature)
            .filter(|entry| entry.is_live())
            .and_then(|entry| entry.build_id))
    }

    async fn set_interrupted(&self, signature: &str, ts: DateTime<Utc>) -> StorageResult<()> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(signature) {
            Some(entry) if entry.is_live() => {
                entry.interrupted_at = Some(ts);
                Ok(())
            }
            _ => Err(StorageError::NotFound(signature.to_string())),
        }
    }

    async fn get_interrupted_time(
        &self,
        signature: &str,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let slots = self.slots.read().await;
        Ok(slots
            .get(signature)
            .filter(|entry| entry.is_live())
            .and_then(|entry| entry.interrupted_at))
    }

    async fn release(&self, signature: &str, expected_build: Option<Uuid>) -> StorageResult<()> {
        let mut slots = self.slots.write().await;
        if let Some(expected) = expected_build {
            let stored = slots
                .get(signature)
                .filter(|entry| entry.is_live())
                .and_then(|entry| entry.build_id);
            if stored != Some(expected) {
                return Err(StorageError::Conflict(format!(
                    "build slot for {} is not held by {}",
                    signature, expected
                )));
            }
        }
        slots.remove(signature);
        Ok(())
    }

    async fn release_if_polling_timed_out(
        &self,
        signature: &str,
        build_id: Uuid,
    ) -> StorageResult<bool> {
        let mut slots = self.slots.write().await;
        let Some(entry) = slots.get(signature) else {
            return Ok(false);
        };
        if !entry.is_live() {
            slots.remove(signature);
            return Ok(false);
        }
        let silent_for = Instant::now().duration_since(entry.heartbeat_at);
        if entry.build_id == Some(build_id) && silent_for >= self.settings.heartbeat_timeout {
            slots.remove(signature);
            return Ok(true);
        }
        Ok(false)
    }
}
