use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etcd_client::{
    Client, Compare, CompareOp, DeleteOptions, GetOptions, PutOptions, Txn, TxnOp,
};
use uuid::Uuid;

use crate::error::StorageError;
use crate::lease::{BuildLeaseStore, LeaseSettings};
use crate::traits::{StorageHealth, StorageResult};

use super::EtcdStorage;

/// Build slot coordination on etcd leases. Every slot key is attached to
/// the etcd lease granted at acquisition, so a crashed holder's keys
/// vanish when the lease TTL runs out.
#[derive(Clone)]
pub struct EtcdBuildLeaseStore {
    client: Client,
    key_prefix: String,
    settings: LeaseSettings,
}

impl EtcdBuildLeaseStore {
    pub fn new(storage: &EtcdStorage, settings: LeaseSettings) -> Self {
        Self {
            client: storage.client.clone(),
            key_prefix: storage.key_prefix.clone(),
            settings,
        }
    }

    fn slot_prefix(&self, signature: &str) -> String {
        format!("{}/build-leases/{}/", self.key_prefix, signature)
    }

    fn slot_key(&self, signature: &str, field: &str) -> String {
        format!("{}{}", self.slot_prefix(signature), field)
    }

    async fn read(&self, key: String) -> StorageResult<Option<String>> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(kv.value_str()?.to_string())),
            None => Ok(None),
        }
    }

    /// Lease ID recorded under the mutex key, or NotFound when nobody
    /// holds the slot (including the expired case, where etcd has
    /// already dropped the keys).
    async fn holder_lease(&self, signature: &str) -> StorageResult<i64> {
        let raw = self
            .read(self.slot_key(signature, "mutex"))
            .await?
            .ok_or_else(|| StorageError::NotFound(signature.to_string()))?;
        raw.parse::<i64>()
            .map_err(|e| StorageError::Internal(format!("corrupt lease id: {e}")))
    }

    async fn put_slot_field(
        &self,
        signature: &str,
        field: &str,
        value: String,
        lease_id: i64,
    ) -> StorageResult<()> {
        let mut client = self.client.clone();
        client
            .put(
                self.slot_key(signature, field),
                value,
                Some(PutOptions::new().with_lease(lease_id)),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StorageHealth for EtcdBuildLeaseStore {
    async fn health(&self) -> StorageResult<()> {
        let mut client = self.client.clone();
        client
            .get(
                format!("{}/build-leases/", self.key_prefix),
                Some(GetOptions::new().with_prefix().with_count_only()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BuildLeaseStore for EtcdBuildLeaseStore {
    async fn acquire(&self, signature: &str) -> StorageResult<bool> {
        let mut client = self.client.clone();
        let grant = client
            .lease_grant(self.settings.ttl.as_secs() as i64, None)
            .await?;
        let lease_id = grant.id();

        let mutex_key = self.slot_key(signature, "mutex");
        let resp = client
            .txn(
                Txn::new()
                    .when([Compare::create_revision(
                        mutex_key.clone(),
                        CompareOp::Equal,
                        0,
                    )])
                    .and_then([
                        TxnOp::put(
                            mutex_key,
                            lease_id.to_string(),
                            Some(PutOptions::new().with_lease(lease_id)),
                        ),
                        TxnOp::put(
                            self.slot_key(signature, "heartbeat"),
                            Utc::now().to_rfc3339(),
                            Some(PutOptions::new().with_lease(lease_id)),
                        ),
                    ]),
            )
            .await?;

        if !resp.succeeded() {
            client.lease_revoke(lease_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn set_build(&self, signature: &str, build_id: Uuid) -> StorageResult<()> {
        let lease_id = self.holder_lease(signature).await?;
        self.put_slot_field(signature, "build", build_id.to_string(), lease_id)
            .await?;
        self.put_slot_field(signature, "heartbeat", Utc::now().to_rfc3339(), lease_id)
            .await
    }

    async fn get_current_build(&self, signature: &str) -> StorageResult<Option<Uuid>> {
        let Some(raw) = self.read(self.slot_key(signature, "build")).await? else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&raw)
            .map_err(|e| StorageError::Internal(format!("corrupt build id: {e}")))?;
        Ok(Some(id))
    }

    async fn set_interrupted(&self, signature: &str, ts: DateTime<Utc>) -> StorageResult<()> {
        let lease_id = self.holder_lease(signature).await?;
        self.put_slot_field(signature, "interrupted", ts.to_rfc3339(), lease_id)
            .await
    }

    async fn get_interrupted_time(&self, signature: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.read(self.slot_key(signature, "interrupted")).await? else {
            return Ok(None);
        };
        let ts = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| StorageError::Internal(format!("corrupt timestamp: {e}")))?;
        Ok(Some(ts.with_timezone(&Utc)))
    }

    async fn release(&self, signature: &str, expected_build: Option<Uuid>) -> StorageResult<()> {
        let mut client = self.client.clone();
        let prefix = self.slot_prefix(signature);

        let Some(expected) = expected_build else {
            client
                .delete(prefix, Some(DeleteOptions::new().with_prefix()))
                .await?;
            return Ok(());
        };

        let resp = client
            .txn(
                Txn::new()
                    .when([Compare::value(
                        self.slot_key(signature, "build"),
                        CompareOp::Equal,
                        expected.to_string(),
                    )])
                    .and_then([TxnOp::delete(
                        prefix,
                        Some(DeleteOptions::new().with_prefix()),
                    )]),
            )
            .await?;
        if !resp.succeeded() {
            return Err(StorageError::Conflict(format!(
                "build slot for {signature} is not held by {expected}"
            )));
        }
        Ok(())
    }

    async fn release_if_polling_timed_out(
        &self,
        signature: &str,
        build_id: Uuid,
    ) -> StorageResult<bool> {
        let heartbeat_key = self.slot_key(signature, "heartbeat");
        let Some(raw_heartbeat) = self.read(heartbeat_key.clone()).await? else {
            return Ok(false);
        };
        let last = DateTime::parse_from_rfc3339(&raw_heartbeat)
            .map_err(|e| StorageError::Internal(format!("corrupt timestamp: {e}")))?
            .with_timezone(&Utc);
        let silence = Utc::now()
            .signed_duration_since(last)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if silence < self.settings.heartbeat_timeout {
            return Ok(false);
        }
        match self.get_current_build(signature).await? {
            Some(current) if current == build_id => {}
            _ => return Ok(false),
        }

        let mut client = self.client.clone();
        let resp = client
            .txn(
                Txn::new()
                    .when([Compare::value(
                        heartbeat_key,
                        CompareOp::Equal,
                        raw_heartbeat,
                    )])
                    .and_then([TxnOp::delete(
                        self.slot_prefix(signature),
                        Some(DeleteOptions::new().with_prefix()),
                    )]),
            )
            .await?;
        Ok(resp.succeeded())
    }
}
