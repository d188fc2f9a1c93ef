use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::StorageError;
use crate::lease::{BuildLeaseStore, LeaseSettings};
use crate::traits::{
    ApplicationStorage, AttachmentStorage, BuildStorage, CertStorage, ManifestStorage,
    RoutingStorage,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Memory,
    Etcd,
}

impl FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "etcd" => Ok(StorageBackend::Etcd),
            other => Err(StorageError::Backend(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EtcdOptions {
    pub endpoints: Vec<String>,
    pub key_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl Default for EtcdOptions {
    fn default() -> Self {
        EtcdOptions {
            endpoints: vec!["http://localhost:2379".to_string()],
            key_prefix: "/gantry".to_string(),
            username: None,
            password: None,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub backend: StorageBackend,
    pub etcd: Option<EtcdOptions>,
    pub lease: LeaseSettings,
}

/// One handle per aggregate. Backends that cover several aggregates hand
/// out clones of themselves.
#[derive(Clone)]
pub struct StorageHandles {
    pub applications: Arc<dyn ApplicationStorage>,
    pub routing: Arc<dyn RoutingStorage>,
    pub certs: Arc<dyn CertStorage>,
    pub manifests: Arc<dyn ManifestStorage>,
    pub builds: Arc<dyn BuildStorage>,
    pub attachments: Arc<dyn AttachmentStorage>,
    pub build_leases: Arc<dyn BuildLeaseStore>,
}

#[cfg(feature = "memory")]
pub fn memory_handles(lease: LeaseSettings) -> StorageHandles {
    use crate::memory::*;

    StorageHandles {
        applications: Arc::new(MemoryApplicationStorage::new()),
        routing: Arc::new(MemoryRoutingStorage::new()),
        certs: Arc::new(MemoryCertStorage::new()),
        manifests: Arc::new(MemoryManifestStorage::new()),
        builds: Arc::new(MemoryBuildStorage::new()),
        attachments: Arc::new(MemoryAttachmentStorage::new()),
        build_leases: Arc::new(MemoryBuildLeaseStore::new(lease)),
    }
}

pub async fn build_storage(options: &StorageOptions) -> Result<StorageHandles, StorageError> {
    match options.backend {
        #[cfg(feature = "memory")]
        StorageBackend::Memory => {
            info!("initializing in-memory storage");
            Ok(memory_handles(options.lease))
        }
        #[cfg(feature = "etcd")]
        StorageBackend::Etcd => {
            let etcd = options.etcd.clone().unwrap_or_default();
            info!(endpoints = ?etcd.endpoints, prefix = %etcd.key_prefix, "initializing etcd storage");
            let storage = crate::etcd::EtcdStorage::connect(&etcd).await?;
            let leases = crate::etcd::EtcdBuildLeaseStore::new(&storage, options.lease);
            Ok(StorageHandles {
                applications: Arc::new(storage.clone()),
                routing: Arc::new(storage.clone()),
                certs: Arc::new(storage.clone()),
                manifests: Arc::new(storage.clone()),
                builds: Arc::new(storage.clone()),
                attachments: Arc::new(storage),
                build_leases: Arc::new(leases),
            })
        }
        #[allow(unreachable_patterns)]
        other => Err(StorageError::Backend(format!(
            "storage backend {other:?} is not compiled into this build"
        ))),
    }
}
