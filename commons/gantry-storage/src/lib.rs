pub mod error;
pub mod factory;
pub mod lease;
pub mod traits;

#[cfg(feature = "etcd")]
pub mod etcd;
#[cfg(feature = "memory")]
pub mod memory;

pub use error::StorageError;
pub use factory::{
    build_storage, EtcdOptions, StorageBackend, StorageHandles, StorageOptions,
};
pub use lease::{BuildLeaseStore, LeaseSettings};
pub use traits::*;

#[cfg(feature = "memory")]
pub use factory::memory_handles;
