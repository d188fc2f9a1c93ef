//! Wires the delivery subsystems into one runnable core: environment
//! configuration, storage and cluster clients, the background worker
//! pool, and the teardown and address facades the API layer calls.

pub mod addresses;
pub mod config;
pub mod error;
pub mod runtime;
pub mod sources;
pub mod teardown;
pub mod workers;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use addresses::AddressDirectory;
pub use config::{DeliveryConfig, RegistryCredential};
pub use error::{DeliveryError, DeliveryResult};
pub use runtime::{run_all, DeliveryCore};
pub use sources::PlatformSources;
pub use teardown::{IngressRemover, ModuleTeardown};
pub use workers::{
    shutdown_signal, spawn_reaper, spawn_recycler, spawn_workers, BuildLedger, DeliveryTask,
    TaskQueue,
};

/// Installs the global subscriber once; `RUST_LOG` overrides the
/// default directive. Safe to call repeatedly.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy()
        .add_directive(
            default_directive
                .parse()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        );

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
