//! Remote add-on services: binds modules to provider-sold backing
//! services, provisions and recycles instances through the provider's
//! REST API, and keeps shared bindings consistent across modules.

pub mod binder;
pub mod error;
pub mod plans;
pub mod provider;
pub mod recycler;

pub use binder::AddonBinder;
pub use error::{AddonError, AddonResult};
pub use plans::{select_plan, PlanSelector};
pub use provider::{
    ProviderFeatures, ProvisionContext, RecycleOutcome, RemotePlan, RemoteProviderClient,
    RemoteServiceSpec, ServiceInstance,
};
pub use recycler::RecyclingPoller;
