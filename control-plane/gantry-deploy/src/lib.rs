//! Cloud-native deploys: turns a stored manifest revision into the
//! `BkApp` and `DomainGroupMapping` objects a tenant cluster runs,
//! applies them in dependency order, and polls the operator's verdict
//! back into the deploy record.

pub mod assembler;
pub mod crd;
pub mod deployer;
pub mod error;
pub mod poller;

pub use assembler::{
    AddonNameSource, AssembledDeploy, BuiltinEnvSource, DeployContext, ImageCredentialSource,
    ManifestAssembler,
};
pub use crd::{BkApp, BkAppSpec, BkAppStatus, DomainGroupMapping, DomainGroupMappingSpec};
pub use deployer::ManifestDeployer;
pub use error::{DeployError, DeployResult};
pub use poller::{observe, DeployStatusPoller, PollerSettings, Verdict};
