//! Ingress management for engine apps: desired-domain computation from
//! stored addresses and certificates, nginx path/snippet generation for
//! two controller generations, and reconciliation of the cluster
//! objects, including re-syncs of apps affected by address moves.

pub mod adaptor;
pub mod certs;
pub mod domains;
pub mod error;
pub mod plugins;
pub mod reconciler;
pub mod synth;

pub use adaptor::{adaptor_for, PathAdaptor, PlainPathAdaptor, RegexPathAdaptor};
pub use certs::{CertResolver, ResolvedCert};
pub use domains::{materialise_tls_secrets, shortest_path, DesiredDomain, DomainPlanner};
pub use error::{IngressError, IngressResult};
pub use plugins::IngressPlugin;
pub use reconciler::{IngressKind, IngressService, RoutingUpdater, SyncOptions};
pub use synth::{compose_snippet, strip_managed_snippet, PlatformIngress};
