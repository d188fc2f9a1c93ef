pub mod addressing;
pub mod application;
pub mod builds;
pub mod certs;
pub mod enums;
pub mod manifests;
pub mod services;
pub mod validation;

pub use addressing::*;
pub use application::*;
pub use builds::*;
pub use certs::*;
pub use enums::*;
pub use manifests::*;
pub use services::*;
pub use validation::*;
