pub mod client;
pub mod config;
pub mod error;
pub mod registry;

pub use client::ClusterClient;
pub use config::ClusterConfig;
pub use error::{ClusterError, ClusterResult};
pub use registry::ClusterRegistry;
