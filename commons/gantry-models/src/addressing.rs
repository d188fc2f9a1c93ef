use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{AddressSource, AddressType};
use crate::validation::{normalize_path_prefix, validate_hostname, ValidationError};

fn root_path() -> String {
    "/".to_string()
}

/// A platform-managed domain row. `(region, host, path_prefix)` is globally
/// unique; only `independent` rows may carry a non-root path prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDomain {
    pub id: Uuid,
    pub engine_app_id: Uuid,
    pub region: String,
    pub host: String,
    #[serde(default = "root_path")]
    pub path_prefix: String,
    pub source: AddressSource,
    #[serde(default)]
    pub https_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_cert_id: Option<Uuid>,
}

impl AppDomain {
    pub fn validate_business_rules(&self) -> Result<(), ValidationError> {
        validate_hostname(&self.host)?;
        let normalized = normalize_path_prefix(&self.path_prefix)?;
        if normalized != "/" && self.source != AddressSource::Independent {
            return Err(ValidationError::InvalidPathPrefix(
                self.path_prefix.clone(),
            ));
        }
        Ok(())
    }
}

/// Shared-domain subpath owned by one engine app. `(region, subpath)` is
/// globally unique; reassignment moves ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSubpath {
    pub id: Uuid,
    pub engine_app_id: Uuid,
    pub region: String,
    pub subpath: String,
}

/// End-user registered domain bound to one (module, environment) via its
/// engine app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomDomain {
    pub id: Uuid,
    pub engine_app_id: Uuid,
    pub host: String,
    #[serde(default = "root_path")]
    pub path_prefix: String,
    #[serde(default)]
    pub https_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_id: Option<Uuid>,
}

impl CustomDomain {
    pub fn validate_business_rules(&self) -> Result<(), ValidationError> {
        validate_hostname(&self.host)?;
        normalize_path_prefix(&self.path_prefix).map(|_| ())
    }
}

/// A client-visible URL of one environment, ranked by address kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExposedUrl {
    pub address_type: AddressType,
    pub url: String,
}

impl ExposedUrl {
    pub fn new(address_type: AddressType, https: bool, host: &str, path: &str) -> Self {
        let scheme = if https { "https" } else { "http" };
        ExposedUrl {
            address_type,
            url: format!("{scheme}://{host}{path}"),
        }
    }
}
