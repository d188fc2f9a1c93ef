use std::collections::BTreeMap;
use std::time::Duration;

use gantry_models::Environment;
use reqwest::{Method, StatusCode};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{AddonError, AddonResult};

/// What a provider self-reports for one of its services: identity, the
/// feature-gating version, the parameter template for provisioning, and
/// the plans it sells.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteServiceSpec {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub parameter_template: BTreeMap<String, String>,
    #[serde(default)]
    pub plans: Vec<RemotePlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemotePlan {
    pub uuid: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub properties: Value,
}

fn default_active() -> bool {
    true
}

/// A provisioned instance as the provider reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInstance {
    pub uuid: String,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    #[serde(default)]
    pub config: Value,
}

/// Whether a delete call finished the recycle or merely started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleOutcome {
    Completed,
    Pending,
}

/// Extended APIs unlocked by the version a service reports. An
/// unparseable report gates everything off.
#[derive(Debug, Clone)]
pub struct ProviderFeatures {
    version: Version,
}

impl ProviderFeatures {
    pub fn from_report(report: &str) -> Self {
        let version = match Version::parse(report.trim()) {
            Ok(version) => version,
            Err(_) => {
                warn!(report, "unparseable provider version, extended APIs disabled");
                Version::new(0, 0, 0)
            }
        };
        Self { version }
    }

    pub fn supports_instance_config_sync(&self) -> bool {
        self.version >= Version::new(0, 1, 0)
    }

    pub fn supports_plan_upsert(&self) -> bool {
        self.version >= Version::new(0, 2, 0)
    }
}

impl RemoteServiceSpec {
    pub fn features(&self) -> ProviderFeatures {
        ProviderFeatures::from_report(&self.version)
    }
}

/// App identity handed to the provider when an instance is created.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub app_code: String,
    pub app_name: String,
    pub module_name: String,
    pub environment: Environment,
    /// Egress identity of the serving cluster, forwarded verbatim so
    /// providers can allowlist it.
    pub egress_info: String,
    pub developers: Vec<String>,
    pub monitoring_space_id: Option<String>,
}

impl ProvisionContext {
    /// The substitution values for template rendering, all stringly typed
    /// the way providers consume them.
    pub fn identity(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("app_code".to_string(), self.app_code.clone());
        map.insert("app_name".to_string(), self.app_name.clone());
        map.insert("module_name".to_string(), self.module_name.clone());
        map.insert(
            "environment".to_string(),
            self.environment.as_str().to_string(),
        );
        map.insert("egress_info".to_string(), self.egress_info.clone());
        map.insert(
            "developers".to_string(),
            serde_json::to_string(&self.developers).unwrap_or_default(),
        );
        map.insert(
            "monitoring_space_id".to_string(),
            self.monitoring_space_id.clone().unwrap_or_default(),
        );
        map
    }

    /// Substitutes `{placeholder}` occurrences in every template value.
    /// Unknown placeholders pass through untouched.
    pub fn render(&self, template: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let identity = self.identity();
        template
            .iter()
            .map(|(key, value)| {
                let mut rendered = value.clone();
                for (name, actual) in &identity {
                    rendered = rendered.replace(&format!("{{{name}}}"), actual);
                }
                (key.clone(), rendered)
            })
            .collect()
    }
}

#[derive(Serialize)]
struct ProvisionRequest<'a> {
    plan_id: &'a str,
    params: &'a BTreeMap<String, String>,
}

/// JSON client for one add-on provider. Endpoints are joined onto a
/// trailing-slash-normalised base URL.
#[derive(Clone)]
pub struct RemoteProviderClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteProviderClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> AddonResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub async fn service_spec(&self, service_id: &str) -> AddonResult<RemoteServiceSpec> {
        let url = format!("{}/services/{service_id}/", self.base_url);
        let response = self.request(Method::GET, &url).send().await?;
        let response = ensure_success(response, &format!("service {service_id}")).await?;
        Ok(response.json().await?)
    }

    pub async fn provision(
        &self,
        service_id: &str,
        plan_id: &str,
        params: &BTreeMap<String, String>,
    ) -> AddonResult<ServiceInstance> {
        let url = format!("{}/services/{service_id}/instances/", self.base_url);
        let response = self
            .request(Method::POST, &url)
            .json(&ProvisionRequest { plan_id, params })
            .send()
            .await?;
        let response = ensure_success(response, &format!("service {service_id}")).await?;
        Ok(response.json().await?)
    }

    /// `None` means the provider no longer knows the instance.
    pub async fn get_instance(
        &self,
        service_id: &str,
        instance_id: &str,
    ) -> AddonResult<Option<ServiceInstance>> {
        let url = format!(
            "{}/services/{service_id}/instances/{instance_id}/",
            self.base_url
        );
        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, &format!("instance {instance_id}")).await?;
        Ok(Some(response.json().await?))
    }

    /// 202 means the provider recycles asynchronously; an already-gone
    /// instance counts as completed.
    pub async fn delete_instance(
        &self,
        service_id: &str,
        instance_id: &str,
    ) -> AddonResult<RecycleOutcome> {
        let url = format!(
            "{}/services/{service_id}/instances/{instance_id}/",
            self.base_url
        );
        let response = self.request(Method::DELETE, &url).send().await?;
        match response.status() {
            StatusCode::ACCEPTED => Ok(RecycleOutcome::Pending),
            StatusCode::NOT_FOUND => Ok(RecycleOutcome::Completed),
            status if status.is_success() => Ok(RecycleOutcome::Completed),
            status => Err(AddonError::Provider {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Extended API, gated on `supports_instance_config_sync`.
    pub async fn update_instance_config(
        &self,
        service_id: &str,
        instance_id: &str,
        config: &BTreeMap<String, String>,
    ) -> AddonResult<()> {
        let url = format!(
            "{}/services/{service_id}/instances/{instance_id}/config/",
            self.base_url
        );
        let response = self.request(Method::PUT, &url).json(config).send().await?;
        ensure_success(response, &format!("instance {instance_id}")).await?;
        Ok(())
    }

    /// Extended API, gated on `supports_plan_upsert`. The provider upserts
    /// by plan UUID.
    pub async fn upsert_plan(&self, service_id: &str, plan: &RemotePlan) -> AddonResult<()> {
        let url = format!("{}/services/{service_id}/plans/", self.base_url);
        let response = self.request(Method::POST, &url).json(plan).send().await?;
        ensure_success(response, &format!("service {service_id}")).await?;
        Ok(())
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn ensure_success(
    response: reqwest::Response,
    entity: &str,
) -> AddonResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => AddonError::NotFound(entity.to_string()),
        StatusCode::CONFLICT => AddonError::Conflict(message),
        _ => AddonError::Provider {
            status: status.as_u16(),
            message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_floors_gate_extended_apis() {
        let none = ProviderFeatures::from_report("0.0.9");
        assert!(!none.supports_instance_config_sync());
        assert!(!none.supports_plan_upsert());

        let config_sync = ProviderFeatures::from_report("0.1.0");
        assert!(config_sync.supports_instance_config_sync());
        assert!(!config_sync.supports_plan_upsert());

        let full = ProviderFeatures::from_report("1.3.2");
        assert!(full.supports_instance_config_sync());
        assert!(full.supports_plan_upsert());
    }

    #[test]
    fn garbage_version_report_disables_everything() {
        let features = ProviderFeatures::from_report("latest");
        assert!(!features.supports_instance_config_sync());
        assert!(!features.supports_plan_upsert());
    }

    #[test]
    fn context_renders_template_placeholders() {
        let context = ProvisionContext {
            app_code: "demo".to_string(),
            app_name: "Demo".to_string(),
            module_name: "default".to_string(),
            environment: Environment::Prod,
            egress_info: r#"{"ip":"10.0.0.9"}"#.to_string(),
            developers: vec!["alice".to_string()],
            monitoring_space_id: None,
        };
        let mut template = BTreeMap::new();
        template.insert(
            "db_name".to_string(),
            "{app_code}-{module_name}-{environment}".to_string(),
        );
        template.insert("allowlist".to_string(), "{egress_info}".to_string());
        template.insert("unknown".to_string(), "{not_a_key}".to_string());

        let rendered = context.render(&template);
        assert_eq!(rendered["db_name"], "demo-default-prod");
        assert_eq!(rendered["allowlist"], r#"{"ip":"10.0.0.9"}"#);
        assert_eq!(rendered["unknown"], "{not_a_key}");
    }

    #[test]
    fn plan_activity_defaults_on() {
        let plan: RemotePlan =
            serde_json::from_str(r#"{"uuid":"p1","name":"basic"}"#).unwrap();
        assert!(plan.is_active);
    }
}
