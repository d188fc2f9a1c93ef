use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Application manifest consumed by the cloud-native operator. The
/// platform writes spec and annotations; the operator owns status.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "paas.bk.tencent.com",
    version = "v1alpha1",
    kind = "BkApp",
    plural = "bkapps",
    namespaced,
    status = "BkAppStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BkAppSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<ProcessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HooksSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<AppConfigurationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_overlay: Option<EnvOverlaySpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HooksSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_release: Option<HookSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HookSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct AppConfigurationSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub struct EnvVarSpec {
    pub name: String,
    pub value: String,
}

impl EnvVarSpec {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvOverlaySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<Vec<ReplicasOverlay>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_variables: Option<Vec<EnvVarOverlay>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReplicasOverlay {
    pub env_name: String,
    pub process: String,
    pub count: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarOverlay {
    pub env_name: String,
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BkAppStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<BkAppPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<BkAppCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum BkAppPhase {
    Pending,
    Running,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BkAppCondition {
    #[serde(rename = "type")]
    pub type_: BkAppConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum BkAppConditionType {
    AppAvailable,
    AppProgressing,
    AddOnsProvisioned,
    HooksFinished,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Mirrors the routing state of one engine app into a single object the
/// operator turns into ingresses.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "paas.bk.tencent.com",
    version = "v1alpha1",
    kind = "DomainGroupMapping",
    plural = "domaingroupmappings",
    namespaced
)]
pub struct DomainGroupMappingSpec {
    #[serde(rename = "ref")]
    pub reference: MappingRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DomainGroup>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct MappingRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainGroup {
    pub source_type: DomainSourceType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<MappedDomain>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DomainSourceType {
    Subdomain,
    Subpath,
    Custom,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MappedDomain {
    pub host: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_prefix_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
    /// Disambiguates custom domains sharing one hostname; unset for the
    /// other source types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bkapp_round_trips_through_wire_names() {
        let manifest = json!({
            "apiVersion": "paas.bk.tencent.com/v1alpha1",
            "kind": "BkApp",
            "metadata": {"name": "demo"},
            "spec": {
                "processes": [{
                    "name": "web",
                    "image": "nginx:latest",
                    "replicas": 2,
                    "targetPort": 5000,
                    "imagePullPolicy": "IfNotPresent",
                }],
                "hooks": {"preRelease": {"command": ["python"], "args": ["manage.py", "migrate"]}},
                "configuration": {"env": [{"name": "FOO", "value": "bar"}]},
                "envOverlay": {
                    "replicas": [{"envName": "stag", "process": "web", "count": 1}],
                },
            },
            "status": {
                "phase": "Running",
                "observedGeneration": 3,
                "conditions": [{
                    "type": "AppAvailable",
                    "status": "True",
                    "reason": "AppAvailable",
                    "message": "all good",
                    "observedGeneration": 3,
                }],
                "lastUpdate": "2024-05-01T10:00:00Z",
            },
        });
        let bkapp: BkApp = serde_json::from_value(manifest).unwrap();
        assert_eq!(bkapp.spec.processes[0].target_port, Some(5000));
        assert_eq!(
            bkapp.spec.env_overlay.as_ref().unwrap().replicas.as_ref().unwrap()[0].env_name,
            "stag"
        );
        let status = bkapp.status.as_ref().unwrap();
        assert_eq!(status.phase, Some(BkAppPhase::Running));
        assert_eq!(status.conditions[0].type_, BkAppConditionType::AppAvailable);

        let wire = serde_json::to_value(&bkapp).unwrap();
        assert_eq!(wire["spec"]["processes"][0]["targetPort"], 5000);
        assert_eq!(wire["spec"]["hooks"]["preRelease"]["command"][0], "python");
        assert_eq!(wire["status"]["conditions"][0]["type"], "AppAvailable");
    }

    #[test]
    fn unknown_condition_types_do_not_fail_parsing() {
        let condition = json!({"type": "SomethingNew", "status": "False"});
        let parsed: BkAppCondition = serde_json::from_value(condition).unwrap();
        assert_eq!(parsed.type_, BkAppConditionType::Unknown);
    }

    #[test]
    fn mapping_serialises_ref_and_source_types() {
        let mapping = DomainGroupMapping::new(
            "demo-stag",
            DomainGroupMappingSpec {
                reference: MappingRef {
                    name: "demo-stag".to_string(),
                    kind: Some("BkApp".to_string()),
                },
                data: vec![DomainGroup {
                    source_type: DomainSourceType::Subpath,
                    domains: vec![MappedDomain {
                        host: "apps.example.com".to_string(),
                        path_prefix_list: vec!["/stag--demo".to_string()],
                        tls_secret_name: None,
                        name: None,
                    }],
                }],
            },
        );
        let wire = serde_json::to_value(&mapping).unwrap();
        assert_eq!(wire["spec"]["ref"]["name"], "demo-stag");
        assert_eq!(wire["spec"]["data"][0]["sourceType"], "subpath");
        assert_eq!(
            wire["spec"]["data"][0]["domains"][0]["pathPrefixList"][0],
            "/stag--demo"
        );
    }
}
