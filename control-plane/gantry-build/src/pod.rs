use std::collections::BTreeMap;

use gantry_models::SmartBuildRecord;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, Pod, PodSpec, SecurityContext, Toleration,
};
use kube::api::ObjectMeta;

/// Platform-level settings for builder pods, one per region or cluster.
#[derive(Debug, Clone)]
pub struct BuilderTemplate {
    pub image: String,
    pub namespace: String,
    /// Some builder images need privileged mode for overlayfs.
    pub privileged: bool,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
}

/// Everything one builder run needs besides the template: where to pull
/// the source, where to push the artifact, and the record it serves.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub record: SmartBuildRecord,
    pub source_url: String,
    pub artifact_url: String,
}

impl BuildPlan {
    /// Deterministic per signature, so a concurrent duplicate shows up as
    /// a name collision in the cluster.
    pub fn pod_name(&self) -> String {
        format!("smart-builder-{}", &self.record.signature[..12.min(self.record.signature.len())])
    }
}

/// Assembles the builder pod. `restartPolicy=Never`: a failed build is
/// re-submitted by the platform, never restarted by the kubelet.
pub fn builder_pod(template: &BuilderTemplate, plan: &BuildPlan) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "gantry".to_string(),
    );
    labels.insert(
        "gantry.io/component".to_string(),
        "smart-builder".to_string(),
    );
    labels.insert(
        "gantry.io/build-id".to_string(),
        plan.record.id.to_string(),
    );

    let env = vec![
        env_var("SOURCE_GET_URL", &plan.source_url),
        env_var("ARTIFACT_PUT_URL", &plan.artifact_url),
        env_var("BUILD_SIGNATURE", &plan.record.signature),
    ];

    let security_context = template.privileged.then(|| SecurityContext {
        privileged: Some(true),
        ..Default::default()
    });

    Pod {
        metadata: ObjectMeta {
            name: Some(plan.pod_name()),
            namespace: Some(template.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "builder".to_string(),
                image: Some(template.image.clone()),
                env: Some(env),
                security_context,
                ..Default::default()
            }],
            restart_policy: Some("Never".to_string()),
            node_selector: (!template.node_selector.is_empty())
                .then(|| template.node_selector.clone()),
            tolerations: (!template.tolerations.is_empty())
                .then(|| template.tolerations.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_models::BuildSource;
    use uuid::Uuid;

    fn plan() -> BuildPlan {
        let record = SmartBuildRecord::new(
            Uuid::new_v4(),
            BuildSource::SmartPackage {
                package_name: "demo-1.0.tar.gz".to_string(),
            },
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "admin",
        );
        BuildPlan {
            record,
            source_url: "https://repo.example.com/demo-1.0.tar.gz".to_string(),
            artifact_url: "https://repo.example.com/demo-1.0.slug".to_string(),
        }
    }

    fn template() -> BuilderTemplate {
        BuilderTemplate {
            image: "gantry/smart-builder:latest".to_string(),
            namespace: "gantry-builds".to_string(),
            privileged: false,
            node_selector: BTreeMap::new(),
            tolerations: Vec::new(),
        }
    }

    #[test]
    fn pod_name_is_deterministic_per_signature() {
        assert_eq!(plan().pod_name(), "smart-builder-e3b0c44298fc");
    }

    #[test]
    fn privileged_flag_controls_security_context() {
        let plan = plan();
        let pod = builder_pod(&template(), &plan);
        let container = &pod.spec.as_ref().unwrap().containers[0];
        assert!(container.security_context.is_none());

        let mut privileged = template();
        privileged.privileged = true;
        let pod = builder_pod(&privileged, &plan);
        let container = &pod.spec.as_ref().unwrap().containers[0];
        assert_eq!(
            container.security_context.as_ref().unwrap().privileged,
            Some(true)
        );
    }

    #[test]
    fn pod_carries_build_identity() {
        let plan = plan();
        let pod = builder_pod(&template(), &plan);
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get("gantry.io/build-id"),
            Some(&plan.record.id.to_string())
        );
        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        let env = spec.containers[0].env.as_ref().unwrap();
        assert!(env
            .iter()
            .any(|v| v.name == "BUILD_SIGNATURE"
                && v.value.as_deref() == Some(plan.record.signature.as_str())));
    }
}
