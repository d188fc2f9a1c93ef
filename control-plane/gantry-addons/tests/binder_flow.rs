use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gantry_addons::{
    AddonBinder, AddonError, PlanSelector, ProvisionContext, RecyclingPoller, RemotePlan,
    RemoteProviderClient,
};
use gantry_models::{
    AppType, Application, EngineAppAttachment, Environment, Module, ModuleEnv, SourceOrigin,
    TenantMode, UnboundEngineAppAttachment,
};
use gantry_storage::memory::MemoryAttachmentStorage;
use gantry_storage::AttachmentStorage;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn application() -> Application {
    Application {
        id: Uuid::new_v4(),
        code: "demo".to_string(),
        name: "Demo".to_string(),
        region: "default".to_string(),
        tenant_mode: TenantMode::Single,
        tenant_id: "tenant-1".to_string(),
        app_type: AppType::CloudNative,
        is_plugin: false,
        is_smart: false,
        owner: "admin".to_string(),
        logo_url: None,
        is_deleted: false,
        created_at: Utc::now(),
    }
}

fn module(application: &Application) -> Module {
    Module {
        id: Uuid::new_v4(),
        application_id: application.id,
        name: "default".to_string(),
        language: "python".to_string(),
        source_origin: SourceOrigin::Vcs,
        is_default: true,
        creator: "admin".to_string(),
        created_at: Utc::now(),
    }
}

fn environments(module: &Module) -> Vec<ModuleEnv> {
    Environment::all()
        .into_iter()
        .map(|environment| ModuleEnv {
            id: Uuid::new_v4(),
            module_id: module.id,
            environment,
            engine_app_id: Uuid::new_v4(),
        })
        .collect()
}

fn context() -> ProvisionContext {
    ProvisionContext {
        app_code: "demo".to_string(),
        app_name: "Demo".to_string(),
        module_name: "default".to_string(),
        environment: Environment::Stag,
        egress_info: r#"{"ip":"10.0.0.9"}"#.to_string(),
        developers: vec!["alice".to_string()],
        monitoring_space_id: None,
    }
}

fn harness(server: &MockServer) -> (AddonBinder, Arc<MemoryAttachmentStorage>) {
    let storage = Arc::new(MemoryAttachmentStorage::new());
    let provider = Arc::new(
        RemoteProviderClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap(),
    );
    (AddonBinder::new(storage.clone(), provider), storage)
}

fn service_spec(version: &str) -> serde_json::Value {
    json!({
        "uuid": "svc-mysql",
        "name": "mysql",
        "version": version,
        "parameter_template": {
            "db_name": "{app_code}-{environment}"
        },
        "plans": [
            {"uuid": "basic", "name": "basic"},
            {"uuid": "gold", "name": "gold"}
        ]
    })
}

async fn mount_spec(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path("/services/mysql/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_spec(version)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn bind_creates_one_attachment_per_environment() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.1.0").await;
    let (binder, storage) = harness(&server);

    let app = application();
    let module = module(&app);
    let envs = environments(&module);

    let mut per_env = HashMap::new();
    per_env.insert(Environment::Stag, "basic".to_string());
    per_env.insert(Environment::Prod, "gold".to_string());

    let bound = binder
        .bind(
            &app,
            &module,
            &envs,
            "mysql",
            &PlanSelector::PerEnvironment(per_env),
        )
        .await
        .unwrap();
    assert_eq!(bound.module_id, module.id);
    assert_eq!(bound.tenant_id, "tenant-1");

    for env in &envs {
        let attachment = storage
            .get_engine_app_attachment(env.engine_app_id, "mysql")
            .await
            .unwrap()
            .unwrap();
        let expected = match env.environment {
            Environment::Stag => "basic",
            Environment::Prod => "gold",
        };
        assert_eq!(attachment.plan_id, expected);
        assert!(!attachment.is_provisioned());
    }
}

#[tokio::test]
async fn plan_change_on_provisioned_attachment_is_refused() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.1.0").await;
    let (binder, storage) = harness(&server);

    let app = application();
    let module = module(&app);
    let envs = environments(&module);

    storage
        .store_engine_app_attachment(&EngineAppAttachment {
            id: Uuid::new_v4(),
            engine_app_id: envs[0].engine_app_id,
            service_id: "mysql".to_string(),
            plan_id: "basic".to_string(),
            service_instance_id: Some("inst-1".to_string()),
        })
        .await
        .unwrap();

    let error = binder
        .bind(
            &app,
            &module,
            &envs,
            "mysql",
            &PlanSelector::Fixed("gold".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, AddonError::Conflict(_)));

    let kept = storage
        .get_engine_app_attachment(envs[0].engine_app_id, "mysql")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.plan_id, "basic");

    // Re-binding with the same plan is a no-op, not a conflict.
    binder
        .bind(
            &app,
            &module,
            &envs,
            "mysql",
            &PlanSelector::Fixed("basic".to_string()),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn provision_renders_template_and_is_idempotent() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.1.0").await;

    Mock::given(method("POST"))
        .and(path("/services/mysql/instances/"))
        .and(body_partial_json(json!({
            "plan_id": "basic",
            "params": {"db_name": "demo-stag"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"uuid": "inst-9"})))
        .expect(1)
        .mount(&server)
        .await;
    // 0.1.0 unlocks config sync, pushed right after provisioning.
    Mock::given(method("PUT"))
        .and(path("/services/mysql/instances/inst-9/config/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (binder, storage) = harness(&server);
    let app = application();
    let module = module(&app);
    let envs = environments(&module);

    binder
        .bind(
            &app,
            &module,
            &envs[..1],
            "mysql",
            &PlanSelector::Fixed("basic".to_string()),
        )
        .await
        .unwrap();

    let first = binder
        .provision(envs[0].engine_app_id, Some("mysql"), &context())
        .await
        .unwrap();
    assert_eq!(first, 1);

    let attachment = storage
        .get_engine_app_attachment(envs[0].engine_app_id, "mysql")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attachment.service_instance_id.as_deref(), Some("inst-9"));

    // Provisioned rows are skipped; the expect(1) above holds.
    let second = binder
        .provision(envs[0].engine_app_id, Some("mysql"), &context())
        .await
        .unwrap();
    assert_eq!(second, 0);
}

#[tokio::test]
async fn config_sync_is_skipped_below_the_version_floor() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.0.9").await;

    Mock::given(method("POST"))
        .and(path("/services/mysql/instances/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"uuid": "inst-9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/services/mysql/instances/inst-9/config/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (binder, storage) = harness(&server);
    let app = application();
    let module = module(&app);
    let envs = environments(&module);

    binder
        .bind(
            &app,
            &module,
            &envs[..1],
            "mysql",
            &PlanSelector::Fixed("basic".to_string()),
        )
        .await
        .unwrap();
    let provisioned = binder
        .provision(envs[0].engine_app_id, None, &context())
        .await
        .unwrap();
    assert_eq!(provisioned, 1);
    assert!(storage
        .get_engine_app_attachment(envs[0].engine_app_id, "mysql")
        .await
        .unwrap()
        .unwrap()
        .is_provisioned());
}

#[tokio::test]
async fn async_recycle_parks_the_row_until_the_provider_forgets() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.1.0").await;

    Mock::given(method("DELETE"))
        .and(path("/services/mysql/instances/inst-1/"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    // Still recycling on the first check, gone on the second.
    Mock::given(method("GET"))
        .and(path("/services/mysql/instances/inst-1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "inst-1"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/mysql/instances/inst-1/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (binder, storage) = harness(&server);
    let app = application();
    let module = module(&app);
    let envs = environments(&module);

    storage
        .store_engine_app_attachment(&EngineAppAttachment {
            id: Uuid::new_v4(),
            engine_app_id: envs[0].engine_app_id,
            service_id: "mysql".to_string(),
            plan_id: "basic".to_string(),
            service_instance_id: Some("inst-1".to_string()),
        })
        .await
        .unwrap();

    binder.unbind(module.id, &envs[..1], "mysql").await.unwrap();

    assert!(storage
        .get_engine_app_attachment(envs[0].engine_app_id, "mysql")
        .await
        .unwrap()
        .is_none());
    let parked = storage
        .get_unbound_attachment(envs[0].engine_app_id, "mysql")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parked.service_instance_id, "inst-1");

    let provider = Arc::new(
        RemoteProviderClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap(),
    );
    let poller = RecyclingPoller::new(storage.clone(), provider);

    assert_eq!(poller.sweep().await.unwrap(), 0);
    assert_eq!(poller.sweep().await.unwrap(), 1);
    assert!(storage
        .get_unbound_attachment(envs[0].engine_app_id, "mysql")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rebind_is_refused_while_a_recycle_is_pending() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.1.0").await;
    let (binder, storage) = harness(&server);

    let app = application();
    let module = module(&app);
    let envs = environments(&module);

    storage
        .store_unbound_attachment(&UnboundEngineAppAttachment {
            id: Uuid::new_v4(),
            engine_app_id: envs[0].engine_app_id,
            service_id: "mysql".to_string(),
            service_instance_id: "inst-1".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let error = binder
        .bind(
            &app,
            &module,
            &envs,
            "mysql",
            &PlanSelector::Fixed("basic".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(error, AddonError::Conflict(_)));
    assert!(storage
        .get_engine_app_attachment(envs[1].engine_app_id, "mysql")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn shared_bindings_forbid_transitive_references_and_guard_unbind() {
    let server = MockServer::start().await;
    mount_spec(&server, "0.1.0").await;
    let (binder, _storage) = harness(&server);

    let app = application();
    let owner = module(&app);
    let owner_envs = environments(&owner);
    let consumer = module(&app);
    let third = module(&app);

    binder
        .bind(
            &app,
            &owner,
            &owner_envs,
            "mysql",
            &PlanSelector::Fixed("basic".to_string()),
        )
        .await
        .unwrap();

    binder.share(consumer.id, owner.id, "mysql").await.unwrap();

    // The consumer only references the binding; it cannot be a source.
    let transitive = binder.share(third.id, consumer.id, "mysql").await.unwrap_err();
    assert!(matches!(transitive, AddonError::Validation(_)));

    // An unbound module cannot be referenced either.
    let unbound = binder.share(third.id, Uuid::new_v4(), "mysql").await.unwrap_err();
    assert!(matches!(unbound, AddonError::Validation(_)));

    let refused = binder
        .unbind(owner.id, &owner_envs, "mysql")
        .await
        .unwrap_err();
    assert!(matches!(refused, AddonError::Conflict(_)));

    binder.unshare(consumer.id, "mysql").await.unwrap();
    binder.unbind(owner.id, &owner_envs, "mysql").await.unwrap();
}

#[tokio::test]
async fn plan_upsert_is_gated_on_the_provider_version() {
    let locked_server = MockServer::start().await;
    mount_spec(&locked_server, "0.1.0").await;
    Mock::given(method("POST"))
        .and(path("/services/mysql/plans/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&locked_server)
        .await;

    let plan = RemotePlan {
        uuid: "silver".to_string(),
        name: "silver".to_string(),
        is_active: true,
        properties: serde_json::Value::Null,
    };

    let (locked_binder, _) = harness(&locked_server);
    let refused = locked_binder.upsert_plan("mysql", &plan).await.unwrap_err();
    assert!(matches!(refused, AddonError::Validation(_)));

    let open_server = MockServer::start().await;
    mount_spec(&open_server, "0.2.0").await;
    Mock::given(method("POST"))
        .and(path("/services/mysql/plans/"))
        .and(body_partial_json(json!({"uuid": "silver"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&open_server)
        .await;

    let (open_binder, _) = harness(&open_server);
    open_binder.upsert_plan("mysql", &plan).await.unwrap();
}
