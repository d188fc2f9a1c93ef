use chrono::Utc;
use gantry_models::{
    AddressSource, AppDomain, AppModelDeploy, AppModelRevision, AppType, Application,
    DeployStatus, EngineAppAttachment, Environment, Module, ModuleEnv, SourceOrigin, TenantMode,
};
use gantry_storage::memory::{
    MemoryApplicationStorage, MemoryAttachmentStorage, MemoryManifestStorage,
    MemoryRoutingStorage,
};
use gantry_storage::{
    ApplicationStorage, AttachmentFilter, AttachmentStorage, ManifestStorage, RoutingStorage,
    StorageError,
};
use uuid::Uuid;

fn sample_app(code: &str) -> Application {
    Application {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: code.to_string(),
        region: "default".to_string(),
        tenant_mode: TenantMode::Global,
        tenant_id: String::new(),
        app_type: AppType::Default,
        is_plugin: false,
        is_smart: false,
        owner: "admin".to_string(),
        logo_url: None,
        is_deleted: false,
        created_at: Utc::now(),
    }
}

fn sample_module(application_id: Uuid, name: &str, is_default: bool) -> Module {
    Module {
        id: Uuid::new_v4(),
        application_id,
        name: name.to_string(),
        language: "python".to_string(),
        source_origin: SourceOrigin::Vcs,
        is_default,
        creator: "admin".to_string(),
        created_at: Utc::now(),
    }
}

fn sample_domain(engine_app_id: Uuid, host: &str) -> AppDomain {
    AppDomain {
        id: Uuid::new_v4(),
        engine_app_id,
        region: "default".to_string(),
        host: host.to_string(),
        path_prefix: "/".to_string(),
        source: AddressSource::AutoGen,
        https_enabled: false,
        cert_id: None,
        shared_cert_id: None,
    }
}

fn sample_revision(module_id: Uuid) -> AppModelRevision {
    AppModelRevision {
        id: Uuid::new_v4(),
        module_id,
        manifest: serde_json::json!({"spec": {"processes": []}}),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn app_code_stays_reserved_after_soft_delete() {
    let storage = MemoryApplicationStorage::new();
    let app = sample_app("demo");
    storage.store_application(&app).await.unwrap();

    storage.mark_application_deleted(app.id).await.unwrap();
    assert!(storage
        .get_application_by_code("demo")
        .await
        .unwrap()
        .is_none());

    let second = sample_app("demo");
    assert!(matches!(
        storage.store_application(&second).await,
        Err(StorageError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn default_module_is_unique_within_application() {
    let storage = MemoryApplicationStorage::new();
    let application_id = Uuid::new_v4();

    storage
        .store_module(&sample_module(application_id, "default", true))
        .await
        .unwrap();

    assert!(matches!(
        storage
            .store_module(&sample_module(application_id, "worker", true))
            .await,
        Err(StorageError::Conflict(_))
    ));
    assert!(matches!(
        storage
            .store_module(&sample_module(application_id, "default", false))
            .await,
        Err(StorageError::AlreadyExists(_))
    ));

    storage
        .store_module(&sample_module(application_id, "worker", false))
        .await
        .unwrap();
    assert_eq!(storage.list_modules(application_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn module_env_is_unique_per_environment() {
    let storage = MemoryApplicationStorage::new();
    let module_id = Uuid::new_v4();

    let stag = ModuleEnv {
        id: Uuid::new_v4(),
        module_id,
        environment: Environment::Stag,
        engine_app_id: Uuid::new_v4(),
    };
    storage.store_module_env(&stag).await.unwrap();

    let dup = ModuleEnv {
        id: Uuid::new_v4(),
        ..stag.clone()
    };
    assert!(matches!(
        storage.store_module_env(&dup).await,
        Err(StorageError::AlreadyExists(_))
    ));

    let prod = ModuleEnv {
        id: Uuid::new_v4(),
        environment: Environment::Prod,
        ..stag.clone()
    };
    storage.store_module_env(&prod).await.unwrap();
    assert_eq!(storage.list_module_envs(module_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_domain_address_is_rejected() {
    let storage = MemoryRoutingStorage::new();
    let domain = sample_domain(Uuid::new_v4(), "demo.apps.example.com");
    storage.save_app_domain(&domain).await.unwrap();

    // Re-saving the same row is an upsert, not a collision.
    storage.save_app_domain(&domain).await.unwrap();

    let intruder = sample_domain(Uuid::new_v4(), "demo.apps.example.com");
    assert!(matches!(
        storage.save_app_domain(&intruder).await,
        Err(StorageError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn assign_app_domains_moves_address_between_apps() {
    let storage = MemoryRoutingStorage::new();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    let affected = storage
        .assign_app_domains(
            first,
            AddressSource::AutoGen,
            vec![sample_domain(first, "demo.apps.example.com")],
        )
        .await
        .unwrap();
    assert!(affected.is_empty());

    let affected = storage
        .assign_app_domains(
            second,
            AddressSource::AutoGen,
            vec![sample_domain(second, "demo.apps.example.com")],
        )
        .await
        .unwrap();
    assert_eq!(affected, vec![first]);

    let filter = |id| gantry_storage::AppDomainFilter {
        engine_app_id: Some(id),
        ..Default::default()
    };
    assert!(storage.list_app_domains(filter(first)).await.unwrap().is_empty());
    assert_eq!(storage.list_app_domains(filter(second)).await.unwrap().len(), 1);

    // An empty assignment prunes everything the app held for that source.
    storage
        .assign_app_domains(second, AddressSource::AutoGen, vec![])
        .await
        .unwrap();
    assert!(storage.list_app_domains(filter(second)).await.unwrap().is_empty());
}

#[tokio::test]
async fn subpath_reassignment_keeps_row_identity() {
    let storage = MemoryRoutingStorage::new();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    storage
        .assign_subpaths(first, "default", vec!["/foo".to_string()])
        .await
        .unwrap();
    let row_id = storage.list_subpaths(first).await.unwrap()[0].id;

    let affected = storage
        .assign_subpaths(second, "default", vec!["/foo".to_string()])
        .await
        .unwrap();
    assert_eq!(affected, vec![first]);

    assert!(storage.list_subpaths(first).await.unwrap().is_empty());
    let rows = storage.list_subpaths(second).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, row_id);
    assert_eq!(rows[0].subpath, "/foo");
}

#[tokio::test]
async fn revisions_are_append_only() {
    let storage = MemoryManifestStorage::new();
    let module_id = Uuid::new_v4();
    let revision = sample_revision(module_id);

    storage.store_revision(&revision).await.unwrap();
    assert!(matches!(
        storage.store_revision(&revision).await,
        Err(StorageError::AlreadyExists(_))
    ));

    assert!(matches!(
        storage.set_active_revision(module_id, Uuid::new_v4()).await,
        Err(StorageError::NotFound(_))
    ));

    storage
        .set_active_revision(module_id, revision.id)
        .await
        .unwrap();
    let resource = storage.get_resource(module_id).await.unwrap().unwrap();
    assert_eq!(resource.revision_id, revision.id);

    // Moving the pointer keeps the resource row.
    let next = sample_revision(module_id);
    storage.store_revision(&next).await.unwrap();
    storage.set_active_revision(module_id, next.id).await.unwrap();
    let updated = storage.get_resource(module_id).await.unwrap().unwrap();
    assert_eq!(updated.id, resource.id);
    assert_eq!(updated.revision_id, next.id);
}

#[tokio::test]
async fn terminal_deploy_status_is_sticky() {
    let storage = MemoryManifestStorage::new();
    let deploy = AppModelDeploy::new(Uuid::new_v4(), Environment::Prod, Uuid::new_v4(), "admin");
    storage.store_deploy(&deploy).await.unwrap();

    storage
        .update_deploy_status(deploy.id, DeployStatus::Progressing, "AppProgressing", "", None)
        .await
        .unwrap();
    // Terminal writes may carry the cluster-reported transition instant.
    let reported = chrono::Utc::now();
    let ready = storage
        .update_deploy_status(
            deploy.id,
            DeployStatus::Ready,
            "AppAvailable",
            "all good",
            Some(reported),
        )
        .await
        .unwrap();
    assert_eq!(ready.last_transition_time, reported);

    assert!(matches!(
        storage
            .update_deploy_status(deploy.id, DeployStatus::Progressing, "", "", None)
            .await,
        Err(StorageError::Conflict(_))
    ));

    let stored = storage.get_deploy(deploy.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeployStatus::Ready);
    assert_eq!(stored.reason, "AppAvailable");
    assert_eq!(stored.message, "all good");
}

#[tokio::test]
async fn unprovisioned_filter_selects_pending_bindings() {
    let storage = MemoryAttachmentStorage::new();
    let engine_app_id = Uuid::new_v4();

    let pending = EngineAppAttachment {
        id: Uuid::new_v4(),
        engine_app_id,
        service_id: "mysql".to_string(),
        plan_id: "default".to_string(),
        service_instance_id: None,
    };
    let provisioned = EngineAppAttachment {
        id: Uuid::new_v4(),
        engine_app_id,
        service_id: "redis".to_string(),
        plan_id: "default".to_string(),
        service_instance_id: Some("inst-1".to_string()),
    };
    storage.store_engine_app_attachment(&pending).await.unwrap();
    storage
        .store_engine_app_attachment(&provisioned)
        .await
        .unwrap();

    let dup = EngineAppAttachment {
        id: Uuid::new_v4(),
        ..pending.clone()
    };
    assert!(matches!(
        storage.store_engine_app_attachment(&dup).await,
        Err(StorageError::AlreadyExists(_))
    ));

    let remaining = storage
        .list_engine_app_attachments(AttachmentFilter {
            engine_app_id: Some(engine_app_id),
            unprovisioned_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].service_id, "mysql");
}
