use std::sync::Arc;

use gantry_ingress::{CertResolver, DomainPlanner, ResolvedCert};
use gantry_kube::ClusterConfig;
use gantry_models::{
    AddressSource, AppDomain, AppDomainSharedCert, CustomDomain, EngineApp,
};
use gantry_storage::memory::{MemoryCertStorage, MemoryRoutingStorage};
use gantry_storage::{CertStorage, RoutingStorage};
use uuid::Uuid;

fn engine_app() -> EngineApp {
    EngineApp {
        id: Uuid::new_v4(),
        name: "gantry-demo-stag".to_string(),
        namespace: "gantry-demo-stag".to_string(),
        region: "ieod".to_string(),
        cluster_name: "main".to_string(),
    }
}

fn domain(engine_app: &EngineApp, host: &str, source: AddressSource) -> AppDomain {
    AppDomain {
        id: Uuid::new_v4(),
        engine_app_id: engine_app.id,
        region: engine_app.region.clone(),
        host: host.to_string(),
        path_prefix: "/".to_string(),
        source,
        https_enabled: false,
        cert_id: None,
        shared_cert_id: None,
    }
}

fn wildcard_cert(region: &str, cn: &str) -> AppDomainSharedCert {
    AppDomainSharedCert {
        id: Uuid::new_v4(),
        region: region.to_string(),
        name: "wild".to_string(),
        cert_data: "PEM CERT".to_string(),
        key_data: "PEM KEY".to_string(),
        auto_match_cns: vec![cn.to_string()],
    }
}

fn planner(
    routing: Arc<MemoryRoutingStorage>,
    certs: Arc<MemoryCertStorage>,
) -> DomainPlanner {
    DomainPlanner::new(routing, CertResolver::new(certs))
}

#[tokio::test]
async fn subdomain_rows_become_root_path_domains() {
    let routing = Arc::new(MemoryRoutingStorage::new());
    let certs = Arc::new(MemoryCertStorage::new());
    let app = engine_app();

    let wild = wildcard_cert("ieod", "*.apps.example.com");
    certs.save_shared_cert(&wild).await.unwrap();
    routing
        .save_app_domain(&domain(&app, "demo.apps.example.com", AddressSource::AutoGen))
        .await
        .unwrap();
    routing
        .save_app_domain(&domain(&app, "demo.bare.io", AddressSource::AutoGen))
        .await
        .unwrap();
    // Built-in rows belong to the legacy ingress, not this one.
    routing
        .save_app_domain(&domain(&app, "legacy.example.com", AddressSource::BuiltIn))
        .await
        .unwrap();

    let planner = planner(routing, certs);
    let desired = planner.subdomain_domains(&app).await.unwrap();

    assert_eq!(desired.len(), 2);
    // Hosts come out sorted.
    assert_eq!(desired[0].host, "demo.apps.example.com");
    assert_eq!(desired[0].path_prefixes, ["/"]);
    assert!(desired[0].https_enabled);
    assert_eq!(desired[0].cert, Some(ResolvedCert::Shared(wild)));
    // No cert matches the bare host, so it stays HTTP.
    assert_eq!(desired[1].host, "demo.bare.io");
    assert!(!desired[1].https_enabled);
    assert_eq!(desired[1].cert, None);

    let legacy = planner.legacy_domains(&app).await.unwrap();
    assert_eq!(legacy.len(), 1);
    assert_eq!(legacy[0].host, "legacy.example.com");
}

#[tokio::test]
async fn subpaths_collapse_into_one_entry_per_root_domain() {
    let routing = Arc::new(MemoryRoutingStorage::new());
    let certs = Arc::new(MemoryCertStorage::new());
    let app = engine_app();

    certs
        .save_shared_cert(&wildcard_cert("ieod", "apps.example.com"))
        .await
        .unwrap();
    routing
        .assign_subpaths(
            app.id,
            &app.region,
            vec!["/stag--demo".to_string(), "/v2".to_string()],
        )
        .await
        .unwrap();

    let config = ClusterConfig {
        sub_path_domains: vec![
            "apps.example.com".to_string(),
            "apps.other.io".to_string(),
        ],
        ..Default::default()
    };

    let planner = planner(routing, certs);
    let desired = planner.subpath_domains(&app, &config).await.unwrap();

    assert_eq!(desired.len(), 2);
    assert_eq!(desired[0].host, "apps.example.com");
    // Shortest prefix first; both hosts carry the full prefix list.
    assert_eq!(desired[0].path_prefixes, ["/v2", "/stag--demo"]);
    assert!(desired[0].https_enabled);
    assert_eq!(desired[1].host, "apps.other.io");
    assert_eq!(desired[1].path_prefixes, ["/v2", "/stag--demo"]);
    assert!(!desired[1].https_enabled);
}

#[tokio::test]
async fn missing_root_domain_config_yields_an_empty_set() {
    let routing = Arc::new(MemoryRoutingStorage::new());
    let certs = Arc::new(MemoryCertStorage::new());
    let app = engine_app();

    routing
        .assign_subpaths(app.id, &app.region, vec!["/stag--demo".to_string()])
        .await
        .unwrap();

    let planner = planner(routing, certs);
    let desired = planner
        .subpath_domains(&app, &ClusterConfig::default())
        .await
        .unwrap();
    assert!(desired.is_empty());
}

#[tokio::test]
async fn custom_domain_keeps_https_only_while_its_cert_exists() {
    let routing = Arc::new(MemoryRoutingStorage::new());
    let certs = Arc::new(MemoryCertStorage::new());
    let app = engine_app();
    let planner = planner(routing, certs);

    let row = CustomDomain {
        id: Uuid::new_v4(),
        engine_app_id: app.id,
        host: "www.user-site.com".to_string(),
        path_prefix: "/shop".to_string(),
        https_enabled: true,
        cert_id: Some(Uuid::new_v4()),
    };
    let desired = planner.custom_domain(&row, &app.region).await.unwrap();
    assert_eq!(desired.len(), 1);
    assert_eq!(desired[0].host, "www.user-site.com");
    assert_eq!(desired[0].path_prefixes, ["/shop"]);
    // The bound cert does not exist, so the rule degrades to HTTP
    // instead of disappearing.
    assert!(!desired[0].https_enabled);
    assert_eq!(desired[0].cert, None);
}
