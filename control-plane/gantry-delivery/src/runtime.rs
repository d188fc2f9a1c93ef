use std::path::PathBuf;
use std::sync::Arc;

use flume::Receiver;
use gantry_addons::{AddonBinder, RecyclingPoller, RemoteProviderClient};
use gantry_build::{
    smart_release_phases, BuildCoordinator, BuildPlan, BuilderPodRunner, BuilderTemplate,
    EventStream, ReleaseContext, ReleaseTask, StreamEvent,
};
use gantry_deploy::{DeployContext, DeployStatusPoller, ManifestAssembler, ManifestDeployer};
use gantry_ingress::IngressService;
use gantry_kube::{ClusterClient, ClusterRegistry};
use gantry_models::{EngineApp, ExposedUrl, ModuleEnv};
use gantry_storage::{build_storage, ApplicationStorage, StorageHandles};
use tracing::info;
use uuid::Uuid;

use crate::addresses::AddressDirectory;
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, DeliveryResult};
use crate::sources::PlatformSources;
use crate::teardown::ModuleTeardown;
use crate::workers::{
    shutdown_signal, spawn_reaper, spawn_recycler, spawn_workers, BuildLedger, DeliveryTask,
    TaskQueue,
};

/// The wired object graph. Construction order follows the dependency
/// arrows: storage, clusters, then the subsystems on top of both.
pub struct DeliveryCore {
    pub storage: StorageHandles,
    pub clusters: Arc<ClusterRegistry>,
    pub ingress: Arc<IngressService>,
    pub assembler: Arc<ManifestAssembler>,
    pub deployer: Arc<ManifestDeployer>,
    pub poller: Arc<DeployStatusPoller>,
    pub coordinator: BuildCoordinator,
    pub runner: Arc<BuilderPodRunner>,
    pub binder: Arc<AddonBinder>,
    pub recycler: Arc<RecyclingPoller>,
    pub addresses: Arc<AddressDirectory>,
    pub teardown: Arc<ModuleTeardown>,
    pub ledger: Arc<BuildLedger>,
    pub queue: TaskQueue,
    template: BuilderTemplate,
}

impl DeliveryCore {
    /// Builds every subsystem from configuration against one cluster
    /// client. Returns the task receiver the worker pool consumes.
    pub async fn from_config(
        config: &DeliveryConfig,
        client: kube::Client,
    ) -> DeliveryResult<(Self, Receiver<DeliveryTask>)> {
        let storage = build_storage(&config.storage()).await?;

        let cluster_config = config.cluster()?;
        let mut registry = ClusterRegistry::new(cluster_config.name.clone());
        registry.insert(ClusterClient::new(client, cluster_config));
        let clusters = Arc::new(registry);

        let ingress = Arc::new(IngressService::new(
            storage.routing.clone(),
            storage.certs.clone(),
            clusters.clone(),
            Vec::new(),
        ));

        let provider = Arc::new(RemoteProviderClient::new(
            &config.provider_url,
            config.provider_token.clone(),
            config.provider_timeout(),
        )?);
        let binder = Arc::new(AddonBinder::new(storage.attachments.clone(), provider.clone()));
        let recycler = Arc::new(RecyclingPoller::new(storage.attachments.clone(), provider));

        let sources = Arc::new(PlatformSources::new(
            binder.clone(),
            config.registry_credential(),
        ));
        let assembler = Arc::new(ManifestAssembler::new(
            sources.clone(),
            sources.clone(),
            sources,
        ));
        let deployer = Arc::new(ManifestDeployer::new(
            clusters.clone(),
            storage.routing.clone(),
            storage.certs.clone(),
        ));
        let poller = Arc::new(DeployStatusPoller::new(
            clusters.clone(),
            storage.manifests.clone(),
            config.poller_settings(),
        ));

        let coordinator = BuildCoordinator::new(storage.build_leases.clone());
        let builder_cluster = clusters.default_cluster()?.clone();
        let runner = Arc::new(BuilderPodRunner::new(
            builder_cluster,
            config.runner_settings(),
        ));
        let ledger = Arc::new(BuildLedger::new(coordinator.clone()));
        let template = config.builder_template()?;

        let addresses = Arc::new(AddressDirectory::new(
            storage.applications.clone(),
            storage.routing.clone(),
            storage.certs.clone(),
        ));
        let teardown = Arc::new(ModuleTeardown::new(
            storage.applications.clone(),
            storage.routing.clone(),
            storage.attachments.clone(),
            ingress.clone(),
            binder.clone(),
        ));

        let (queue, tasks) = TaskQueue::bounded(config.task_queue_capacity);

        let core = Self {
            storage,
            clusters,
            ingress,
            assembler,
            deployer,
            poller,
            coordinator,
            runner,
            binder,
            recycler,
            addresses,
            teardown,
            ledger,
            queue,
            template,
        };
        Ok((core, tasks))
    }

    /// Queues one release run. The caller keeps the event receiver and
    /// streams it to whoever is watching the build.
    pub async fn launch_release(
        &self,
        plan: BuildPlan,
        workspace: PathBuf,
    ) -> DeliveryResult<Receiver<StreamEvent>> {
        let (events, stream) = EventStream::new(plan.record.id);
        let signature = plan.record.signature.clone();
        let build_id = plan.record.id;

        let context = ReleaseContext {
            plan,
            workspace,
            template: self.template.clone(),
        };
        let task = ReleaseTask::new(
            self.coordinator.clone(),
            self.storage.builds.clone(),
            context,
            smart_release_phases(self.runner.clone()),
            events,
        );

        self.ledger.track(signature, build_id).await;
        self.queue
            .submit(DeliveryTask::ExecuteRelease(Box::new(task)))?;
        Ok(stream)
    }

    /// Assembles and applies one manifest revision, then queues the
    /// status poll for it.
    pub async fn roll_out(
        &self,
        manifest: &serde_json::Value,
        context: &DeployContext,
    ) -> DeliveryResult<()> {
        let assembled = self.assembler.assemble(manifest, context).await?;
        self.deployer.deploy(&assembled, context).await?;
        self.watch_deploy(context.deploy_id, context.engine_app.clone())
    }

    /// Queues the status poll for an already-applied deploy.
    pub fn watch_deploy(&self, deploy_id: Uuid, engine_app: EngineApp) -> DeliveryResult<()> {
        self.queue.submit(DeliveryTask::PollDeploy {
            deploy_id,
            engine_app,
        })
    }

    /// Exposed URLs of one environment, best address first.
    pub async fn environment_urls(&self, env: &ModuleEnv) -> DeliveryResult<Vec<ExposedUrl>> {
        let engine_app = self
            .storage
            .applications
            .get_engine_app(env.engine_app_id)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(format!("engine app {}", env.engine_app_id)))?;
        let cluster = self.clusters.get(&engine_app.cluster_name)?;
        self.addresses
            .exposed_urls(&engine_app, cluster.config())
            .await
    }
}

/// Runs the core until a shutdown signal, then drains the worker pool.
pub async fn run_all(
    core: DeliveryCore,
    tasks: Receiver<DeliveryTask>,
    config: &DeliveryConfig,
) -> anyhow::Result<()> {
    let workers = spawn_workers(config.worker_count, tasks, core.poller.clone());
    let recycler = spawn_recycler(core.recycler.clone(), config.recycle_sweep_interval());
    let reaper = spawn_reaper(core.ledger.clone(), config.reap_interval());

    info!(workers = config.worker_count, "delivery core is running");
    shutdown_signal().await;
    info!("signal received, draining workers");

    recycler.abort();
    reaper.abort();
    // Dropping the core drops the queue sender; workers exit once the
    // backlog is drained.
    drop(core);
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}
