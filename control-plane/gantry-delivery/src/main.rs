use gantry_delivery::{config::DeliveryConfig, init_tracing, runtime, runtime::DeliveryCore};
use kube::Client;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    info!("Loading configuration from environment variables...");
    let config = DeliveryConfig::load_from_env()?;

    let client = Client::try_default().await?;
    let (core, tasks) = DeliveryCore::from_config(&config, client).await?;

    info!("Starting delivery core");
    runtime::run_all(core, tasks, &config).await
}
