// Main entry point for the workspace manager

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use manager_core::config::Config;
use manager_core::kernel::{JetStreamConsumer, KubeWorkspaceStore, NatsPublisher, ServiceHost};
use manager_core::kernel::store::WorkspaceStore;
use manager_core::manager::{SettingsBridge, StatusWatcher, WorkspaceOperator, WORKSPACE_NAMESPACE};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,manager_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting workspace manager");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let nats = async_nats::connect(config.nats_url.as_str())
        .await
        .context("Failed to connect to NATS")?;
    tracing::info!(url = %config.nats_url, "NATS connected");

    let kube_client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store = Arc::new(KubeWorkspaceStore::new(kube_client, WORKSPACE_NAMESPACE));

    // Inbound path: settings stream -> operator -> workspace store
    let consumer = JetStreamConsumer::connect(
        nats.clone(),
        &config.settings_stream,
        &config.settings_consumer,
    )
    .await
    .context("Failed to attach settings consumer")?;

    let operator = Arc::new(WorkspaceOperator::new(store.clone(), config.clone()));
    let mut bridge = SettingsBridge::new(Box::new(consumer), operator);
    if let Some(capacity) = config.bridge_queue_capacity {
        bridge = bridge.with_queue(capacity);
    }

    // Outbound path: workspace status changes -> status subject
    let subscription = store
        .subscribe()
        .await
        .context("Failed to watch workspaces")?;
    let publisher = Arc::new(NatsPublisher::new(nats));
    let watcher = StatusWatcher::new(subscription, publisher, config.status_subject.clone())
        .with_publish_timeout(config.publish_timeout);

    ServiceHost::new()
        .with_service(bridge)
        .with_service(watcher)
        .run_until_shutdown()
        .await
}
