// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use cass_operator::config::Config;
use cass_operator::kubernetes::wait_for_datacenter_crd;
use cass_operator::reconcilers::{DatacenterReconciler, PodNodeIndex};
use cass_operator::watch::{SecretWatches, WatchRegistrar};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting cass-operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: watch_namespace={}, psp_enabled={}",
        config.watch_namespace.as_deref().unwrap_or("<all>"),
        config.psp_enabled
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for CassandraDatacenter CRD to become available...");
    wait_for_datacenter_crd(&client).await?;

    let secret_watches = Arc::new(SecretWatches::default());
    let (node_index, pod_watcher) = PodNodeIndex::new(client.clone(), &config);

    let registration = WatchRegistrar::new(
        client.clone(),
        config,
        secret_watches.clone(),
        Arc::new(node_index),
        info_span!("cassandradatacenter_controller"),
    )
    .register()
    .await
    .context("Failed to register watches")?;

    let reconciler = DatacenterReconciler::new(client, secret_watches);

    info!("Starting controller...");

    let pod_index = tokio::spawn(pod_watcher.run());
    reconciler.run(registration).await?;
    pod_index.abort();

    warn!("Datacenter controller stopped, shutting down");
    Ok(())
}
