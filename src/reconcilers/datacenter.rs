// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CassandraDatacenter reconciler - keeps the config secret annotation and the
//! dynamic secret watches of each datacenter in line with its spec.

use crate::constants::{annotations, FINALIZER, OPERATOR_NAME};
use crate::error::{OperatorError, Result};
use crate::types::datacenter::PROGRESS_READY;
use crate::types::CassandraDatacenter;
use crate::watch::{Registration, SecretWatches};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Periodic resync of a healthy datacenter
const RESYNC_SECS: u64 = 300;
const ERROR_REQUEUE_SECS: u64 = 60;

pub struct DatacenterReconciler {
    client: Client,
    secret_watches: Arc<SecretWatches>,
}

impl DatacenterReconciler {
    pub fn new(client: Client, secret_watches: Arc<SecretWatches>) -> Self {
        Self {
            client,
            secret_watches,
        }
    }

    /// Drive the registered controller until shutdown.
    pub async fn run(self, registration: Registration) -> anyhow::Result<()> {
        let context = Arc::new(self);

        registration
            .controller
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled datacenter: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        info!("Datacenter controller stopped");
        Ok(())
    }
}

#[instrument(skip(dc, ctx), fields(datacenter = %datacenter_key(&dc)))]
async fn reconcile(dc: Arc<CassandraDatacenter>, ctx: Arc<DatacenterReconciler>) -> Result<Action> {
    let namespace = dc
        .namespace()
        .ok_or(OperatorError::MissingObjectKey(".metadata.namespace"))?;
    let datacenters: Api<CassandraDatacenter> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&datacenters, FINALIZER, dc, |event| async {
        match event {
            FinalizerEvent::Apply(dc) => apply(dc, ctx.clone()).await,
            FinalizerEvent::Cleanup(dc) => cleanup(dc, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| OperatorError::FinalizerError(Box::new(e)))
}

async fn apply(dc: Arc<CassandraDatacenter>, ctx: Arc<DatacenterReconciler>) -> Result<Action> {
    let namespace = dc
        .namespace()
        .ok_or(OperatorError::MissingObjectKey(".metadata.namespace"))?;
    let name = dc.name_any();

    ctx.secret_watches
        .update_watches(&ObjectRef::from_obj(&*dc), dc.referenced_secrets());

    if let Some(config_secret) = dc.spec.config_secret.as_deref() {
        annotate_config_secret(&ctx.client, &namespace, config_secret, &name).await?;
    }

    if let Some(patch) = status_patch(&dc) {
        let datacenters: Api<CassandraDatacenter> =
            Api::namespaced(ctx.client.clone(), &namespace);
        datacenters
            .patch_status(&name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        info!("Updated status of datacenter {}/{}", namespace, name);
    }

    Ok(Action::requeue(Duration::from_secs(RESYNC_SECS)))
}

async fn cleanup(dc: Arc<CassandraDatacenter>, ctx: Arc<DatacenterReconciler>) -> Result<Action> {
    ctx.secret_watches
        .remove_watcher(&ObjectRef::from_obj(&*dc));
    info!("Removed secret watches of datacenter {}", datacenter_key(&dc));
    Ok(Action::await_change())
}

/// Make sure a user managed config secret points back at its datacenter, so
/// that changes to it are routed by annotation.
async fn annotate_config_secret(
    client: &Client,
    namespace: &str,
    secret_name: &str,
    datacenter: &str,
) -> Result<()> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get_opt(secret_name)
        .await?
        .ok_or_else(|| OperatorError::ConfigSecretNotFound(format!("{}/{}", namespace, secret_name)))?;

    if secret.annotations().get(annotations::DATACENTER).map(String::as_str) == Some(datacenter) {
        return Ok(());
    }

    let secret_annotations = BTreeMap::from([(annotations::DATACENTER, datacenter)]);
    let patch = json!({ "metadata": { "annotations": secret_annotations } });
    secrets
        .patch(secret_name, &patch_params(), &Patch::Merge(&patch))
        .await?;

    info!(
        "Annotated config secret {}/{} with datacenter {}",
        namespace, secret_name, datacenter
    );
    Ok(())
}

/// Status patch for a datacenter, or None when the status is already current
fn status_patch(dc: &CassandraDatacenter) -> Option<serde_json::Value> {
    if dc.is_status_current() {
        return None;
    }
    Some(json!({
        "status": {
            "observedGeneration": dc.metadata.generation,
            "cassandraOperatorProgress": PROGRESS_READY,
        }
    }))
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

fn datacenter_key(dc: &CassandraDatacenter) -> String {
    format!("{}/{}", dc.namespace().unwrap_or_default(), dc.name_any())
}

fn error_policy(
    dc: Arc<CassandraDatacenter>,
    error: &OperatorError,
    _ctx: Arc<DatacenterReconciler>,
) -> Action {
    error!("Reconciliation of {} failed: {}", datacenter_key(&dc), error);
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}
