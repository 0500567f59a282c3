// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watch registration.
//!
//! Every watched kind gets one [`Subscription`]: an admission predicate and a
//! router. Each kind runs one watch stream, shared by its subscriptions.
//! Kinds whose routing only reads metadata are watched with
//! `metadata_watcher`. The streams are merged into the trigger input of a single `CassandraDatacenter` controller, whose
//! queue coalesces duplicate requests and runs at most one reconciliation per
//! datacenter at a time.
//!
//! Registration happens once at startup. Every kind must be listable before
//! the controller is built; any failure aborts startup.

use crate::config::Config;
use crate::error::{OperatorError, Result};
use crate::types::CassandraDatacenter;
use crate::watch::event::{ChangeTracker, ObjectEvent};
use crate::watch::predicates::{
    Admission, AdmitAll, AnyOf, FinalizersChanged, GenerationChanged, HasDatacenterAnnotation,
    ManagedByOperator, TaintsChanged,
};
use crate::watch::registry::SecretWatches;
use crate::watch::routers::{
    AnnotationRouter, LabelRouter, NodeIndex, NodeRouter, OwnerRouter, Router, SecretWatchRouter,
};
use crate::watch::ReconcileRequest;
use futures::stream::{self, BoxStream};
use futures::{future, Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::runtime::reflector::{self, store::Writer};
use kube::core::PartialObjectMeta;
use kube::runtime::{metadata_watcher, watcher, Controller, WatchStreamExt};
use kube::{Api, Client, Resource};
use kube_runtime::watcher::Config as WatcherConfig;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, trace, Span};

const DATACENTERS: &str = "datacenters";

/// An admission predicate and a router for one watched kind.
pub struct Subscription<K> {
    name: &'static str,
    admission: Box<dyn Admission<K>>,
    router: Box<dyn Router<K>>,
    span: Span,
}

impl<K: 'static> Subscription<K> {
    pub fn new(
        name: &'static str,
        admission: impl Admission<K> + 'static,
        router: impl Router<K> + 'static,
        span: Span,
    ) -> Self {
        Self {
            name,
            admission: Box::new(admission),
            router: Box::new(router),
            span,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reconcile requests for an event, deduplicated. Updates route both the
    /// old and the new version so that a resource moving between datacenters
    /// notifies both.
    pub fn route(&self, event: &ObjectEvent<K>) -> Vec<ReconcileRequest> {
        let _entered = self.span.enter();

        if !self.admission.admit(event) {
            trace!("Event rejected by admission predicate");
            return Vec::new();
        }

        let mut requests: Vec<ReconcileRequest> = Vec::new();
        for obj in event.objects() {
            for request in self.router.route(obj) {
                if !requests.contains(&request) {
                    requests.push(request);
                }
            }
        }

        if !requests.is_empty() {
            debug!("Enqueueing {} reconcile requests", requests.len());
        }
        requests
    }
}

/// Result of a successful registration: the wired controller, ready to run.
pub struct Registration {
    pub controller: Controller<CassandraDatacenter>,
    /// Names of the registered subscriptions, in registration order
    pub subscriptions: Vec<&'static str>,
}

pub struct WatchRegistrar {
    client: Client,
    config: Config,
    secret_watches: Arc<SecretWatches>,
    node_index: Arc<dyn NodeIndex>,
    span: Span,
    triggers: Vec<BoxStream<'static, ReconcileRequest>>,
    registered: Vec<&'static str>,
}

impl WatchRegistrar {
    pub fn new(
        client: Client,
        config: Config,
        secret_watches: Arc<SecretWatches>,
        node_index: Arc<dyn NodeIndex>,
        span: Span,
    ) -> Self {
        Self {
            client,
            config,
            secret_watches,
            node_index,
            span,
            triggers: Vec::new(),
            registered: Vec::new(),
        }
    }

    /// Register every watch and build the controller.
    pub async fn register(mut self) -> Result<Registration> {
        let datacenters: Api<CassandraDatacenter> = self.namespaced_api();
        self.ensure_listable(DATACENTERS, &datacenters).await?;
        self.registered.push(DATACENTERS);
        let (store, writer) = reflector::store();
        let primary = primary_stream(datacenters, writer, self.subscription_span(DATACENTERS));

        // Owned resources, routed through their controller owner reference
        let statefulsets: Api<StatefulSet> = self.namespaced_api();
        let sub = self.owned_subscription("statefulsets");
        self.subscribe_metadata(statefulsets, vec![sub]).await?;

        let pdbs: Api<PodDisruptionBudget> = self.namespaced_api();
        let sub = self.owned_subscription("poddisruptionbudgets");
        self.subscribe_metadata(pdbs, vec![sub]).await?;

        let services: Api<Service> = self.namespaced_api();
        let sub = self.owned_subscription("services");
        self.subscribe_metadata(services, vec![sub]).await?;

        // User managed config secrets point at their datacenter by annotation.
        // Both secret subscriptions share one metadata watch, started once the
        // dynamic one is registered.
        let secrets: Api<Secret> = self.namespaced_api();
        let sub: Subscription<PartialObjectMeta<Secret>> = Subscription::new(
            "config-secrets",
            HasDatacenterAnnotation,
            AnnotationRouter,
            self.subscription_span("config-secrets"),
        );
        let config_secrets = self.admit_subscription(&secrets, sub).await?;

        if self.config.psp_enabled {
            let nodes: Api<Node> = Api::all(self.client.clone());
            let sub: Subscription<Node> = Subscription::new(
                "nodes",
                TaintsChanged,
                NodeRouter::new(self.node_index.clone()),
                self.subscription_span("nodes"),
            );
            let sub = self.admit_subscription(&nodes, sub).await?;
            self.triggers
                .push(routed_stream(watcher(nodes, WatcherConfig::default()), vec![sub]));

            let pvcs: Api<PersistentVolumeClaim> = self.namespaced_api();
            let sub = Subscription::new(
                "persistentvolumeclaims",
                AdmitAll,
                LabelRouter,
                self.subscription_span("persistentvolumeclaims"),
            );
            self.subscribe_metadata(pvcs, vec![sub]).await?;
        }

        // Secrets discovered while reconciling. Every event goes to the
        // registry lookup, which does its own filtering.
        let sub: Subscription<PartialObjectMeta<Secret>> = Subscription::new(
            "dynamic-secrets",
            AdmitAll,
            SecretWatchRouter::new(self.secret_watches.clone()),
            self.subscription_span("dynamic-secrets"),
        );
        let dynamic_secrets = self.admit_subscription(&secrets, sub).await?;
        self.triggers.push(routed_stream(
            metadata_watcher(secrets, WatcherConfig::default()),
            vec![config_secrets, dynamic_secrets],
        ));

        let Self {
            triggers,
            registered,
            span,
            ..
        } = self;

        info!(
            parent: &span,
            "Registered {} watches: {}",
            registered.len(),
            registered.join(", ")
        );

        let controller =
            Controller::for_stream(primary, store).reconcile_on(stream::select_all(triggers));

        Ok(Registration {
            controller,
            subscriptions: registered,
        })
    }

    /// Register subscriptions fed by one metadata-only watch of `K`.
    async fn subscribe_metadata<K>(
        &mut self,
        api: Api<K>,
        subscriptions: Vec<Subscription<PartialObjectMeta<K>>>,
    ) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let mut admitted = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            admitted.push(self.admit_subscription(&api, subscription).await?);
        }
        self.triggers.push(routed_stream(
            metadata_watcher(api, WatcherConfig::default()),
            admitted,
        ));
        Ok(())
    }

    /// Move a subscription to registered once its kind is listable.
    async fn admit_subscription<K, T>(
        &mut self,
        api: &Api<K>,
        subscription: Subscription<T>,
    ) -> Result<Subscription<T>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
        T: 'static,
    {
        self.ensure_listable(subscription.name(), api).await?;
        info!(
            parent: &self.span,
            subscription = subscription.name(),
            kind = %K::kind(&()),
            "Registered watch"
        );
        self.registered.push(subscription.name());
        Ok(subscription)
    }

    /// Fails when the API server refuses to list the kind (missing CRD,
    /// missing RBAC, unreachable server).
    async fn ensure_listable<K>(&self, name: &'static str, api: &Api<K>) -> Result<()>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        api.list(&ListParams::default().limit(1))
            .await
            .map(|_| ())
            .map_err(|source| OperatorError::SubscriptionFailed {
                subscription: name,
                source,
            })
    }

    fn owned_subscription<K: Resource + 'static>(&self, name: &'static str) -> Subscription<K> {
        Subscription::new(name, ManagedByOperator, OwnerRouter, self.subscription_span(name))
    }

    fn subscription_span(&self, name: &'static str) -> Span {
        info_span!(parent: &self.span, "watch", subscription = name)
    }

    fn namespaced_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.config.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Run every event of one watch through each subscription sharing it.
fn routed_stream<K, S>(
    events: S,
    subscriptions: Vec<Subscription<K>>,
) -> BoxStream<'static, ReconcileRequest>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    let names = subscriptions
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(",");
    let subscriptions = Arc::new(subscriptions);

    events
        .default_backoff()
        .filter_map(move |result| {
            future::ready(match result {
                Ok(event) => Some(event),
                Err(e) => {
                    error!(subscription = %names, "Watch stream error: {}", e);
                    None
                }
            })
        })
        .scan(ChangeTracker::default(), |tracker, event| {
            future::ready(Some(tracker.track(event)))
        })
        .flat_map(move |events| {
            let mut requests: Vec<ReconcileRequest> = Vec::new();
            for event in &events {
                for request in subscriptions.iter().flat_map(|s| s.route(event)) {
                    if !requests.contains(&request) {
                        requests.push(request);
                    }
                }
            }
            stream::iter(requests)
        })
        .boxed()
}

/// Datacenter objects whose events pass the primary admission predicate. The
/// store behind `writer` is the controller's cache of datacenters.
fn primary_stream(
    api: Api<CassandraDatacenter>,
    writer: Writer<CassandraDatacenter>,
    span: Span,
) -> impl Stream<Item = std::result::Result<CassandraDatacenter, watcher::Error>> + Send + 'static
{
    watcher(api, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .inspect_err(|e| error!(subscription = DATACENTERS, "Watch stream error: {}", e))
        .scan(ChangeTracker::default(), |tracker, result| {
            future::ready(Some(result.map(|event| tracker.track(event))))
        })
        .flat_map(move |result| {
            let items: Vec<std::result::Result<CassandraDatacenter, watcher::Error>> = match result {
                Ok(events) => admitted_datacenters(events, &span)
                    .into_iter()
                    .map(Ok)
                    .collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
}

/// Spec changes, finalizer changes and deletion marks reach the reconciler;
/// status-only writes do not. The finalizer helper adds its finalizer and
/// waits for the resulting event before the first apply, so that event must
/// get through.
pub(crate) fn admitted_datacenters(
    events: Vec<ObjectEvent<CassandraDatacenter>>,
    span: &Span,
) -> Vec<CassandraDatacenter> {
    let _entered = span.enter();
    let admission = AnyOf(GenerationChanged, FinalizersChanged);

    events
        .into_iter()
        .filter(|event| {
            let admitted = admission.admit(event);
            if !admitted {
                trace!("Ignoring status-only datacenter update");
            }
            admitted
        })
        .filter_map(ObjectEvent::into_latest)
        .map(|dc| (*dc).clone())
        .collect()
}
