// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Node to datacenter index backed by a reflector over operator managed pods.

use crate::config::Config;
use crate::constants::labels;
use crate::watch::predicates::is_managed_by_operator;
use crate::watch::{NodeIndex, ReconcileRequest};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use kube_runtime::watcher::Config as WatcherConfig;
use tracing::{debug, info, warn};

/// Answers node lookups from the cached pods.
#[derive(Clone)]
pub struct PodNodeIndex {
    pods: Store<Pod>,
}

impl PodNodeIndex {
    /// Create the index and the watcher that fills it.
    pub fn new(client: Client, config: &Config) -> (Self, PodWatcher) {
        let (pods, writer) = reflector::store();
        let api = match &config.watch_namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        let watcher = PodWatcher {
            api,
            writer,
            enabled: config.psp_enabled,
        };
        (Self { pods }, watcher)
    }
}

impl NodeIndex for PodNodeIndex {
    fn datacenters_for_node(&self, node_name: &str) -> Vec<ReconcileRequest> {
        let mut requests: Vec<ReconcileRequest> = Vec::new();

        for pod in self.pods.state() {
            let on_node = pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.as_deref())
                .is_some_and(|n| n == node_name);
            if !on_node || !is_managed_by_operator(&*pod) {
                continue;
            }
            let (Some(namespace), Some(datacenter)) =
                (pod.namespace(), pod.labels().get(labels::DATACENTER))
            else {
                continue;
            };

            let request = ObjectRef::new(datacenter).within(&namespace);
            if !requests.contains(&request) {
                requests.push(request);
            }
        }

        requests
    }
}

/// Keeps the pod cache of a [`PodNodeIndex`] up to date.
pub struct PodWatcher {
    api: Api<Pod>,
    writer: Writer<Pod>,
    enabled: bool,
}

impl PodWatcher {
    pub async fn run(self) -> anyhow::Result<()> {
        if !self.enabled {
            debug!("Node watches disabled, not starting pod index");
            return Ok(());
        }

        let selector = format!(
            "{} in ({},{})",
            labels::MANAGED_BY,
            labels::MANAGED_BY_VALUE,
            labels::MANAGED_BY_DEFUNCT_VALUE
        );
        info!("Starting pod index ({})", selector);

        reflector::reflector(
            self.writer,
            watcher(self.api, WatcherConfig::default().labels(&selector)),
        )
        .default_backoff()
        .touched_objects()
        .for_each(|res| async move {
            if let Err(e) = res {
                warn!("Pod watch error: {}", e);
            }
        })
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn make_pod(
        namespace: &str,
        name: &str,
        node: Option<&str>,
        pod_labels: &[(&str, &str)],
    ) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    pod_labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: node.map(str::to_string),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn managed(datacenter: &str) -> [(&'static str, &str); 2] {
        [
            (labels::MANAGED_BY, labels::MANAGED_BY_VALUE),
            (labels::DATACENTER, datacenter),
        ]
    }

    fn index_of(pods: Vec<Pod>) -> PodNodeIndex {
        let (store, mut writer) = reflector::store::<Pod>();
        for pod in pods {
            writer.apply_watcher_event(&watcher::Event::Apply(pod));
        }
        PodNodeIndex { pods: store }
    }

    fn names(requests: Vec<ReconcileRequest>) -> Vec<String> {
        let mut names: Vec<String> = requests
            .into_iter()
            .map(|r| format!("{}/{}", r.namespace.unwrap_or_default(), r.name))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_datacenters_for_node_deduplicates() {
        let index = index_of(vec![
            make_pod("ns", "dc1-sts-0", Some("node-1"), &managed("dc1")),
            make_pod("ns", "dc1-sts-1", Some("node-1"), &managed("dc1")),
            make_pod("ns", "dc2-sts-0", Some("node-1"), &managed("dc2")),
            make_pod("other", "dc1-sts-0", Some("node-1"), &managed("dc1")),
            make_pod("ns", "dc3-sts-0", Some("node-2"), &managed("dc3")),
        ]);

        assert_eq!(
            names(index.datacenters_for_node("node-1")),
            vec!["ns/dc1", "ns/dc2", "other/dc1"]
        );
        assert_eq!(names(index.datacenters_for_node("node-2")), vec!["ns/dc3"]);
        assert!(index.datacenters_for_node("node-3").is_empty());
    }

    #[test]
    fn test_datacenters_for_node_skips_unmanaged_and_unscheduled_pods() {
        let index = index_of(vec![
            make_pod("ns", "foreign", Some("node-1"), &[(labels::DATACENTER, "dc1")]),
            make_pod("ns", "pending", None, &managed("dc2")),
            make_pod(
                "ns",
                "no-dc-label",
                Some("node-1"),
                &[(labels::MANAGED_BY, labels::MANAGED_BY_VALUE)],
            ),
        ]);

        assert!(index.datacenters_for_node("node-1").is_empty());
    }

    #[test]
    fn test_datacenters_for_node_accepts_legacy_managed_by() {
        let index = index_of(vec![make_pod(
            "ns",
            "dc1-sts-0",
            Some("node-1"),
            &[
                (labels::MANAGED_BY, labels::MANAGED_BY_DEFUNCT_VALUE),
                (labels::DATACENTER, "dc1"),
            ],
        )]);

        assert_eq!(names(index.datacenters_for_node("node-1")), vec!["ns/dc1"]);
    }

    #[tokio::test]
    async fn test_pod_watcher_disabled_returns_immediately() {
        let client = crate::test_utils::MockService::new().into_client();
        let (_index, watcher) = PodNodeIndex::new(client, &Config::default());

        assert!(watcher.run().await.is_ok());
    }
}
