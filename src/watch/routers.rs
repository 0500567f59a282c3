// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Routers mapping a changed object to the datacenters it concerns.

use crate::constants::{annotations, labels};
use crate::types::CassandraDatacenter;
use crate::watch::predicates::is_managed_by_operator;
use crate::watch::registry::SecretWatches;
use crate::watch::ReconcileRequest;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::debug;

/// Maps one version of a changed object to reconcile requests.
pub trait Router<K>: Send + Sync {
    fn route(&self, obj: &K) -> Vec<ReconcileRequest>;
}

/// Answers which datacenters have pods scheduled on a node.
pub trait NodeIndex: Send + Sync {
    fn datacenters_for_node(&self, node_name: &str) -> Vec<ReconcileRequest>;
}

/// Routes owned resources to their controlling `CassandraDatacenter`.
pub struct OwnerRouter;

impl<K: Resource> Router<K> for OwnerRouter {
    fn route(&self, obj: &K) -> Vec<ReconcileRequest> {
        let Some(namespace) = obj.namespace() else {
            return Vec::new();
        };
        let kind = CassandraDatacenter::kind(&());
        let group = CassandraDatacenter::group(&());

        obj.owner_references()
            .iter()
            .filter(|owner| owner.controller == Some(true) && owner.kind == kind)
            .filter(|owner| api_group(&owner.api_version) == group)
            .map(|owner| ObjectRef::new(&owner.name).within(&namespace))
            .collect()
    }
}

fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// Routes resources annotated with the name of the datacenter that uses them.
/// Used for user managed config secrets, which carry no owner reference.
pub struct AnnotationRouter;

impl<K: Resource> Router<K> for AnnotationRouter {
    fn route(&self, obj: &K) -> Vec<ReconcileRequest> {
        let (Some(namespace), Some(datacenter)) =
            (obj.namespace(), obj.annotations().get(annotations::DATACENTER))
        else {
            return Vec::new();
        };

        debug!(
            "Routing {}/{} to datacenter {} by annotation",
            namespace,
            obj.name_any(),
            datacenter
        );
        vec![ObjectRef::new(datacenter).within(&namespace)]
    }
}

/// Routes resources carrying the managed-by label (current or legacy value)
/// and the datacenter label. Used for persistent volume claims, which the
/// operator does not set owner references on.
pub struct LabelRouter;

impl<K: Resource> Router<K> for LabelRouter {
    fn route(&self, obj: &K) -> Vec<ReconcileRequest> {
        if !is_managed_by_operator(obj) {
            return Vec::new();
        }
        let (Some(namespace), Some(datacenter)) =
            (obj.namespace(), obj.labels().get(labels::DATACENTER))
        else {
            return Vec::new();
        };

        debug!(
            "Routing {}/{} to datacenter {} by label",
            namespace,
            obj.name_any(),
            datacenter
        );
        vec![ObjectRef::new(datacenter).within(&namespace)]
    }
}

/// Routes a node to every datacenter with a pod scheduled on it.
pub struct NodeRouter {
    index: Arc<dyn NodeIndex>,
}

impl NodeRouter {
    pub fn new(index: Arc<dyn NodeIndex>) -> Self {
        Self { index }
    }
}

impl Router<Node> for NodeRouter {
    fn route(&self, node: &Node) -> Vec<ReconcileRequest> {
        let datacenters = self.index.datacenters_for_node(&node.name_any());
        for dc in &datacenters {
            debug!(
                "Routing node {} to datacenter {}/{}",
                node.name_any(),
                dc.namespace.as_deref().unwrap_or_default(),
                dc.name
            );
        }
        datacenters
    }
}

/// Routes a secret to the datacenters that registered a dynamic watch on it.
pub struct SecretWatchRouter {
    watches: Arc<SecretWatches>,
}

impl SecretWatchRouter {
    pub fn new(watches: Arc<SecretWatches>) -> Self {
        Self { watches }
    }
}

impl<K: Resource> Router<K> for SecretWatchRouter {
    fn route(&self, secret: &K) -> Vec<ReconcileRequest> {
        self.watches.find_watchers(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::api::ObjectMeta;
    use std::collections::{BTreeMap, HashMap};

    struct StaticNodeIndex(HashMap<String, Vec<ReconcileRequest>>);

    impl NodeIndex for StaticNodeIndex {
        fn datacenters_for_node(&self, node_name: &str) -> Vec<ReconcileRequest> {
            self.0.get(node_name).cloned().unwrap_or_default()
        }
    }

    fn dc(namespace: &str, name: &str) -> ReconcileRequest {
        ObjectRef::new(name).within(namespace)
    }

    fn make_meta(
        name: &str,
        labels: &[(&str, &str)],
        annotations: &[(&str, &str)],
    ) -> ObjectMeta {
        let to_map = |pairs: &[(&str, &str)]| {
            Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            )
        };
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            labels: to_map(labels),
            annotations: to_map(annotations),
            ..Default::default()
        }
    }

    fn make_pvc(labels: &[(&str, &str)]) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: make_meta("server-data-dc1-sts-0", labels, &[]),
            ..Default::default()
        }
    }

    fn make_secret(name: &str, annotations: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: make_meta(name, &[], annotations),
            ..Default::default()
        }
    }

    fn owner(api_version: &str, kind: &str, name: &str, controller: bool) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("{}-uid", name),
            controller: Some(controller),
            block_owner_deletion: None,
        }
    }

    #[test]
    fn test_annotation_router_config_secret() {
        let secret = make_secret("my-secret", &[(annotations::DATACENTER, "dc1")]);
        assert_eq!(AnnotationRouter.route(&secret), vec![dc("ns", "dc1")]);
    }

    #[test]
    fn test_annotation_router_without_annotation() {
        let secret = make_secret("my-secret", &[("other", "dc1")]);
        assert!(AnnotationRouter.route(&secret).is_empty());
    }

    #[test]
    fn test_label_router_current_value() {
        let pvc = make_pvc(&[
            (labels::MANAGED_BY, labels::MANAGED_BY_VALUE),
            (labels::DATACENTER, "dc1"),
        ]);
        assert_eq!(LabelRouter.route(&pvc), vec![dc("ns", "dc1")]);
    }

    #[test]
    fn test_label_router_legacy_value() {
        let pvc = make_pvc(&[
            (labels::MANAGED_BY, "cass-operator-defunct"),
            (labels::DATACENTER, "dc1"),
        ]);
        assert_eq!(LabelRouter.route(&pvc), vec![dc("ns", "dc1")]);
    }

    #[test]
    fn test_label_router_requires_both_labels() {
        let no_marker = make_pvc(&[(labels::DATACENTER, "dc1")]);
        let foreign_marker = make_pvc(&[(labels::MANAGED_BY, "helm"), (labels::DATACENTER, "dc1")]);
        let no_datacenter = make_pvc(&[(labels::MANAGED_BY, labels::MANAGED_BY_VALUE)]);

        assert!(LabelRouter.route(&no_marker).is_empty());
        assert!(LabelRouter.route(&foreign_marker).is_empty());
        assert!(LabelRouter.route(&no_datacenter).is_empty());
    }

    #[test]
    fn test_node_router_emits_one_request_per_datacenter() {
        let index = StaticNodeIndex(HashMap::from([(
            "node-1".to_string(),
            vec![dc("ns", "dc1"), dc("ns", "dc2")],
        )]));
        let router = NodeRouter::new(Arc::new(index));
        let node = Node {
            metadata: ObjectMeta {
                name: Some("node-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(router.route(&node), vec![dc("ns", "dc1"), dc("ns", "dc2")]);
    }

    #[test]
    fn test_secret_watch_router_ignores_annotations() {
        let watches = Arc::new(SecretWatches::default());
        watches.update_watches(&dc("ns", "dc3"), [ObjectRef::new("creds").within("ns")]);
        let router = SecretWatchRouter::new(watches);

        let secret = make_secret("creds", &[(annotations::DATACENTER, "dc1")]);
        assert_eq!(router.route(&secret), vec![dc("ns", "dc3")]);
        assert!(router.route(&make_secret("unrelated", &[])).is_empty());
    }

    #[test]
    fn test_owner_router_follows_controller_reference() {
        let mut sts = StatefulSet {
            metadata: make_meta("cluster1-dc1-r1-sts", &[], &[]),
            ..Default::default()
        };
        sts.metadata.owner_references = Some(vec![
            owner("cassandra.datastax.com/v1beta1", "CassandraDatacenter", "dc1", true),
            owner("cassandra.datastax.com/v1beta1", "CassandraDatacenter", "dc2", false),
            owner("example.com/v1", "CassandraDatacenter", "dc3", true),
            owner("apps/v1", "Deployment", "other", true),
        ]);

        assert_eq!(OwnerRouter.route(&sts), vec![dc("ns", "dc1")]);
    }

    #[test]
    fn test_owner_router_without_owners() {
        let sts = StatefulSet {
            metadata: make_meta("orphan", &[], &[]),
            ..Default::default()
        };
        assert!(OwnerRouter.route(&sts).is_empty());
    }

    #[test]
    fn test_api_group() {
        assert_eq!(api_group("cassandra.datastax.com/v1beta1"), "cassandra.datastax.com");
        assert_eq!(api_group("v1"), "");
    }
}
