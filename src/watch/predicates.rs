// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission predicates deciding which events reach a router.
//!
//! Predicates run on the watch delivery path. They must stay synchronous and
//! cheap, and when they cannot decide they admit: a spurious reconciliation
//! only costs work, a missed one leaves a datacenter out of date.

use crate::constants::{annotations, is_managed_by_value, labels};
use crate::watch::event::ObjectEvent;
use k8s_openapi::api::core::v1::{Node, Taint};
use kube::{Resource, ResourceExt};
use std::collections::HashSet;

/// Decides whether an event proceeds to request mapping.
pub trait Admission<K>: Send + Sync {
    fn admit(&self, event: &ObjectEvent<K>) -> bool;
}

/// Admits every event.
pub struct AdmitAll;

impl<K> Admission<K> for AdmitAll {
    fn admit(&self, _event: &ObjectEvent<K>) -> bool {
        true
    }
}

/// Admits events for resources labelled as managed by the operator.
/// Updates are admitted when either version carries the label so that
/// transitions into and out of ownership are observed.
pub struct ManagedByOperator;

impl<K: Resource> Admission<K> for ManagedByOperator {
    fn admit(&self, event: &ObjectEvent<K>) -> bool {
        event.objects().any(|obj| is_managed_by_operator(obj))
    }
}

/// Check if a resource carries the current or legacy managed-by label
pub fn is_managed_by_operator<K: Resource>(obj: &K) -> bool {
    obj.labels()
        .get(labels::MANAGED_BY)
        .is_some_and(|v| is_managed_by_value(v))
}

/// Admits events for resources annotated with a datacenter name.
pub struct HasDatacenterAnnotation;

impl<K: Resource> Admission<K> for HasDatacenterAnnotation {
    fn admit(&self, event: &ObjectEvent<K>) -> bool {
        event
            .objects()
            .any(|obj| obj.annotations().contains_key(annotations::DATACENTER))
    }
}

/// Admits updates only when `metadata.generation` moved.
///
/// Status writes do not bump the generation, which keeps the reconciler's
/// own status updates from triggering it again.
pub struct GenerationChanged;

impl<K: Resource> Admission<K> for GenerationChanged {
    fn admit(&self, event: &ObjectEvent<K>) -> bool {
        match event {
            ObjectEvent::Update {
                old: Some(old),
                new: Some(new),
            } => match (old.meta().generation, new.meta().generation) {
                (Some(old), Some(new)) => old != new,
                _ => true,
            },
            _ => true,
        }
    }
}

/// Admits updates that add or remove finalizers or mark the object for
/// deletion. Neither bumps `metadata.generation`.
pub struct FinalizersChanged;

impl<K: Resource> Admission<K> for FinalizersChanged {
    fn admit(&self, event: &ObjectEvent<K>) -> bool {
        match event {
            ObjectEvent::Update {
                old: Some(old),
                new: Some(new),
            } => {
                let (old, new) = (old.meta(), new.meta());
                old.finalizers != new.finalizers || old.deletion_timestamp != new.deletion_timestamp
            }
            _ => true,
        }
    }
}

/// Admits an event when either predicate admits it.
pub struct AnyOf<A, B>(pub A, pub B);

impl<K, A: Admission<K>, B: Admission<K>> Admission<K> for AnyOf<A, B> {
    fn admit(&self, event: &ObjectEvent<K>) -> bool {
        self.0.admit(event) || self.1.admit(event)
    }
}

/// Admits node updates whose taint set changed.
pub struct TaintsChanged;

impl Admission<Node> for TaintsChanged {
    fn admit(&self, event: &ObjectEvent<Node>) -> bool {
        match event {
            ObjectEvent::Update { old, new } => taints_changed(old.as_deref(), new.as_deref()),
            _ => true,
        }
    }
}

/// Compare the taints of two versions of a node, ignoring order
pub fn taints_changed(old: Option<&Node>, new: Option<&Node>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(old), Some(new)) => taint_snapshot(old) != taint_snapshot(new),
    }
}

type TaintKey<'a> = (&'a str, Option<&'a str>, &'a str);

fn taint_snapshot(node: &Node) -> HashSet<TaintKey<'_>> {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| taints.iter().map(taint_key).collect())
        .unwrap_or_default()
}

fn taint_key(taint: &Taint) -> TaintKey<'_> {
    (
        taint.key.as_str(),
        taint.value.as_deref(),
        taint.effect.as_str(),
    )
}
