// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dynamic secret watch registry.
//!
//! Datacenters reference secrets the operator neither owns nor annotates
//! (superuser and user credentials). The reconciler records those references
//! here and the secret watch looks them up on every secret event.
//!
//! Two sharded maps hold the links in both directions:
//! - `watchers`: secret -> datacenters watching it (read on the watch path)
//! - `watched`: datacenter -> secrets it watches (used to drop stale links)
//!
//! Each set is only mutated while holding its shard's write lock, so a lookup
//! sees a key's set either before or after a concurrent update, never half of
//! one. Keys on other shards are not blocked.

use crate::watch::ReconcileRequest;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use std::collections::HashSet;
use tracing::debug;

type SecretRef = ObjectRef<Secret>;

/// Thread-safe secret -> datacenter watch index
#[derive(Debug, Default)]
pub struct SecretWatches {
    watchers: DashMap<SecretRef, HashSet<ReconcileRequest>>,
    watched: DashMap<ReconcileRequest, HashSet<SecretRef>>,
}

impl SecretWatches {
    /// Replace the set of secrets watched by a datacenter.
    ///
    /// Links to secrets no longer in `secrets` are removed. Calls for the same
    /// datacenter must not run concurrently; the controller guarantees this by
    /// reconciling each datacenter at most once at a time.
    pub fn update_watches(
        &self,
        watcher: &ReconcileRequest,
        secrets: impl IntoIterator<Item = SecretRef>,
    ) {
        let desired: HashSet<SecretRef> = secrets.into_iter().collect();
        let previous = if desired.is_empty() {
            self.watched.remove(watcher).map(|(_, s)| s)
        } else {
            self.watched.insert(watcher.clone(), desired.clone())
        };
        let previous = previous.unwrap_or_default();

        for stale in previous.difference(&desired) {
            self.unlink(stale, watcher);
        }
        for added in desired.difference(&previous) {
            self.watchers
                .entry(added.clone())
                .or_default()
                .insert(watcher.clone());
        }

        debug!(
            "Datacenter {} watches {} secrets ({} added, {} removed)",
            watcher.name,
            desired.len(),
            desired.difference(&previous).count(),
            previous.difference(&desired).count()
        );
    }

    /// Remove every watch registered by a datacenter
    pub fn remove_watcher(&self, watcher: &ReconcileRequest) {
        if let Some((_, secrets)) = self.watched.remove(watcher) {
            for secret in &secrets {
                self.unlink(secret, watcher);
            }
        }
    }

    /// Datacenters currently watching the given secret. Accepts a full
    /// `Secret` or its metadata.
    pub fn find_watchers<K: Resource>(&self, secret: &K) -> Vec<ReconcileRequest> {
        let Some(namespace) = secret.namespace() else {
            return Vec::new();
        };
        let key: SecretRef = ObjectRef::new(&secret.name_any()).within(&namespace);
        self.watchers
            .get(&key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Secrets currently watched by the given datacenter
    pub fn watched_by(&self, watcher: &ReconcileRequest) -> Vec<SecretRef> {
        self.watched
            .get(watcher)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of secrets with at least one watcher
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    fn unlink(&self, secret: &SecretRef, watcher: &ReconcileRequest) {
        if let Some(mut set) = self.watchers.get_mut(secret) {
            set.remove(watcher);
        }
        self.watchers.remove_if(secret, |_, set| set.is_empty());
    }
}
