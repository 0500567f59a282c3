// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed change events derived from raw watch streams.
//!
//! A kube watcher only reports the latest state of an object. Predicates that
//! compare two versions of an object (generation, taints, annotations) need
//! the previous version too, so [`ChangeTracker`] keeps the last observed
//! version of every object of a kind and turns watcher events into
//! [`ObjectEvent`]s.

use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::Resource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A change observed on a watched object.
#[derive(Debug, Clone)]
pub enum ObjectEvent<K> {
    /// First observation of the object
    Create(Arc<K>),
    /// The object changed. Either side may be absent when no version of
    /// the object was observed on that side of the change.
    Update {
        old: Option<Arc<K>>,
        new: Option<Arc<K>>,
    },
    /// The object was deleted
    Delete(Arc<K>),
    /// The object was re-observed without changing, e.g. during a re-list
    Generic(Arc<K>),
}

impl<K> ObjectEvent<K> {
    /// Every observed version of the object, old before new
    pub fn objects(&self) -> impl Iterator<Item = &K> {
        let (first, second) = match self {
            ObjectEvent::Create(obj) | ObjectEvent::Delete(obj) | ObjectEvent::Generic(obj) => {
                (Some(obj), None)
            }
            ObjectEvent::Update { old, new } => (old.as_ref(), new.as_ref()),
        };
        first.into_iter().chain(second).map(|obj| &**obj)
    }

    /// The most recent version of the object
    pub fn into_latest(self) -> Option<Arc<K>> {
        match self {
            ObjectEvent::Create(obj) | ObjectEvent::Delete(obj) | ObjectEvent::Generic(obj) => {
                Some(obj)
            }
            ObjectEvent::Update { old, new } => new.or(old),
        }
    }
}

/// Remembers the last observed version of each object of a kind.
pub struct ChangeTracker<K: Resource<DynamicType = ()>> {
    last_seen: HashMap<ObjectRef<K>, Arc<K>>,
    /// Objects seen since the current re-list started
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K: Resource<DynamicType = ()>> Default for ChangeTracker<K> {
    fn default() -> Self {
        Self {
            last_seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: Resource<DynamicType = ()>> ChangeTracker<K> {
    /// Translate a watcher event into zero or more object events
    pub fn track(&mut self, event: watcher::Event<K>) -> Vec<ObjectEvent<K>> {
        match event {
            watcher::Event::Apply(obj) => {
                let (key, new) = keyed(obj);
                match self.last_seen.insert(key, new.clone()) {
                    Some(old) => vec![ObjectEvent::Update {
                        old: Some(old),
                        new: Some(new),
                    }],
                    None => vec![ObjectEvent::Create(new)],
                }
            }
            watcher::Event::Delete(obj) => {
                let (key, obj) = keyed(obj);
                self.last_seen.remove(&key);
                vec![ObjectEvent::Delete(obj)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let (key, new) = keyed(obj);
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(key.clone());
                }
                match self.last_seen.insert(key, new.clone()) {
                    Some(old) if old.meta().resource_version == new.meta().resource_version => {
                        vec![ObjectEvent::Generic(new)]
                    }
                    Some(old) => vec![ObjectEvent::Update {
                        old: Some(old),
                        new: Some(new),
                    }],
                    None => vec![ObjectEvent::Create(new)],
                }
            }
            watcher::Event::InitDone => {
                let relisted = self.relisted.take().unwrap_or_default();
                let gone: Vec<ObjectRef<K>> = self
                    .last_seen
                    .keys()
                    .filter(|key| !relisted.contains(*key))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|key| self.last_seen.remove(&key))
                    .map(ObjectEvent::Delete)
                    .collect()
            }
        }
    }
}

fn keyed<K: Resource<DynamicType = ()>>(obj: K) -> (ObjectRef<K>, Arc<K>) {
    (ObjectRef::from_obj(&obj), Arc::new(obj))
}
