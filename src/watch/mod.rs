// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Event routing for the `CassandraDatacenter` controller.
//!
//! Changes to owned and referenced resources (StatefulSets, PodDisruptionBudgets,
//! Services, Secrets, Nodes, PersistentVolumeClaims) are filtered by an
//! admission predicate and mapped to the datacenters that must be reconciled.

pub mod event;
pub mod predicates;
pub mod registrar;
pub mod registry;
pub mod routers;

use crate::types::CassandraDatacenter;
use kube::runtime::reflector::ObjectRef;

/// Identifies the datacenter to reconcile
pub type ReconcileRequest = ObjectRef<CassandraDatacenter>;

pub use event::{ChangeTracker, ObjectEvent};
pub use registrar::{Registration, Subscription, WatchRegistrar};
pub use registry::SecretWatches;
pub use routers::NodeIndex;
