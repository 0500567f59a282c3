// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The CassandraDatacenter reconciler and the indexes it routes events with.

pub mod datacenter;
pub mod node_index;

pub use datacenter::DatacenterReconciler;
pub use node_index::{PodNodeIndex, PodWatcher};
