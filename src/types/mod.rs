// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types owned by the operator.

pub mod datacenter;

pub use datacenter::{CassandraDatacenter, CassandraDatacenterSpec, CassandraDatacenterStatus};
