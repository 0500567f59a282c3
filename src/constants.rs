// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Label keys and values set on resources created by the operator
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Current managed-by value
    pub const MANAGED_BY_VALUE: &str = "cass-operator";
    /// Value written by operator releases up to 1.1.0. Still present on
    /// resources those releases created, so it must stay routable.
    pub const MANAGED_BY_DEFUNCT_VALUE: &str = "cass-operator-defunct";
    /// Name of the datacenter a resource belongs to
    pub const DATACENTER: &str = "cassandra.datastax.com/datacenter";
}

/// Annotation keys used by the operator
pub mod annotations {
    /// Name of the datacenter that consumes a config secret
    pub const DATACENTER: &str = "cassandra.datastax.com/datacenter";
}

/// Field manager name used for patches
pub const OPERATOR_NAME: &str = "cass-operator";

/// Finalizer that lets the operator drop dynamic secret watches on deletion
pub const FINALIZER: &str = "finalizer.cassandra.datastax.com";

/// CRD polling configuration
pub mod crd {
    pub const GROUP: &str = "cassandra.datastax.com";
    pub const VERSION: &str = "v1beta1";
    pub const KIND: &str = "CassandraDatacenter";
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Returns true for either accepted managed-by label value
pub fn is_managed_by_value(value: &str) -> bool {
    value == labels::MANAGED_BY_VALUE || value == labels::MANAGED_BY_DEFUNCT_VALUE
}
