// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Progress value reported once a datacenter's spec has been processed
pub const PROGRESS_READY: &str = "Ready";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(
    group = "cassandra.datastax.com",
    version = "v1beta1",
    kind = "CassandraDatacenter",
    shortname = "cassdc"
)]
#[kube(namespaced)]
#[kube(status = "CassandraDatacenterStatus")]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterSpec {
    pub cluster_name: String,
    pub server_type: String,
    pub server_version: String,
    pub size: i32,
    /// User managed secret holding the Cassandra configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superuser_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<CassandraUser>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CassandraUser {
    pub secret_name: String,
    #[serde(default)]
    pub superuser: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cassandra_operator_progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl CassandraDatacenter {
    /// Secrets this datacenter depends on that must be watched dynamically.
    ///
    /// The config secret is not included: it is routed through its
    /// datacenter annotation instead.
    pub fn referenced_secrets(&self) -> HashSet<ObjectRef<Secret>> {
        let Some(namespace) = self.namespace() else {
            return HashSet::new();
        };

        self.spec
            .superuser_secret_name
            .iter()
            .chain(self.spec.users.iter().map(|u| &u.secret_name))
            .filter(|name| !name.is_empty())
            .map(|name| ObjectRef::new(name).within(&namespace))
            .collect()
    }

    /// Check whether the status already reflects the current generation
    pub fn is_status_current(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.observed_generation == self.metadata.generation
                && s.cassandra_operator_progress.as_deref() == Some(PROGRESS_READY)
        })
    }
}
