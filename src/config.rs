// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;

/// Operator configuration loaded from environment variables.
/// Read once at startup and never re-evaluated.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Namespace to watch namespaced resources in, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Enables the Node and PersistentVolumeClaim watches
    pub psp_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let watch_namespace = env::var("WATCH_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty());

        let psp_enabled = match env::var("ENABLE_VMWARE_PSP") {
            Ok(value) => parse_flag(&value)
                .with_context(|| format!("ENABLE_VMWARE_PSP must be true or false, got '{}'", value))?,
            Err(_) => false,
        };

        Ok(Config {
            watch_namespace,
            psp_enabled,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    Ok(value.trim().to_ascii_lowercase().parse::<bool>()?)
}
