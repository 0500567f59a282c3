// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to register watch '{subscription}': {source}")]
    SubscriptionFailed {
        subscription: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("Finalizer error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<OperatorError>>),

    #[error("Config secret not found: {0}")]
    ConfigSecretNotFound(String),

    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),
}

pub type Result<T> = std::result::Result<T, OperatorError>;
