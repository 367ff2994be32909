//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::password::PasswordError;
use crate::controller::reconciler::ChildComposer;
use crate::controller::resources::{ApiError, ObjectApi};
use crate::crd::ManagedResource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// API call failed, wrapped with the operation and the object it targeted
    #[error("cannot {operation} {kind} {namespace}/{name}: {source}")]
    Api {
        operation: &'static str,
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: ApiError,
    },
    /// A precondition owned by someone else is not met yet
    #[error("{0}")]
    NotReady(String),
    /// Cluster state has a shape the operator cannot reconcile
    #[error("consistency violation: {0}")]
    Consistency(String),
    /// Placeholder for components that are not built yet
    #[error("not yet implemented: {0}")]
    Unimplemented(String),
    #[error("reconcile cancelled")]
    Cancelled,
    #[error("cannot encode {kind}: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot generate credentials: {0}")]
    Password(#[from] PasswordError),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Build a mapper wrapping an [`ApiError`] with its operation and target
    pub fn api(
        operation: &'static str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> impl FnOnce(ApiError) -> Self {
        let kind = kind.to_string();
        let namespace = namespace.to_string();
        let name = name.to_string();
        move |source| Self::Api {
            operation,
            kind,
            namespace,
            name,
            source,
        }
    }

    /// Condition reason surfaced on the resource status
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Api { .. } => "ApiError",
            Self::NotReady(_) => "NotReady",
            Self::Consistency(_) => "ConsistencyViolation",
            Self::Unimplemented(_) => "NotImplemented",
            Self::Cancelled => "Cancelled",
            Self::Serialization { .. } => "InvalidObject",
            Self::Password(_) => "CredentialGenerationFailed",
            Self::ReconciliationFailed(_) => "ReconciliationFailed",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::new(config.backoff_min_secs, config.backoff_max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context of one controller
pub struct Reconciler<K: ManagedResource> {
    pub api: Arc<dyn ObjectApi>,
    pub composer: Arc<dyn ChildComposer<K>>,
    pub config: ControllerConfig,
    /// Cancelled on shutdown; in-flight reconciles stop between children
    pub cancel: CancellationToken,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K: ManagedResource> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("component", &K::COMPONENT)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: ManagedResource> Reconciler<K> {
    pub fn new(
        api: Arc<dyn ObjectApi>,
        composer: Arc<dyn ChildComposer<K>>,
        config: ControllerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            composer,
            config,
            cancel,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the error history of a resource after a successful pass
    pub fn reset_backoff(&self, namespace: &str, name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(&format!("{namespace}/{name}")) {
                state.reset();
            }
        }
    }
}
