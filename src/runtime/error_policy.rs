//! # Error Policy
//!
//! Requeue delay after a failed reconcile. Backoff is tracked per resource so
//! one failing resource does not slow down the others.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::ManagedResource;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay used when the backoff state cannot be read
const FALLBACK_BACKOFF_SECS: u64 = 60;

/// Handle reconciliation errors with Fibonacci backoff
pub fn handle_reconciliation_error<K: ManagedResource>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    if matches!(error, ReconcilerError::Cancelled) {
        debug!(resource.name = %name, resource.namespace = %namespace, "reconcile cancelled by shutdown");
        return Action::await_change();
    }

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = K::COMPONENT,
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    metrics::increment_reconciliation_errors(K::COMPONENT, error.reason());

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key)
                .or_insert_with(|| BackoffState::new(&ctx.config));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (FALLBACK_BACKOFF_SECS, 0)
        }
    };

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::components::PortalComposer;
    use crate::controller::resources::InMemoryApi;
    use crate::crd::{ComponentSpec, Portal, PortalSpec};
    use tokio_util::sync::CancellationToken;

    fn context() -> Arc<Reconciler<Portal>> {
        let config = ControllerConfig::from_lookup(|key| match key {
            "BACKOFF_MIN_SECS" => Some("2".to_string()),
            "BACKOFF_MAX_SECS" => Some("20".to_string()),
            _ => None,
        });
        Arc::new(Reconciler::new(
            Arc::new(InMemoryApi::new()),
            Arc::new(PortalComposer),
            config,
            CancellationToken::new(),
        ))
    }

    fn portal() -> Arc<Portal> {
        let mut portal = Portal::new(
            "sample-portal",
            PortalSpec {
                component: ComponentSpec::default(),
            },
        );
        portal.metadata.namespace = Some("registry".to_string());
        Arc::new(portal)
    }

    #[test]
    fn test_backoff_grows_per_resource_and_resets() {
        let ctx = context();
        let error = ReconcilerError::NotReady("database".to_string());

        let first = handle_reconciliation_error(portal(), &error, ctx.clone());
        handle_reconciliation_error(portal(), &error, ctx.clone());
        let third = handle_reconciliation_error(portal(), &error, ctx.clone());
        assert_eq!(first, Action::requeue(Duration::from_secs(2)));
        assert_eq!(third, Action::requeue(Duration::from_secs(4)));

        ctx.reset_backoff("registry", "sample-portal");
        let after_reset = handle_reconciliation_error(portal(), &error, ctx);
        assert_eq!(after_reset, first);
    }

    #[test]
    fn test_cancelled_is_not_retried() {
        let action = handle_reconciliation_error(portal(), &ReconcilerError::Cancelled, context());
        assert_eq!(action, Action::await_change());
    }
}
