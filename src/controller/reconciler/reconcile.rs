//! # Reconciliation Logic
//!
//! One generic pass shared by every managed resource kind:
//!
//! 1. Fetch the resource (absent: stop)
//! 2. Class filter (mismatch: stop without any write)
//! 3. Compose and apply children through the resource manager
//! 4. Write the status when it changed
//! 5. Requeue: poll delay from the composer, otherwise wait for the next change
//!
//! Unimplemented components and consistency violations are reported on the
//! status and parked until the next change instead of backing off.
//!
//! Retry timing for failed passes belongs to the error policy, never to this loop.

use crate::controller::filter::matches_class;
use crate::controller::reconciler::status::{failed, succeeded, write_status};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::resources::{from_dynamic, ResourceManager};
use crate::crd::ManagedResource;
use crate::observability::metrics;
use kube::core::ApiResource;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Reconcile one managed resource
///
/// Errors are handled by the error policy of the runtime, which computes
/// the per-resource backoff.
pub async fn reconcile<K: ManagedResource>(
    obj: Arc<K>,
    ctx: Arc<Reconciler<K>>,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let span = info_span!(
        "reconcile",
        resource.kind = %K::kind(&()),
        resource.name = %name,
        resource.namespace = %namespace,
    );
    reconcile_inner(&ctx, &namespace, &name).instrument(span).await
}

async fn reconcile_inner<K: ManagedResource>(
    ctx: &Reconciler<K>,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    if ctx.cancel.is_cancelled() {
        return Err(ReconcilerError::Cancelled);
    }

    // The watch cache may lag behind, always work from the stored object
    let ar = ApiResource::erase::<K>(&());
    let fetched = ctx
        .api
        .get(&ar, namespace, name)
        .await
        .map_err(ReconcilerError::api("get", &ar.kind, namespace, name))?;
    let Some(fetched) = fetched else {
        debug!("resource no longer exists, children are garbage collected through their owner");
        return Ok(Action::await_change());
    };
    let current: K = from_dynamic(fetched).map_err(|source| ReconcilerError::Serialization {
        kind: ar.kind.clone(),
        source,
    })?;

    if !matches_class(&current, &ctx.config.class_name) {
        debug!(class = %ctx.config.class_name, "resource belongs to another operator class, skipping");
        return Ok(Action::await_change());
    }

    info!("Reconciling {} {}/{}", ar.kind, namespace, name);
    metrics::increment_reconciliations(K::COMPONENT);
    let start = Instant::now();

    let result = match ResourceManager::for_owner(
        ctx.api.clone(),
        &current,
        &ctx.config.operator_name,
        ctx.composer.owned_kinds(),
        ctx.cancel.clone(),
    ) {
        Ok(resources) => ctx
            .composer
            .compose(&current, &resources)
            .await
            .map(|outcome| (outcome, resources.applied().len())),
        Err(e) => Err(e),
    };
    metrics::observe_reconciliation_duration(K::COMPONENT, start.elapsed().as_secs_f64());

    match result {
        Ok((outcome, applied)) => {
            let status = succeeded(&current, &outcome, applied);
            write_status(ctx.api.as_ref(), &current, &status).await?;
            ctx.reset_backoff(namespace, name);

            info!(children = applied, "✅ Reconciled {} {}/{}", ar.kind, namespace, name);
            Ok(outcome
                .requeue_after
                .map_or_else(Action::await_change, Action::requeue))
        }
        // Shutting down, leave the status as the last complete pass wrote it
        Err(ReconcilerError::Cancelled) => Err(ReconcilerError::Cancelled),
        Err(error) => {
            let status = failed(&current, &error);
            if let Err(status_error) = write_status(ctx.api.as_ref(), &current, &status).await {
                warn!("Failed to write failure status: {}", status_error);
            }

            // Children applied so far stay in place, the resource waits for a change
            match &error {
                ReconcilerError::Unimplemented(what) => {
                    warn!("{} {}/{} is not fully implemented: {}", ar.kind, namespace, name, what);
                    Ok(Action::await_change())
                }
                ReconcilerError::Consistency(what) => {
                    metrics::increment_reconciliation_errors(K::COMPONENT, error.reason());
                    warn!("{} {}/{} is inconsistent, not retrying: {}", ar.kind, namespace, name, what);
                    Ok(Action::await_change())
                }
                _ => Err(error),
            }
        }
    }
}
