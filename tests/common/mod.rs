//! Shared fixtures for the reconciliation tests
//!
//! Resources are seeded into an [`InMemoryApi`] and reconciled through the
//! same entry point the controllers use.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use harbor_operator::config::ControllerConfig;
use harbor_operator::controller::reconciler::{reconcile, ChildComposer, Reconciler, ReconcilerError};
use harbor_operator::controller::resources::{from_dynamic, InMemoryApi};
use harbor_operator::crd::{ChildKind, ComponentStatus, ManagedResource};
use kube::core::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "registry";

/// Store the resource and return it as the API server would, uid included
pub fn seed<K: ManagedResource>(api: &InMemoryApi, mut obj: K) -> K {
    obj.meta_mut().namespace = Some(NAMESPACE.to_string());
    let stored = api.seed(&obj).expect("seed resource");
    from_dynamic(stored).expect("decode seeded resource")
}

/// Current stored version of a managed resource
pub fn stored<K: ManagedResource>(api: &InMemoryApi, name: &str) -> K {
    let ar = ApiResource::erase::<K>(&());
    let obj = api.object(&ar, NAMESPACE, name).expect("resource is stored");
    from_dynamic(obj).expect("decode stored resource")
}

pub fn stored_status<K: ManagedResource>(api: &InMemoryApi, name: &str) -> Option<ComponentStatus> {
    stored::<K>(api, name).status().cloned()
}

pub fn child(api: &InMemoryApi, kind: ChildKind, name: &str) -> Option<DynamicObject> {
    api.object(&kind.api_resource(), NAMESPACE, name)
}

pub fn context<K: ManagedResource>(
    api: &Arc<InMemoryApi>,
    composer: impl ChildComposer<K> + 'static,
    config: ControllerConfig,
) -> Arc<Reconciler<K>> {
    Arc::new(Reconciler::new(
        api.clone(),
        Arc::new(composer),
        config,
        CancellationToken::new(),
    ))
}

/// Reconcile the stored version of `name`
pub async fn run<K: ManagedResource>(
    api: &InMemoryApi,
    ctx: &Arc<Reconciler<K>>,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let obj = stored::<K>(api, name);
    reconcile(Arc::new(obj), ctx.clone()).await
}

/// Whether `child` is controlled by `owner`
pub fn owned_by<K: ManagedResource>(child: &DynamicObject, owner: &K) -> bool {
    let uid = owner.uid().expect("owner has a uid");
    child
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|o| o.uid == uid && o.controller == Some(true))
}
