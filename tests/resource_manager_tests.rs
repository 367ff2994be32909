//! # Resource Manager Tests
//!
//! Apply modes against the in-memory API.

mod common;

use common::{child, owned_by, seed, NAMESPACE};
use harbor_operator::controller::reconciler::ReconcilerError;
use harbor_operator::controller::resources::{ApplyMode, InMemoryApi, ResourceManager};
use harbor_operator::crd::{ChildKind, ComponentSpec, Portal, PortalSpec};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn owner(api: &InMemoryApi, name: &str) -> Portal {
    seed(
        api,
        Portal::new(
            name,
            PortalSpec {
                component: ComponentSpec::default(),
            },
        ),
    )
}

fn manager(api: &Arc<InMemoryApi>, owner: &Portal, cancel: CancellationToken) -> ResourceManager {
    ResourceManager::for_owner(
        api.clone(),
        owner,
        "harbor-operator",
        &[ChildKind::ConfigMap],
        cancel,
    )
    .expect("manager")
}

fn config_map(value: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some("settings".to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_tracked_child_is_written_only_on_change() {
    let api = Arc::new(InMemoryApi::new());
    let owner = owner(&api, "portal");
    let resources = manager(&api, &owner, CancellationToken::new());

    assert!(resources.add(&config_map("a"), ApplyMode::Tracked).await.expect("create"));
    assert!(!resources.add(&config_map("a"), ApplyMode::Tracked).await.expect("no-op"));
    assert!(resources.add(&config_map("b"), ApplyMode::Tracked).await.expect("update"));

    let stored = child(&api, ChildKind::ConfigMap, "settings").expect("stored");
    assert_eq!(stored.data["data"]["key"], "b");
    assert_eq!(api.writes(), 2);
    assert_eq!(resources.applied().len(), 1);
}

#[tokio::test]
async fn test_basic_child_is_written_every_pass() {
    let api = Arc::new(InMemoryApi::new());
    let owner = owner(&api, "portal");
    let resources = manager(&api, &owner, CancellationToken::new());

    resources.add(&config_map("a"), ApplyMode::Basic).await.expect("create");
    assert!(resources.add(&config_map("a"), ApplyMode::Basic).await.expect("update"));
    assert_eq!(api.writes(), 2);
}

#[tokio::test]
async fn test_child_deleted_before_update_is_recreated() {
    let api = Arc::new(InMemoryApi::new());
    let owner = owner(&api, "portal");
    let resources = manager(&api, &owner, CancellationToken::new());

    resources.add(&config_map("a"), ApplyMode::Tracked).await.expect("create");
    let first = child(&api, ChildKind::ConfigMap, "settings").expect("stored");

    // Gone between the read and the replace of the next add
    api.delete_before_next_replace_of("ConfigMap");
    assert!(resources.add(&config_map("b"), ApplyMode::Tracked).await.expect("recreate"));

    let recreated = child(&api, ChildKind::ConfigMap, "settings").expect("recreated");
    assert_eq!(recreated.data["data"]["key"], "b");
    assert_ne!(recreated.metadata.uid, first.metadata.uid);
    assert!(owned_by(&recreated, &owner));
}

#[tokio::test]
async fn test_instant_child_has_no_owner_and_is_not_recorded() {
    let api = Arc::new(InMemoryApi::new());
    let owner = owner(&api, "portal");
    let resources = manager(&api, &owner, CancellationToken::new());

    assert!(resources.add(&config_map("a"), ApplyMode::Instant).await.expect("create"));
    assert!(!resources.add(&config_map("b"), ApplyMode::Instant).await.expect("untouched"));

    let stored = child(&api, ChildKind::ConfigMap, "settings").expect("stored");
    assert!(stored.metadata.owner_references.is_none());
    assert_eq!(stored.data["data"]["key"], "a");
    assert!(resources.applied().is_empty());
}

#[tokio::test]
async fn test_child_of_another_owner_is_not_adopted() {
    let api = Arc::new(InMemoryApi::new());
    let first = owner(&api, "first");
    let second = owner(&api, "second");

    manager(&api, &first, CancellationToken::new())
        .add(&config_map("a"), ApplyMode::Tracked)
        .await
        .expect("create");
    let result = manager(&api, &second, CancellationToken::new())
        .add(&config_map("b"), ApplyMode::Tracked)
        .await;

    assert!(matches!(result, Err(ReconcilerError::Consistency(_))));
    let stored = child(&api, ChildKind::ConfigMap, "settings").expect("stored");
    assert_eq!(stored.data["data"]["key"], "a");
}

#[tokio::test]
async fn test_cancelled_manager_writes_nothing() {
    let api = Arc::new(InMemoryApi::new());
    let owner = owner(&api, "portal");
    let cancel = CancellationToken::new();
    let resources = manager(&api, &owner, cancel.clone());
    cancel.cancel();

    let result = resources.add(&config_map("a"), ApplyMode::Tracked).await;
    assert!(matches!(result, Err(ReconcilerError::Cancelled)));
    assert_eq!(api.writes(), 0);
    assert_eq!(api.count(&ChildKind::ConfigMap.api_resource(), NAMESPACE), 0);
}
