//! # Reconcile Tests
//!
//! Component reconciles against the in-memory API:
//! - converged resources cause no write
//! - the class filter keeps foreign resources untouched
//! - a failing child aborts the pass and is reported on the status
//! - components that are not built yet are parked, not retried
//! - a child controlled by someone else parks the resource with an error
//! - a shutdown during a pass stops before the next child and writes no status

mod common;

use async_trait::async_trait;
use common::{child, context, owned_by, run, seed, stored_status, NAMESPACE};
use harbor_operator::config::ControllerConfig;
use harbor_operator::constants::{APPLIED_CONDITION, CLASS_LABEL};
use harbor_operator::controller::components::{
    CoreComposer, PortalComposer, RegistryControllerComposer,
};
use harbor_operator::controller::reconciler::{
    ChildComposer, ComposeOutcome, Reconciler, ReconcilerError,
};
use harbor_operator::controller::resources::{ApplyMode, InMemoryApi, ObjectApi, ResourceManager};
use harbor_operator::controller::templates::TemplateCache;
use harbor_operator::crd::{
    ChildKind, ComponentSpec, Core, CoreSpec, Portal, PortalSpec, RegistryController,
    RegistryControllerSpec,
};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn portal(name: &str) -> Portal {
    Portal::new(
        name,
        PortalSpec {
            component: ComponentSpec::default(),
        },
    )
}

fn core(name: &str) -> Core {
    Core::new(
        name,
        CoreSpec {
            component: ComponentSpec::default(),
            public_url: "https://registry.example.com".to_string(),
            log_level: "info".to_string(),
            database_secret: "harbor-database".to_string(),
            secret_ref: None,
            registry_cache_secret: None,
        },
    )
}

fn core_composer() -> CoreComposer {
    CoreComposer::new(Arc::new(TemplateCache::builtin()))
}

#[tokio::test]
async fn test_portal_second_pass_writes_nothing() {
    let api = Arc::new(InMemoryApi::new());
    let portal = seed(&api, portal("sample-portal"));
    let ctx = context(&api, PortalComposer, ControllerConfig::default());

    let action = run::<Portal>(&api, &ctx, "sample-portal").await.expect("first pass");
    assert_eq!(action, Action::await_change());

    let service = child(&api, ChildKind::Service, "sample-portal").expect("service");
    let deployment = child(&api, ChildKind::Deployment, "sample-portal").expect("deployment");
    assert!(owned_by(&service, &portal));
    assert!(owned_by(&deployment, &portal));

    let status = stored_status::<Portal>(&api, "sample-portal").expect("status written");
    let applied = status.condition(APPLIED_CONDITION).expect("applied condition");
    assert!(applied.is_true());
    assert_eq!(applied.message.as_deref(), Some("2 children applied"));

    api.reset_writes();
    run::<Portal>(&api, &ctx, "sample-portal").await.expect("second pass");
    assert_eq!(api.writes(), 0, "a converged portal must not be written again");
}

#[tokio::test]
async fn test_core_second_pass_writes_nothing() {
    let api = Arc::new(InMemoryApi::new());
    seed(&api, core("sample-core"));
    let ctx = context(&api, core_composer(), ControllerConfig::default());

    run::<Core>(&api, &ctx, "sample-core").await.expect("first pass");
    for kind in [
        ChildKind::Secret,
        ChildKind::ConfigMap,
        ChildKind::Service,
        ChildKind::Deployment,
    ] {
        assert!(child(&api, kind, "sample-core").is_some(), "{kind:?} created");
    }

    api.reset_writes();
    run::<Core>(&api, &ctx, "sample-core").await.expect("second pass");
    assert_eq!(api.writes(), 0);
}

#[tokio::test]
async fn test_core_secret_survives_spec_changes() {
    let api = Arc::new(InMemoryApi::new());
    seed(&api, core("sample-core"));
    let ctx = context(&api, core_composer(), ControllerConfig::default());

    run::<Core>(&api, &ctx, "sample-core").await.expect("first pass");
    let secret = child(&api, ChildKind::Secret, "sample-core").expect("secret");

    // Spec edited by the user: the generated credentials stay
    let ar = kube::core::ApiResource::erase::<Core>(&());
    let mut stored = api.object(&ar, NAMESPACE, "sample-core").expect("stored core");
    stored.data["spec"]["logLevel"] = serde_json::json!("debug");
    api.replace(&ar, NAMESPACE, &stored)
        .await
        .expect("update core");

    run::<Core>(&api, &ctx, "sample-core").await.expect("pass after change");
    let after = child(&api, ChildKind::Secret, "sample-core").expect("secret");
    assert_eq!(after.data["data"], secret.data["data"]);
    assert_eq!(after.metadata.resource_version, secret.metadata.resource_version);

    let deployment = child(&api, ChildKind::Deployment, "sample-core").expect("deployment");
    let envs = &deployment.data["spec"]["template"]["spec"]["containers"][0]["env"];
    let log_level = envs
        .as_array()
        .and_then(|envs| envs.iter().find(|e| e["name"] == "LOG_LEVEL"))
        .expect("LOG_LEVEL env");
    assert_eq!(log_level["value"], "debug");
}

#[tokio::test]
async fn test_other_class_is_left_alone() {
    let api = Arc::new(InMemoryApi::new());
    let mut foreign = portal("foreign-portal");
    foreign.metadata.labels = Some(BTreeMap::from([(
        CLASS_LABEL.to_string(),
        "blue".to_string(),
    )]));
    seed(&api, foreign);
    let ctx = context(&api, PortalComposer, ControllerConfig::default());

    let action = run::<Portal>(&api, &ctx, "foreign-portal").await.expect("pass");

    assert_eq!(action, Action::await_change());
    assert_eq!(api.writes(), 0);
    assert!(stored_status::<Portal>(&api, "foreign-portal").is_none());
    assert!(child(&api, ChildKind::Deployment, "foreign-portal").is_none());
}

#[tokio::test]
async fn test_matching_class_is_reconciled() {
    let api = Arc::new(InMemoryApi::new());
    let mut labelled = portal("blue-portal");
    labelled.metadata.labels = Some(BTreeMap::from([(
        CLASS_LABEL.to_string(),
        "blue".to_string(),
    )]));
    seed(&api, labelled);
    let config = ControllerConfig {
        class_name: "blue".to_string(),
        ..ControllerConfig::default()
    };
    let ctx = context(&api, PortalComposer, config);

    run::<Portal>(&api, &ctx, "blue-portal").await.expect("pass");
    assert!(child(&api, ChildKind::Deployment, "blue-portal").is_some());
}

#[tokio::test]
async fn test_failed_child_aborts_the_pass() {
    let api = Arc::new(InMemoryApi::new());
    seed(&api, core("sample-core"));
    api.fail_writes_of("Service");
    let ctx = context(&api, core_composer(), ControllerConfig::default());

    let result = run::<Core>(&api, &ctx, "sample-core").await;
    assert!(matches!(result, Err(ReconcilerError::Api { .. })));

    // Children submitted before the failure exist, the ones after do not
    assert!(child(&api, ChildKind::Secret, "sample-core").is_some());
    assert!(child(&api, ChildKind::ConfigMap, "sample-core").is_some());
    assert!(child(&api, ChildKind::Deployment, "sample-core").is_none());

    let status = stored_status::<Core>(&api, "sample-core").expect("failure status");
    let applied = status.condition(APPLIED_CONDITION).expect("applied condition");
    assert!(!applied.is_true());
    assert_eq!(applied.reason.as_deref(), Some("ApiError"));
}

#[tokio::test]
async fn test_unimplemented_component_is_parked() {
    let api = Arc::new(InMemoryApi::new());
    seed(
        &api,
        RegistryController::new(
            "sample-registryctl",
            RegistryControllerSpec {
                component: ComponentSpec::default(),
                registry_name: "sample-registry".to_string(),
            },
        ),
    );
    let ctx = context(
        &api,
        RegistryControllerComposer::new(Arc::new(TemplateCache::builtin())),
        ControllerConfig::default(),
    );

    let action = run::<RegistryController>(&api, &ctx, "sample-registryctl")
        .await
        .expect("parked, not failed");
    assert_eq!(action, Action::await_change());

    let config_map = child(&api, ChildKind::ConfigMap, "sample-registryctl").expect("config");
    assert!(config_map.metadata.owner_references.is_none());
    assert!(child(&api, ChildKind::Secret, "sample-registryctl-registryctl").is_some());

    let status = stored_status::<RegistryController>(&api, "sample-registryctl").expect("status");
    let applied = status.condition(APPLIED_CONDITION).expect("applied condition");
    assert!(!applied.is_true());
    assert_eq!(applied.reason.as_deref(), Some("NotImplemented"));
}

#[tokio::test]
async fn test_child_controlled_elsewhere_parks_the_resource() {
    let api = Arc::new(InMemoryApi::new());
    seed(&api, portal("sample-portal"));
    let taken = Service {
        metadata: ObjectMeta {
            name: Some("sample-portal".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: "someone-else".to_string(),
                uid: "5c0f8d9e-0000-4000-8000-000000000000".to_string(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        ..Default::default()
    };
    api.seed(&taken).expect("seed service");
    let ctx = context(&api, PortalComposer, ControllerConfig::default());

    let action = run::<Portal>(&api, &ctx, "sample-portal")
        .await
        .expect("parked, not retried");
    assert_eq!(action, Action::await_change());

    let status = stored_status::<Portal>(&api, "sample-portal").expect("status");
    let applied = status.condition(APPLIED_CONDITION).expect("applied condition");
    assert!(!applied.is_true());
    assert_eq!(applied.reason.as_deref(), Some("ConsistencyViolation"));
}

#[tokio::test]
async fn test_instant_child_is_never_rewritten() {
    let api = Arc::new(InMemoryApi::new());
    seed(
        &api,
        RegistryController::new(
            "sample-registryctl",
            RegistryControllerSpec {
                component: ComponentSpec::default(),
                registry_name: "sample-registry".to_string(),
            },
        ),
    );
    let ctx = context(
        &api,
        RegistryControllerComposer::new(Arc::new(TemplateCache::builtin())),
        ControllerConfig::default(),
    );
    run::<RegistryController>(&api, &ctx, "sample-registryctl")
        .await
        .expect("first pass");

    // Edited by an administrator
    let ar = ChildKind::ConfigMap.api_resource();
    let mut edited = child(&api, ChildKind::ConfigMap, "sample-registryctl").expect("config");
    edited.data["data"] = serde_json::json!({"config.yml": "edited"});
    api.replace(&ar, NAMESPACE, &edited)
        .await
        .expect("edit config");

    api.reset_writes();
    run::<RegistryController>(&api, &ctx, "sample-registryctl")
        .await
        .expect("second pass");

    let after = child(&api, ChildKind::ConfigMap, "sample-registryctl").expect("config");
    assert_eq!(after.data["data"]["config.yml"], "edited");
    assert_eq!(api.writes(), 0);
}

/// Applies two config maps, with the shutdown signal arriving in between
struct ShutdownBetweenChildren {
    cancel: CancellationToken,
}

fn named_config_map(name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[async_trait]
impl ChildComposer<Portal> for ShutdownBetweenChildren {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[ChildKind::ConfigMap]
    }

    async fn compose(
        &self,
        _portal: &Portal,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        resources
            .add(&named_config_map("first"), ApplyMode::Tracked)
            .await?;
        self.cancel.cancel();
        resources
            .add(&named_config_map("second"), ApplyMode::Tracked)
            .await?;
        Ok(ComposeOutcome::default())
    }
}

#[tokio::test]
async fn test_shutdown_mid_pass_stops_before_the_next_child() {
    let api = Arc::new(InMemoryApi::new());
    seed(&api, portal("sample-portal"));
    let cancel = CancellationToken::new();
    let ctx = Arc::new(Reconciler::new(
        api.clone(),
        Arc::new(ShutdownBetweenChildren {
            cancel: cancel.clone(),
        }),
        ControllerConfig::default(),
        cancel,
    ));

    let result = run::<Portal>(&api, &ctx, "sample-portal").await;
    assert!(matches!(result, Err(ReconcilerError::Cancelled)));

    assert!(child(&api, ChildKind::ConfigMap, "first").is_some());
    assert!(child(&api, ChildKind::ConfigMap, "second").is_none());
    assert!(stored_status::<Portal>(&api, "sample-portal").is_none());
}
