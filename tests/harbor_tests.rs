//! # Harbor Tests
//!
//! The top level resource fans out into one resource per component, all
//! owned by it, so deleting the `Harbor` removes the whole deployment.

mod common;

use common::{child, context, owned_by, run, seed, stored, NAMESPACE};
use harbor_operator::config::ControllerConfig;
use harbor_operator::constants::CLASS_LABEL;
use harbor_operator::controller::components::{CoreComposer, HarborComposer};
use harbor_operator::controller::resources::{InMemoryApi, ObjectApi};
use harbor_operator::controller::templates::TemplateCache;
use harbor_operator::crd::{
    ChildKind, ComponentSpec, Core, Harbor, HarborComponents, HarborNotaryComponent, HarborSpec,
};
use kube::core::ApiResource;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

const COMPONENTS: [(ChildKind, &str); 5] = [
    (ChildKind::Core, "sample-core"),
    (ChildKind::Registry, "sample-registry"),
    (ChildKind::RegistryController, "sample-registryctl"),
    (ChildKind::JobService, "sample-jobservice"),
    (ChildKind::Portal, "sample-portal"),
];

fn harbor(components: HarborComponents) -> Harbor {
    Harbor::new(
        "sample",
        HarborSpec {
            public_url: "https://registry.example.com/".to_string(),
            database_secret: "harbor-database".to_string(),
            tls_secret_name: None,
            redis_secret: None,
            components,
        },
    )
}

#[tokio::test]
async fn test_components_are_owned_by_harbor() {
    let api = Arc::new(InMemoryApi::new());
    let harbor = seed(&api, harbor(HarborComponents::default()));
    let ctx = context(&api, HarborComposer, ControllerConfig::default());

    run::<Harbor>(&api, &ctx, "sample").await.expect("pass");

    for (kind, name) in COMPONENTS {
        let component = child(&api, kind, name).unwrap_or_else(|| panic!("{kind:?} {name}"));
        assert!(owned_by(&component, &harbor), "{kind:?} owned by harbor");
    }
    assert!(child(&api, ChildKind::NotaryServer, "sample-notary-server").is_none());
    assert!(child(&api, ChildKind::ChartMuseum, "sample-chartmuseum").is_none());

    let core = child(&api, ChildKind::Core, "sample-core").expect("core");
    assert_eq!(core.data["spec"]["secretRef"], "sample");
    let secret = child(&api, ChildKind::Secret, "sample").expect("shared core secret");
    assert!(owned_by(&secret, &harbor));

    api.reset_writes();
    run::<Harbor>(&api, &ctx, "sample").await.expect("second pass");
    assert_eq!(api.writes(), 0);
}

#[tokio::test]
async fn test_optional_components() {
    let api = Arc::new(InMemoryApi::new());
    seed(
        &api,
        harbor(HarborComponents {
            notary_server: Some(HarborNotaryComponent {
                component: ComponentSpec::default(),
                public_url: Some("https://notary.example.com".to_string()),
                issuer_name: "letsencrypt".to_string(),
            }),
            chart_museum: Some(ComponentSpec::default()),
            ..HarborComponents::default()
        }),
    );
    let ctx = context(&api, HarborComposer, ControllerConfig::default());

    run::<Harbor>(&api, &ctx, "sample").await.expect("pass");

    let notary = child(&api, ChildKind::NotaryServer, "sample-notary-server").expect("notary");
    assert_eq!(notary.data["spec"]["issuerName"], "letsencrypt");
    let chart_museum = child(&api, ChildKind::ChartMuseum, "sample-chartmuseum").expect("charts");
    assert_eq!(
        chart_museum.data["spec"]["publicURL"],
        "https://registry.example.com/chartrepo"
    );
}

#[tokio::test]
async fn test_components_inherit_the_class() {
    let api = Arc::new(InMemoryApi::new());
    let mut labelled = harbor(HarborComponents::default());
    labelled.metadata.labels = Some(BTreeMap::from([(
        CLASS_LABEL.to_string(),
        "blue".to_string(),
    )]));
    seed(&api, labelled);
    let config = ControllerConfig {
        class_name: "blue".to_string(),
        ..ControllerConfig::default()
    };
    let ctx = context(&api, HarborComposer, config);

    run::<Harbor>(&api, &ctx, "sample").await.expect("pass");

    let core: Core = stored(&api, "sample-core");
    assert_eq!(core.labels().get(CLASS_LABEL).map(String::as_str), Some("blue"));
}

#[tokio::test]
async fn test_deleting_harbor_removes_everything() {
    let api = Arc::new(InMemoryApi::new());
    seed(&api, harbor(HarborComponents::default()));
    let harbor_ctx = context(&api, HarborComposer, ControllerConfig::default());
    run::<Harbor>(&api, &harbor_ctx, "sample").await.expect("harbor pass");

    // One level further down: the core workload owned by the core resource
    let core_ctx = context(
        &api,
        CoreComposer::new(Arc::new(TemplateCache::builtin())),
        ControllerConfig::default(),
    );
    run::<Core>(&api, &core_ctx, "sample-core").await.expect("core pass");
    assert!(child(&api, ChildKind::Deployment, "sample-core").is_some());

    let ar = ApiResource::erase::<Harbor>(&());
    assert!(api.delete(&ar, NAMESPACE, "sample").await.expect("delete"));

    for (kind, name) in COMPONENTS {
        assert!(child(&api, kind, name).is_none(), "{kind:?} {name} removed");
    }
    for kind in [
        ChildKind::Secret,
        ChildKind::ConfigMap,
        ChildKind::Service,
        ChildKind::Deployment,
    ] {
        assert_eq!(api.count(&kind.api_resource(), NAMESPACE), 0, "{kind:?} removed");
    }

    // A pass for a deleted resource is a no-op
    api.reset_writes();
    let deleted = Arc::new(harbor(HarborComponents::default()));
    harbor_operator::controller::reconciler::reconcile(deleted, harbor_ctx)
        .await
        .expect("pass on deleted harbor");
    assert_eq!(api.writes(), 0);
}
