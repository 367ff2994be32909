//! Top level `Harbor`: the shared core secret and one resource per component.
//!
//! Component resources inherit the class of their `Harbor`, so the operator
//! instance managing the parent also manages its components.

use super::core::generate_core_secret;
use super::{child_meta, labels};
use crate::constants::CLASS_LABEL;
use crate::controller::filter::class_of;
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::crd::{
    ChartMuseum, ChartMuseumSpec, ChildKind, Core, CoreSpec, Harbor, JobService, JobServiceSpec,
    NotaryServer, NotaryServerSpec, Portal, PortalSpec, Registry, RegistryController,
    RegistryControllerSpec, RegistrySpec,
};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

const APP: &str = "harbor";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_JOB_WORKERS: i32 = 10;

#[derive(Debug, Default)]
pub struct HarborComposer;

/// Label a component resource like its parent
fn component<K>(mut child: K, labels: &BTreeMap<String, String>) -> K
where
    K: Resource,
{
    child.meta_mut().labels = Some(labels.clone());
    child
}

#[async_trait]
impl ChildComposer<Harbor> for HarborComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[
            ChildKind::Secret,
            ChildKind::Core,
            ChildKind::Registry,
            ChildKind::RegistryController,
            ChildKind::JobService,
            ChildKind::Portal,
            ChildKind::NotaryServer,
            ChildKind::ChartMuseum,
        ]
    }

    async fn compose(
        &self,
        harbor: &Harbor,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = harbor.name_any();
        let spec = &harbor.spec;
        let components = &spec.components;

        let mut labels = labels(APP, resources);
        let class = class_of(harbor);
        if !class.is_empty() {
            labels.insert(CLASS_LABEL.to_string(), class.to_string());
        }

        // Shared by core and the job service
        resources
            .ensure_secret(child_meta(&name, &labels), generate_core_secret)
            .await?;

        let core_name = harbor.child_name("core");
        let registry_name = harbor.child_name("registry");

        let core = Core::new(
            &core_name,
            CoreSpec {
                component: components.core.clone(),
                public_url: spec.public_url.clone(),
                log_level: DEFAULT_LOG_LEVEL.to_string(),
                database_secret: spec.database_secret.clone(),
                secret_ref: Some(name.clone()),
                registry_cache_secret: spec.redis_secret.clone(),
            },
        );
        resources
            .add(&component(core, &labels), ApplyMode::Tracked)
            .await?;

        let registry = Registry::new(
            &registry_name,
            RegistrySpec {
                component: components.registry.clone(),
                log_level: DEFAULT_LOG_LEVEL.to_string(),
                storage_secret: None,
                cache_secret: spec.redis_secret.clone(),
            },
        );
        resources
            .add(&component(registry, &labels), ApplyMode::Tracked)
            .await?;

        let registryctl = RegistryController::new(
            &harbor.child_name("registryctl"),
            RegistryControllerSpec {
                component: components.registry_controller.clone(),
                registry_name: registry_name.clone(),
            },
        );
        resources
            .add(&component(registryctl, &labels), ApplyMode::Tracked)
            .await?;

        let jobservice = JobService::new(
            &harbor.child_name("jobservice"),
            JobServiceSpec {
                component: components.job_service.clone(),
                core_url: format!("http://{core_name}"),
                secret_ref: name.clone(),
                worker_count: DEFAULT_JOB_WORKERS,
                redis_secret: spec.redis_secret.clone(),
            },
        );
        resources
            .add(&component(jobservice, &labels), ApplyMode::Tracked)
            .await?;

        let portal = Portal::new(
            &harbor.child_name("portal"),
            PortalSpec {
                component: components.portal.clone(),
            },
        );
        resources
            .add(&component(portal, &labels), ApplyMode::Tracked)
            .await?;

        if let Some(notary) = &components.notary_server {
            let notary = NotaryServer::new(
                &harbor.child_name("notary-server"),
                NotaryServerSpec {
                    component: notary.component.clone(),
                    public_url: notary.public_url.clone(),
                    database_secret: spec.database_secret.clone(),
                    issuer_name: notary.issuer_name.clone(),
                },
            );
            resources
                .add(&component(notary, &labels), ApplyMode::Tracked)
                .await?;
        }

        if let Some(chart_museum) = &components.chart_museum {
            let chart_museum = ChartMuseum::new(
                &harbor.child_name("chartmuseum"),
                ChartMuseumSpec {
                    component: chart_museum.clone(),
                    public_url: format!("{}/chartrepo", spec.public_url.trim_end_matches('/')),
                },
            );
            resources
                .add(&component(chart_museum, &labels), ApplyMode::Tracked)
                .await?;
        }

        Ok(ComposeOutcome::default())
    }
}
