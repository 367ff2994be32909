//! Web portal, a static frontend served by nginx.

use super::{container_port, http_probe, http_service, labels, rollout_annotations, WorkloadTemplate};
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::crd::{ChildKind, Portal};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Container;
use kube::ResourceExt;

const APP: &str = "portal";
const IMAGE: &str = "goharbor/harbor-portal:v2.0.0";
const PORT: i32 = 8080;

#[derive(Debug, Default)]
pub struct PortalComposer;

#[async_trait]
impl ChildComposer<Portal> for PortalComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[ChildKind::Service, ChildKind::Deployment]
    }

    async fn compose(
        &self,
        portal: &Portal,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = portal.name_any();
        let labels = labels(APP, resources);

        resources
            .add(&http_service(&name, &labels, 80, PORT), ApplyMode::Tracked)
            .await?;

        let deployment = WorkloadTemplate {
            name: &name,
            labels: &labels,
            component: &portal.spec.component,
            annotations: rollout_annotations(None, None),
            init_containers: Vec::new(),
            containers: vec![Container {
                name: APP.to_string(),
                image: Some(portal.spec.component.image_or(IMAGE)),
                ports: container_port(PORT),
                liveness_probe: Some(http_probe("/", PORT)),
                readiness_probe: Some(http_probe("/", PORT)),
                ..Default::default()
            }],
            volumes: Vec::new(),
        }
        .deployment();
        resources.add(&deployment, ApplyMode::Tracked).await?;

        Ok(ComposeOutcome::default())
    }
}
