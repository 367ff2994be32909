//! Registry controller. Only its bootstrap configuration and secret exist so far.

use super::{child_meta, labels};
use crate::controller::password::{generate, PasswordPolicy};
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::controller::templates::{Template, TemplateCache};
use crate::crd::{ChildKind, RegistryController};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

const APP: &str = "registryctl";

pub struct RegistryControllerComposer {
    templates: Arc<TemplateCache>,
}

impl RegistryControllerComposer {
    pub fn new(templates: Arc<TemplateCache>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl ChildComposer<RegistryController> for RegistryControllerComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[ChildKind::Secret]
    }

    async fn compose(
        &self,
        registryctl: &RegistryController,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = registryctl.name_any();
        let labels = labels(APP, resources);

        // Bootstrap configuration, edited in place by administrators afterwards
        let config_map = ConfigMap {
            metadata: child_meta(&name, &labels),
            data: Some(BTreeMap::from([(
                Template::RegistryControllerConfig.file_name().to_string(),
                self.templates.text(Template::RegistryControllerConfig),
            )])),
            ..Default::default()
        };
        resources.add(&config_map, ApplyMode::Instant).await?;

        resources
            .ensure_secret(child_meta(&format!("{name}-registryctl"), &labels), || {
                Ok(BTreeMap::from([(
                    "REGISTRY_HTTP_SECRET".to_string(),
                    generate(&PasswordPolicy::REGISTRY_CONTROLLER)?,
                )]))
            })
            .await?;

        Err(ReconcilerError::Unimplemented(format!(
            "registry controller workload for registry {}",
            registryctl.spec.registry_name
        )))
    }
}
