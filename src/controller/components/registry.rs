//! Docker distribution registry.

use super::{
    child_meta, container_port, env, env_from_secret, http_probe, http_service, labels,
    rollout_annotations, WorkloadTemplate,
};
use crate::controller::checksum::{config_map_checksum, secret_checksum};
use crate::controller::password::{generate, PasswordPolicy};
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::controller::templates::{Template, TemplateCache};
use crate::crd::{ChildKind, Registry};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvFromSource, SecretEnvSource, Volume,
    VolumeMount,
};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

const APP: &str = "registry";
const IMAGE: &str = "goharbor/registry-photon:v2.0.0";
const PORT: i32 = 5000;
const CONFIG_PATH: &str = "/etc/registry";

/// Key of the HTTP secret shared by the registry replicas
pub const HTTP_SECRET_KEY: &str = "REGISTRY_HTTP_SECRET";

pub struct RegistryComposer {
    templates: Arc<TemplateCache>,
}

impl RegistryComposer {
    pub fn new(templates: Arc<TemplateCache>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl ChildComposer<Registry> for RegistryComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[
            ChildKind::Secret,
            ChildKind::ConfigMap,
            ChildKind::Service,
            ChildKind::Deployment,
        ]
    }

    async fn compose(
        &self,
        registry: &Registry,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = registry.name_any();
        let labels = labels(APP, resources);
        let config_name = Template::RegistryConfig.file_name();

        let secret_name = format!("{name}-registry");
        let secret = resources
            .ensure_secret(child_meta(&secret_name, &labels), || {
                Ok(BTreeMap::from([(
                    HTTP_SECRET_KEY.to_string(),
                    generate(&PasswordPolicy::REGISTRY)?,
                )]))
            })
            .await?;

        let config_map = ConfigMap {
            metadata: child_meta(&name, &labels),
            data: Some(BTreeMap::from([(
                config_name.to_string(),
                self.templates.text(Template::RegistryConfig),
            )])),
            ..Default::default()
        };
        resources.add(&config_map, ApplyMode::Tracked).await?;

        resources
            .add(&http_service(&name, &labels, 80, PORT), ApplyMode::Tracked)
            .await?;

        let mut envs = vec![
            env("REGISTRY_LOG_LEVEL", registry.spec.log_level.clone()),
            env_from_secret(HTTP_SECRET_KEY, &secret_name, HTTP_SECRET_KEY, false),
        ];
        if let Some(cache) = &registry.spec.cache_secret {
            envs.push(env_from_secret("REGISTRY_REDIS_ADDR", cache, "addr", true));
        }
        let env_from = registry.spec.storage_secret.as_ref().map(|storage| {
            vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: storage.clone(),
                    optional: Some(false),
                }),
                ..Default::default()
            }]
        });

        let deployment = WorkloadTemplate {
            name: &name,
            labels: &labels,
            component: &registry.spec.component,
            annotations: rollout_annotations(
                Some(config_map_checksum(&config_map)),
                Some(secret_checksum(&secret)),
            ),
            init_containers: Vec::new(),
            containers: vec![Container {
                name: APP.to_string(),
                image: Some(registry.spec.component.image_or(IMAGE)),
                args: Some(vec![
                    "serve".to_string(),
                    format!("{CONFIG_PATH}/{config_name}"),
                ]),
                ports: container_port(PORT),
                env: Some(envs),
                env_from,
                liveness_probe: Some(http_probe("/", PORT)),
                readiness_probe: Some(http_probe("/", PORT)),
                volume_mounts: Some(vec![VolumeMount {
                    name: "config".to_string(),
                    mount_path: CONFIG_PATH.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: vec![Volume {
                name: "config".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        }
        .deployment();
        resources.add(&deployment, ApplyMode::Tracked).await?;

        Ok(ComposeOutcome::default())
    }
}
