//! Harbor core: API, authentication and the web backend.

use super::{
    child_meta, container_port, env, env_from_secret, http_probe, http_service, labels,
    rollout_annotations, WorkloadTemplate,
};
use crate::controller::checksum::{config_map_checksum, secret_checksum};
use crate::controller::password::{generate, PasswordError, PasswordPolicy};
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::controller::templates::{Template, TemplateCache};
use crate::crd::{ChildKind, Core};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, KeyToPath,
    SecretVolumeSource, Volume, VolumeMount,
};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

const APP: &str = "core";
const IMAGE: &str = "goharbor/harbor-core:v2.0.0";
const INIT_IMAGE: &str = "hairyhenderson/gomplate";
const PORT: i32 = 8080;
const CONFIG_PATH: &str = "/etc/core";

/// Key of the secret shared between core and the job service
pub const CORE_SECRET_KEY: &str = "secret";
/// Key of the token signing key
pub const SECRET_KEY_KEY: &str = "secretKey";

pub struct CoreComposer {
    templates: Arc<TemplateCache>,
}

impl CoreComposer {
    pub fn new(templates: Arc<TemplateCache>) -> Self {
        Self { templates }
    }
}

/// Values of a newly generated core secret
pub(crate) fn generate_core_secret() -> Result<BTreeMap<String, String>, PasswordError> {
    Ok(BTreeMap::from([
        (CORE_SECRET_KEY.to_string(), generate(&PasswordPolicy::CORE)?),
        (SECRET_KEY_KEY.to_string(), generate(&PasswordPolicy::CORE)?),
    ]))
}

#[async_trait]
impl ChildComposer<Core> for CoreComposer {
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
        core: &Core,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = core.name_any();
        let labels = labels(APP, resources);
        let config_name = Template::CoreAppConf.file_name();

        let secret_name = core.spec.secret_ref.clone().unwrap_or_else(|| name.clone());
        let secret = resources
            .ensure_secret(child_meta(&secret_name, &labels), generate_core_secret)
            .await?;

        let config_map = ConfigMap {
            metadata: child_meta(&name, &labels),
            data: Some(BTreeMap::from([(
                config_name.to_string(),
                self.templates.text(Template::CoreAppConf),
            )])),
            ..Default::default()
        };
        resources.add(&config_map, ApplyMode::Tracked).await?;

        resources
            .add(&http_service(&name, &labels, 80, PORT), ApplyMode::Tracked)
            .await?;

        let mut envs = vec![
            env("EXT_ENDPOINT", core.spec.public_url.clone()),
            env("LOG_LEVEL", core.spec.log_level.clone()),
            env("AUTH_MODE", "db_auth"),
            env("DATABASE_TYPE", "postgresql"),
            env("CORE_URL", format!("http://{name}")),
            env("CORE_LOCAL_URL", format!("http://{name}")),
            env_from_secret("CORE_SECRET", &secret_name, CORE_SECRET_KEY, false),
            env_from_secret("JOBSERVICE_SECRET", &secret_name, CORE_SECRET_KEY, false),
            env_from_secret("POSTGRESQL_HOST", &core.spec.database_secret, "host", false),
            env_from_secret("POSTGRESQL_PORT", &core.spec.database_secret, "port", false),
            env_from_secret("POSTGRESQL_USERNAME", &core.spec.database_secret, "username", false),
            env_from_secret("POSTGRESQL_PASSWORD", &core.spec.database_secret, "password", false),
        ];
        if let Some(cache) = &core.spec.registry_cache_secret {
            envs.push(env_from_secret("_REDIS_URL_REG", cache, "url", true));
        }

        let deployment = WorkloadTemplate {
            name: &name,
            labels: &labels,
            component: &core.spec.component,
            annotations: rollout_annotations(
                Some(config_map_checksum(&config_map)),
                Some(secret_checksum(&secret)),
            ),
            init_containers: vec![Container {
                name: "configuration".to_string(),
                image: Some(INIT_IMAGE.to_string()),
                working_dir: Some("/workdir".to_string()),
                args: Some(vec![
                    "--input-dir".to_string(),
                    "/workdir".to_string(),
                    "--output-dir".to_string(),
                    "/processed".to_string(),
                ]),
                env: Some(vec![env("PORT", PORT.to_string())]),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "config-template".to_string(),
                        mount_path: format!("/workdir/{config_name}"),
                        sub_path: Some(config_name.to_string()),
                        read_only: Some(true),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: "config".to_string(),
                        mount_path: "/processed".to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }],
            containers: vec![Container {
                name: APP.to_string(),
                image: Some(core.spec.component.image_or(IMAGE)),
                ports: container_port(PORT),
                env: Some(envs),
                liveness_probe: Some(http_probe("/api/ping", PORT)),
                readiness_probe: Some(http_probe("/api/ping", PORT)),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "config".to_string(),
                        mount_path: CONFIG_PATH.to_string(),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: "secret-key".to_string(),
                        mount_path: format!("{CONFIG_PATH}/key"),
                        sub_path: Some("key".to_string()),
                        read_only: Some(true),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }],
            volumes: vec![
                Volume {
                    name: "config".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: "config-template".to_string(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: name.clone(),
                        items: Some(vec![KeyToPath {
                            key: config_name.to_string(),
                            path: config_name.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Volume {
                    name: "secret-key".to_string(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(secret_name.clone()),
                        items: Some(vec![KeyToPath {
                            key: SECRET_KEY_KEY.to_string(),
                            path: "key".to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        }
        .deployment();
        resources.add(&deployment, ApplyMode::Tracked).await?;

        Ok(ComposeOutcome::default())
    }
}
