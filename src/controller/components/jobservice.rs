//! Job service: replication, scanning and garbage collection jobs.

use super::{
    child_meta, container_port, env, env_from_secret, http_probe, http_service, labels,
    rollout_annotations, WorkloadTemplate,
};
use super::core::CORE_SECRET_KEY;
use crate::controller::checksum::config_map_checksum;
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::controller::templates::{Template, TemplateCache};
use crate::crd::{ChildKind, JobService};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

const APP: &str = "jobservice";
const IMAGE: &str = "goharbor/harbor-jobservice:v2.0.0";
const INIT_IMAGE: &str = "hairyhenderson/gomplate";
const PORT: i32 = 8080;
const LOGS_DIRECTORY: &str = "/var/log/jobs";

pub struct JobServiceComposer {
    templates: Arc<TemplateCache>,
}

impl JobServiceComposer {
    pub fn new(templates: Arc<TemplateCache>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl ChildComposer<JobService> for JobServiceComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[ChildKind::ConfigMap, ChildKind::Service, ChildKind::Deployment]
    }

    async fn compose(
        &self,
        jobservice: &JobService,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = jobservice.name_any();
        let mut labels = labels(APP, resources);
        labels.insert("harbor".to_string(), name.clone());
        let config_name = Template::JobServiceConfig.file_name();

        let config_map = ConfigMap {
            metadata: child_meta(&name, &labels),
            binary_data: Some(BTreeMap::from([(
                config_name.to_string(),
                ByteString(self.templates.get(Template::JobServiceConfig).to_vec()),
            )])),
            ..Default::default()
        };
        resources.add(&config_map, ApplyMode::Tracked).await?;

        resources
            .add(&http_service(&name, &labels, 80, PORT), ApplyMode::Tracked)
            .await?;

        let spec = &jobservice.spec;
        let mut render_env = vec![
            env("WORKER_COUNT", spec.worker_count.to_string()),
            env("LOG_LEVEL", "info"),
        ];
        if let Some(redis) = &spec.redis_secret {
            render_env.push(env_from_secret("REDIS_URL", redis, "url", false));
        }

        let deployment = WorkloadTemplate {
            name: &name,
            labels: &labels,
            component: &spec.component,
            annotations: rollout_annotations(Some(config_map_checksum(&config_map)), None),
            init_containers: vec![Container {
                name: "configuration".to_string(),
                image: Some(INIT_IMAGE.to_string()),
                args: Some(vec![
                    "--file".to_string(),
                    format!("/workdir/{config_name}"),
                    "--out".to_string(),
                    format!("/processed/{config_name}"),
                ]),
                env: Some(render_env),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "config-template".to_string(),
                        mount_path: "/workdir".to_string(),
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
                image: Some(spec.component.image_or(IMAGE)),
                ports: container_port(PORT),
                env: Some(vec![
                    env("CORE_URL", spec.core_url.clone()),
                    env("JOBSERVICE_WEBHOOK_JOB_MAX_RETRY", "5"),
                    env_from_secret("CORE_SECRET", &spec.secret_ref, CORE_SECRET_KEY, false),
                    env_from_secret("JOBSERVICE_SECRET", &spec.secret_ref, CORE_SECRET_KEY, false),
                ]),
                args: Some(vec!["-c".to_string(), format!("/etc/jobservice/{config_name}")]),
                liveness_probe: Some(http_probe("/api/v1/stats", PORT)),
                readiness_probe: Some(http_probe("/api/v1/stats", PORT)),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "config".to_string(),
                        mount_path: "/etc/jobservice".to_string(),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: "logs".to_string(),
                        mount_path: LOGS_DIRECTORY.to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }],
            volumes: vec![
                Volume {
                    name: "config-template".to_string(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: name.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Volume {
                    name: "config".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: "logs".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
            ],
        }
        .deployment();
        resources.add(&deployment, ApplyMode::Tracked).await?;

        Ok(ComposeOutcome::default())
    }
}
