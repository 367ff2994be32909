//! Notary server: content trust signing API, served over TLS.

use super::{
    child_meta, container_port, env, env_from_secret, http_service, labels, rollout_annotations,
    WorkloadTemplate,
};
use crate::controller::checksum::config_map_checksum;
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::{ApplyMode, ResourceManager};
use crate::controller::templates::{Template, TemplateCache};
use crate::crd::{Certificate, CertificateSpec, ChildKind, IssuerRef, NotaryServer};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

const APP: &str = "notary-server";
const IMAGE: &str = "goharbor/notary-server-photon:v2.0.0";
const INIT_IMAGE: &str = "hairyhenderson/gomplate";
const PORT: i32 = 4443;
const CERTIFICATES_PATH: &str = "/etc/notary/certificates";

pub struct NotaryServerComposer {
    templates: Arc<TemplateCache>,
}

impl NotaryServerComposer {
    pub fn new(templates: Arc<TemplateCache>) -> Self {
        Self { templates }
    }
}

/// Host part of a URL such as `https://notary.example.com/path`
pub(crate) fn url_host(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(without_scheme)
}

#[async_trait]
impl ChildComposer<NotaryServer> for NotaryServerComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[
            ChildKind::Certificate,
            ChildKind::ConfigMap,
            ChildKind::Service,
            ChildKind::Deployment,
            ChildKind::Ingress,
        ]
    }

    async fn compose(
        &self,
        notary: &NotaryServer,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let name = notary.name_any();
        let labels = labels(APP, resources);
        let spec = &notary.spec;
        let tls_secret = format!("{name}-tls");
        let config_name = Template::NotaryServerConfig.file_name();

        let mut dns_names = vec![format!("{name}.{}.svc", resources.namespace())];
        if let Some(url) = &spec.public_url {
            dns_names.insert(0, url_host(url).to_string());
        }
        let certificate = Certificate {
            metadata: child_meta(&name, &labels),
            spec: CertificateSpec {
                secret_name: tls_secret.clone(),
                dns_names,
                issuer_ref: IssuerRef {
                    name: spec.issuer_name.clone(),
                    kind: Some("Issuer".to_string()),
                },
            },
        };
        resources.add(&certificate, ApplyMode::Tracked).await?;

        let config_map = ConfigMap {
            metadata: child_meta(&name, &labels),
            data: Some(BTreeMap::from([(
                config_name.to_string(),
                self.templates.text(Template::NotaryServerConfig),
            )])),
            ..Default::default()
        };
        resources.add(&config_map, ApplyMode::Tracked).await?;

        resources
            .add(&http_service(&name, &labels, PORT, PORT), ApplyMode::Tracked)
            .await?;

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
                env: Some(vec![
                    env("LOG_LEVEL", "info"),
                    env("SIGNER_HOSTNAME", format!("{name}-signer")),
                    env("CORE_URL", spec.public_url.clone().unwrap_or_default()),
                    env_from_secret("DATABASE_URL", &spec.database_secret, "url", false),
                ]),
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
                args: Some(vec![
                    "-config".to_string(),
                    format!("/etc/notary/{config_name}"),
                ]),
                ports: container_port(PORT),
                volume_mounts: Some(vec![
                    VolumeMount {
                        name: "config".to_string(),
                        mount_path: "/etc/notary".to_string(),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: "certificates".to_string(),
                        mount_path: CERTIFICATES_PATH.to_string(),
                        read_only: Some(true),
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
                    name: "certificates".to_string(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(tls_secret.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        }
        .deployment();
        resources.add(&deployment, ApplyMode::Tracked).await?;

        if let Some(url) = &spec.public_url {
            let host = url_host(url).to_string();
            let ingress = Ingress {
                metadata: child_meta(&name, &labels),
                spec: Some(IngressSpec {
                    tls: Some(vec![IngressTLS {
                        hosts: Some(vec![host.clone()]),
                        secret_name: Some(tls_secret),
                    }]),
                    rules: Some(vec![IngressRule {
                        host: Some(host),
                        http: Some(HTTPIngressRuleValue {
                            paths: vec![HTTPIngressPath {
                                path: Some("/".to_string()),
                                path_type: "Prefix".to_string(),
                                backend: IngressBackend {
                                    service: Some(IngressServiceBackend {
                                        name: name.clone(),
                                        port: Some(ServiceBackendPort {
                                            number: Some(PORT),
                                            ..Default::default()
                                        }),
                                    }),
                                    ..Default::default()
                                },
                            }],
                        }),
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            };
            resources.add(&ingress, ApplyMode::Tracked).await?;
        }

        Ok(ComposeOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://notary.example.com"), "notary.example.com");
        assert_eq!(url_host("https://notary.example.com/v2/"), "notary.example.com");
        assert_eq!(url_host("notary.example.com:4443"), "notary.example.com:4443");
    }
}
