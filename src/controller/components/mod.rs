//! # Components
//!
//! One [`ChildComposer`](crate::controller::reconciler::ChildComposer) per
//! managed resource kind, and the object builders they share.
//!
//! ## Module Structure
//!
//! - `harbor.rs` - Top level resource, creates one child resource per component
//! - `core.rs`, `registry.rs`, `registryctl.rs`, `jobservice.rs`,
//!   `notaryserver.rs`, `portal.rs`, `chartmuseum.rs` - Component workloads
//! - `harbor_cluster.rs` - In-cluster database through the lifecycle controller

mod chartmuseum;
mod core;
mod harbor;
mod harbor_cluster;
mod jobservice;
mod notaryserver;
mod portal;
mod registry;
mod registryctl;

pub use self::core::CoreComposer;
pub use chartmuseum::ChartMuseumComposer;
pub use harbor::HarborComposer;
pub use harbor_cluster::HarborClusterComposer;
pub use jobservice::JobServiceComposer;
pub use notaryserver::NotaryServerComposer;
pub use portal::PortalComposer;
pub use registry::RegistryComposer;
pub use registryctl::RegistryControllerComposer;

use crate::constants::{
    CONFIGURATION_CHECKSUM_ANNOTATION, OPERATOR_VERSION, OPERATOR_VERSION_ANNOTATION,
    SECRET_CHECKSUM_ANNOTATION,
};
use crate::controller::resources::ResourceManager;
use crate::crd::ComponentSpec;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, PodSpec, PodTemplateSpec,
    Probe, SecretKeySelector, Service, ServicePort, ServiceSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// `app` and `operator` labels carried by every child of a component
pub(crate) fn labels(app: &str, resources: &ResourceManager) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), app.to_string()),
        ("operator".to_string(), resources.operator_name().to_string()),
    ])
}

pub(crate) fn child_meta(name: &str, labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

/// ClusterIP service exposing `port` on the pods' `target_port`
pub(crate) fn http_service(
    name: &str,
    labels: &BTreeMap<String, String>,
    port: i32,
    target_port: i32,
) -> Service {
    Service {
        metadata: child_meta(name, labels),
        spec: Some(ServiceSpec {
            selector: Some(labels.clone()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::Int(target_port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod template annotations forcing a rollout when generated inputs change
pub(crate) fn rollout_annotations(
    configuration: Option<String>,
    secret: Option<String>,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([(
        OPERATOR_VERSION_ANNOTATION.to_string(),
        OPERATOR_VERSION.to_string(),
    )]);
    if let Some(sum) = configuration {
        annotations.insert(CONFIGURATION_CHECKSUM_ANNOTATION.to_string(), sum);
    }
    if let Some(sum) = secret {
        annotations.insert(SECRET_CHECKSUM_ANNOTATION.to_string(), sum);
    }
    annotations
}

pub(crate) fn http_probe(path: &str, port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        period_seconds: Some(10),
        ..Default::default()
    }
}

pub(crate) fn container_port(port: i32) -> Option<Vec<ContainerPort>> {
    Some(vec![ContainerPort {
        container_port: port,
        ..Default::default()
    }])
}

pub(crate) fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub(crate) fn env_from_secret(name: &str, secret: &str, key: &str, optional: bool) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(optional),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Single replica-set workload of a component
pub(crate) struct WorkloadTemplate<'a> {
    pub name: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub component: &'a ComponentSpec,
    pub annotations: BTreeMap<String, String>,
    pub init_containers: Vec<Container>,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

impl WorkloadTemplate<'_> {
    pub(crate) fn deployment(self) -> Deployment {
        Deployment {
            metadata: child_meta(self.name, self.labels),
            spec: Some(DeploymentSpec {
                replicas: self.component.replicas,
                revision_history_limit: Some(0),
                selector: LabelSelector {
                    match_labels: Some(self.labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels.clone()),
                        annotations: Some(self.annotations),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        automount_service_account_token: Some(false),
                        node_selector: self.component.node_selector.clone(),
                        init_containers: (!self.init_containers.is_empty())
                            .then_some(self.init_containers),
                        containers: self.containers,
                        volumes: (!self.volumes.is_empty()).then_some(self.volumes),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
