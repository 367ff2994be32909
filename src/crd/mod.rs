//! # Custom Resource Definitions
//!
//! CRD types managed or consumed by the operator.
//!
//! ## Module Structure
//!
//! - `harbor.rs` - Top level `Harbor` resource
//! - `components.rs` - One resource per Harbor component
//! - `harbor_cluster.rs` - `HarborCluster` and its in-cluster database request
//! - `status.rs` - Status and conditions shared by every managed resource
//! - `postgresql.rs` - Zalando `postgresql` resource (dependent, not owned by this operator's CRDs)
//! - `certificate.rs` - cert-manager `Certificate`

mod certificate;
mod components;
mod harbor;
mod harbor_cluster;
mod postgresql;
mod status;

pub use certificate::{Certificate, CertificateSpec, IssuerRef};
pub use components::{
    ChartMuseum, ChartMuseumSpec, ComponentSpec, Core, CoreSpec, JobService, JobServiceSpec,
    NotaryServer, NotaryServerSpec, Portal, PortalSpec, Registry, RegistryController,
    RegistryControllerSpec, RegistrySpec, COMPONENT_GROUP,
};
pub use harbor::{Harbor, HarborComponents, HarborNotaryComponent, HarborSpec};
pub use harbor_cluster::{HarborCluster, HarborClusterSpec, InClusterDatabaseSpec};
pub use postgresql::{
    Postgresql, PostgresqlSpec, PostgresqlStatus, PostgresqlVersion, PostgresqlVolume,
    RUNNING_STATUS,
};
pub use status::{
    ComponentStatus, Condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_UNKNOWN,
};

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Secret, Service},
    networking::v1::Ingress,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::core::{ApiResource, CustomResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A custom resource reconciled by this operator
pub trait ManagedResource:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Component name used for configuration prefixes, metrics and logs
    const COMPONENT: &'static str;

    fn status(&self) -> Option<&ComponentStatus>;
}

macro_rules! managed_resource {
    ($($kind:ty => $component:literal),+ $(,)?) => {
        $(
            impl ManagedResource for $kind {
                const COMPONENT: &'static str = $component;

                fn status(&self) -> Option<&ComponentStatus> {
                    self.status.as_ref()
                }
            }
        )+
    };
}

managed_resource! {
    Harbor => "harbor",
    Core => "core",
    Registry => "registry",
    RegistryController => "registryctl",
    JobService => "jobservice",
    NotaryServer => "notaryserver",
    Portal => "portal",
    ChartMuseum => "chartmuseum",
    HarborCluster => "harborcluster",
}

/// Kinds of child objects a reconciler may create and watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    ConfigMap,
    Secret,
    Service,
    Deployment,
    Ingress,
    Certificate,
    Postgresql,
    Core,
    Registry,
    RegistryController,
    JobService,
    NotaryServer,
    Portal,
    ChartMuseum,
}

impl ChildKind {
    pub fn api_resource(self) -> ApiResource {
        match self {
            Self::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            Self::Secret => ApiResource::erase::<Secret>(&()),
            Self::Service => ApiResource::erase::<Service>(&()),
            Self::Deployment => ApiResource::erase::<Deployment>(&()),
            Self::Ingress => ApiResource::erase::<Ingress>(&()),
            Self::Certificate => ApiResource::erase::<Certificate>(&()),
            Self::Postgresql => ApiResource::erase::<Postgresql>(&()),
            Self::Core => ApiResource::erase::<Core>(&()),
            Self::Registry => ApiResource::erase::<Registry>(&()),
            Self::RegistryController => ApiResource::erase::<RegistryController>(&()),
            Self::JobService => ApiResource::erase::<JobService>(&()),
            Self::NotaryServer => ApiResource::erase::<NotaryServer>(&()),
            Self::Portal => ApiResource::erase::<Portal>(&()),
            Self::ChartMuseum => ApiResource::erase::<ChartMuseum>(&()),
        }
    }

    /// Kind matching an `apiVersion`/`kind` pair
    pub fn from_type(api_version: &str, kind: &str) -> Option<Self> {
        ALL_CHILD_KINDS.iter().copied().find(|child| {
            let ar = child.api_resource();
            ar.api_version == api_version && ar.kind == kind
        })
    }
}

const ALL_CHILD_KINDS: [ChildKind; 14] = [
    ChildKind::ConfigMap,
    ChildKind::Secret,
    ChildKind::Service,
    ChildKind::Deployment,
    ChildKind::Ingress,
    ChildKind::Certificate,
    ChildKind::Postgresql,
    ChildKind::Core,
    ChildKind::Registry,
    ChildKind::RegistryController,
    ChildKind::JobService,
    ChildKind::NotaryServer,
    ChildKind::Portal,
    ChildKind::ChartMuseum,
];

/// Definitions of every CRD this operator owns, in installation order
pub fn owned_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Harbor::crd(),
        Core::crd(),
        Registry::crd(),
        RegistryController::crd(),
        JobService::crd(),
        NotaryServer::crd(),
        Portal::crd(),
        ChartMuseum::crd(),
        HarborCluster::crd(),
    ]
}
