//! # Component Resources
//!
//! One custom resource per Harbor component. The `Harbor` resource creates
//! them, but each can also be managed on its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const COMPONENT_GROUP: &str = "containerregistry.ovhcloud.com";

/// Workload settings shared by every component
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Container image, defaults to the upstream image of the component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

impl ComponentSpec {
    /// Configured image or the given default
    pub fn image_or(&self, default: &str) -> String {
        self.image.clone().unwrap_or_else(|| default.to_string())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_count() -> i32 {
    10
}

/// Harbor core: API, authentication and the web backend
///
/// # Example
///
/// ```yaml
/// apiVersion: containerregistry.ovhcloud.com/v1alpha2
/// kind: Core
/// metadata:
///   name: my-harbor-core
/// spec:
///   publicURL: https://registry.example.com
///   databaseSecret: my-harbor-database
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Core",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CoreSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(rename = "publicURL")]
    pub public_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Secret holding the database connection settings
    pub database_secret: String,
    /// Secret holding `secret` and `secretKey`, generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    /// Secret holding the registry cache URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_cache_secret: Option<String>,
}

/// Docker distribution registry
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Registry",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Secret holding the storage driver settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_secret: Option<String>,
    /// Secret holding the redis cache URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_secret: Option<String>,
}

/// Registry controller, sidecar API of the registry
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "RegistryController",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistryControllerSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    /// Name of the `Registry` this controller serves
    pub registry_name: String,
}

/// Job service, runs replication and garbage collection jobs
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "JobService",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JobServiceSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    /// In-cluster URL of the core service
    #[serde(rename = "coreURL")]
    pub core_url: String,
    /// Secret holding the core `secret` key shared with the job service
    pub secret_ref: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: i32,
    /// Secret holding the redis URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_secret: Option<String>,
}

/// Notary server, content trust signing API
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "NotaryServer",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NotaryServerSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    /// Public URL, an Ingress is created when set
    #[serde(default, rename = "publicURL", skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Secret holding the database connection settings
    pub database_secret: String,
    /// cert-manager issuer of the TLS certificate
    pub issuer_name: String,
}

/// Web portal
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Portal",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PortalSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
}

/// Helm chart repository
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ChartMuseum",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChartMuseumSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(rename = "publicURL")]
    pub public_url: String,
}
