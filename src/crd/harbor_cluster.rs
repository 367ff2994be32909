//! # HarborCluster
//!
//! Cluster level resource carrying the in-cluster dependencies of a Harbor
//! deployment. Today only the PostgreSQL database is managed.

use serde::{Deserialize, Serialize};

/// HarborCluster Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: goharbor.io/v1alpha2
/// kind: HarborCluster
/// metadata:
///   name: my-harbor
/// spec:
///   database:
///     instances: 2
///     storage: 5Gi
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "HarborCluster",
    group = "goharbor.io",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Database", "type":"string", "jsonPath":".status.conditions[?(@.type==\"DatabaseReady\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HarborClusterSpec {
    /// In-cluster PostgreSQL database, unmanaged when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<InClusterDatabaseSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InClusterDatabaseSpec {
    #[serde(default = "default_instances")]
    pub instances: i32,
    /// Volume size, as a Kubernetes quantity
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// PostgreSQL major version
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for InClusterDatabaseSpec {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            storage: default_storage(),
            storage_class_name: None,
            version: default_version(),
        }
    }
}

fn default_instances() -> i32 {
    1
}

fn default_storage() -> String {
    "1Gi".to_string()
}

fn default_version() -> String {
    "12".to_string()
}
