//! # Harbor
//!
//! Top level resource describing a whole registry platform. Reconciling it
//! creates one component resource per enabled component.

use crate::crd::ComponentSpec;
use serde::{Deserialize, Serialize};

/// Harbor Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: containerregistry.ovhcloud.com/v1alpha2
/// kind: Harbor
/// metadata:
///   name: my-harbor
///   labels:
///     containerregistry.ovhcloud.com/class: ""
/// spec:
///   publicURL: https://registry.example.com
///   databaseSecret: my-harbor-database
///   components:
///     notaryServer:
///       issuerName: letsencrypt
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Harbor",
    group = "containerregistry.ovhcloud.com",
    version = "v1alpha2",
    namespaced,
    status = "crate::crd::ComponentStatus",
    printcolumn = r#"{"name":"Public URL", "type":"string", "jsonPath":".spec.publicURL"}, {"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HarborSpec {
    #[serde(rename = "publicURL")]
    pub public_url: String,
    /// Secret holding the database connection settings, shared by core and notary
    pub database_secret: String,
    /// Secret holding the TLS certificate of the public URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
    /// Secret holding the redis URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_secret: Option<String>,
    #[serde(default)]
    pub components: HarborComponents,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HarborComponents {
    #[serde(default)]
    pub core: ComponentSpec,
    #[serde(default)]
    pub registry: ComponentSpec,
    #[serde(default)]
    pub registry_controller: ComponentSpec,
    #[serde(default)]
    pub job_service: ComponentSpec,
    #[serde(default)]
    pub portal: ComponentSpec,
    /// Deployed only when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notary_server: Option<HarborNotaryComponent>,
    /// Deployed only when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_museum: Option<ComponentSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HarborNotaryComponent {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default, rename = "publicURL", skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    pub issuer_name: String,
}

impl Harbor {
    /// Name of a child resource of this Harbor, `<harbor>-<suffix>`
    pub fn child_name(&self, suffix: &str) -> String {
        format!(
            "{}-{suffix}",
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}
