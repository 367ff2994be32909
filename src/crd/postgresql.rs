//! # PostgreSQL (Zalando postgres-operator)
//!
//! Typed client view of the `acid.zalan.do/v1` `postgresql` resource. Only
//! the fields the operator sets or reads are modelled; anything else the
//! database operator adds is dropped on decode and so never takes part in
//! spec comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status value reported once the database cluster serves traffic
pub const RUNNING_STATUS: &str = "Running";

#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "postgresql",
    root = "Postgresql",
    plural = "postgresqls",
    group = "acid.zalan.do",
    version = "v1",
    namespaced,
    status = "PostgresqlStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlSpec {
    pub team_id: String,
    pub number_of_instances: i32,
    pub volume: PostgresqlVolume,
    pub postgresql: PostgresqlVersion,
    /// Role name to role flags
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
    /// Database name to owner role
    #[serde(default)]
    pub databases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresqlVolume {
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PostgresqlVersion {
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PostgresqlStatus {
    /// Free-form cluster state: Creating, Running, UpdateFailed, ...
    #[serde(rename = "PostgresClusterStatus", default)]
    pub postgres_cluster_status: String,
}

impl Postgresql {
    pub fn is_running(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.postgres_cluster_status == RUNNING_STATUS)
    }
}
