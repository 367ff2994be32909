//! # In-cluster PostgreSQL
//!
//! Lifecycle of the Zalando `postgresql` cluster backing a `HarborCluster`.
//! The database operator runs the cluster and generates the role password;
//! this controller requests the cluster, keeps its spec in line, and exports
//! how to reach it once it runs.
//!
//! ## Module Structure
//!
//! - `connect.rs` - Connection value object and leader pod lookup
//! - `readiness.rs` - Running check, credential copy and exported properties
//! - `update.rs` - Spec drift correction
//! - `delete.rs` - Deletion

mod connect;
mod delete;
mod readiness;
mod update;

pub use connect::{Connect, DatabaseHost, DatabaseProperties};

use super::{CrStatus, Lifecycle, LifecycleState};
use crate::constants::DATABASE_READY_CONDITION;
use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use crate::crd::{
    HarborCluster, InClusterDatabaseSpec, Postgresql, PostgresqlSpec, PostgresqlVersion,
    PostgresqlVolume,
};
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::info;

/// Zalando team owning the cluster, also the prefix its name must carry
const TEAM_ID: &str = "harbor";
/// Role created for Harbor
const USER: &str = "harbor";
const USER_FLAGS: [&str; 2] = ["superuser", "createdb"];
/// Databases created for Harbor, all owned by [`USER`]
const DATABASES: [&str; 4] = ["core", "clair", "notaryserver", "notarysigner"];
const CORE_DATABASE: &str = "core";
const PORT: u16 = 5432;
const SSL_MODE: &str = "disable";
/// Key of the password in both the database operator's and our credential Secret
const PASSWORD_KEY: &str = "password";
/// Reason reported by an update that rewrote the spec
pub const DATABASE_UPDATING: &str = "DatabaseUpdating";

pub struct PostgreSqlController {
    cluster: String,
    spec: InClusterDatabaseSpec,
    in_cluster: bool,
}

impl PostgreSqlController {
    /// Controller for the database of `cluster`
    ///
    /// `in_cluster` selects service DNS for the exported host; outside the
    /// cluster network the leader pod IP is exported instead.
    pub fn new(cluster: &HarborCluster, spec: InClusterDatabaseSpec, in_cluster: bool) -> Self {
        Self {
            cluster: cluster.name_any(),
            spec,
            in_cluster,
        }
    }

    /// Name of the `postgresql` resource
    pub fn resource_name(&self) -> String {
        format!("{TEAM_ID}-{}", self.cluster)
    }

    /// Secret the database operator fills with the role password
    pub fn credentials_secret(&self) -> String {
        format!("{USER}.{}.credentials", self.resource_name())
    }

    /// Secret holding our copy of the password, referenced by the exported properties
    pub fn password_secret(&self) -> String {
        format!("{}-database-password", self.cluster)
    }

    /// Resource this controller expects in the cluster
    pub fn expected(&self, operator_name: &str) -> Postgresql {
        let mut postgresql = Postgresql::new(
            &self.resource_name(),
            PostgresqlSpec {
                team_id: TEAM_ID.to_string(),
                number_of_instances: self.spec.instances,
                volume: PostgresqlVolume {
                    size: self.spec.storage.clone(),
                    storage_class: self.spec.storage_class_name.clone(),
                },
                postgresql: PostgresqlVersion {
                    version: self.spec.version.clone(),
                },
                users: BTreeMap::from([(
                    USER.to_string(),
                    USER_FLAGS.iter().map(|f| f.to_string()).collect(),
                )]),
                databases: DATABASES
                    .iter()
                    .map(|db| (db.to_string(), USER.to_string()))
                    .collect(),
            },
        );
        postgresql.metadata.labels = Some(BTreeMap::from([
            ("app".to_string(), "harbor-cluster".to_string()),
            ("operator".to_string(), operator_name.to_string()),
            ("harborcluster".to_string(), self.cluster.clone()),
        ]));
        postgresql
    }

    fn status(&self) -> CrStatus {
        CrStatus::new(DATABASE_READY_CONDITION)
    }
}

#[async_trait]
impl Lifecycle for PostgreSqlController {
    async fn apply(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError> {
        let name = self.resource_name();
        let (_, created) = resources
            .ensure(&self.expected(resources.operator_name()))
            .await?;

        if created {
            info!(postgresql = %name, namespace = %resources.namespace(), "requested database cluster");
            return Ok(self
                .status()
                .with_state(LifecycleState::Creating)
                .with_reason("DatabaseCreating")
                .with_message(format!("postgresql {name} requested")));
        }
        Ok(self.status().with_reason("DatabaseExists"))
    }

    async fn readiness(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError> {
        self.check_readiness(resources).await
    }

    async fn update(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError> {
        self.update_spec(resources).await
    }

    async fn delete(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError> {
        self.delete_cluster(resources).await
    }
}

#[cfg(test)]
pub(super) mod fixtures {
    use super::*;
    use crate::controller::resources::{from_dynamic, InMemoryApi};
    use crate::crd::{ChildKind, HarborClusterSpec, PostgresqlStatus};
    use k8s_openapi::api::core::v1::{Pod, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    pub const NAMESPACE: &str = "registry";

    pub fn cluster(api: &InMemoryApi) -> HarborCluster {
        let mut cluster = HarborCluster::new(
            "sample",
            HarborClusterSpec {
                database: Some(InClusterDatabaseSpec::default()),
            },
        );
        cluster.metadata.namespace = Some(NAMESPACE.to_string());
        from_dynamic(api.seed(&cluster).expect("seed cluster")).expect("decode cluster")
    }

    pub fn manager(api: &Arc<InMemoryApi>, cluster: &HarborCluster) -> ResourceManager {
        ResourceManager::for_owner(
            api.clone(),
            cluster,
            "harbor-operator",
            &[ChildKind::Postgresql, ChildKind::Secret],
            CancellationToken::new(),
        )
        .expect("manager")
    }

    /// Seed the `postgresql` resource as the database operator reports it
    pub fn seed_postgresql(api: &InMemoryApi, controller: &PostgreSqlController, phase: &str) {
        let mut postgresql = controller.expected("harbor-operator");
        postgresql.metadata.namespace = Some(NAMESPACE.to_string());
        postgresql.status = Some(PostgresqlStatus {
            postgres_cluster_status: phase.to_string(),
        });
        api.seed(&postgresql).expect("seed postgresql");
    }

    pub fn seed_credentials(api: &InMemoryApi, controller: &PostgreSqlController, password: &str) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(controller.credentials_secret()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                ("username".to_string(), ByteString(USER.as_bytes().to_vec())),
                (PASSWORD_KEY.to_string(), ByteString(password.as_bytes().to_vec())),
            ])),
            ..Default::default()
        };
        api.seed(&secret).expect("seed credentials");
    }

    /// Seed a pod labelled as the leader of the `harbor-sample` database
    pub fn seed_master(api: &InMemoryApi, name: &str, ip: &str, terminating: bool) {
        let mut pod = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": NAMESPACE,
                "labels": super::connect::master_selector("harbor-sample"),
            },
            "status": { "podIP": ip },
        });
        if terminating {
            pod["metadata"]["deletionTimestamp"] = serde_json::json!("2026-01-01T00:00:00Z");
        }
        let pod: Pod = serde_json::from_value(pod).expect("pod");
        api.seed(&pod).expect("seed pod");
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::controller::resources::InMemoryApi;
    use kube::core::ApiResource;
    use std::sync::Arc;

    #[test]
    fn test_expected_resource() {
        let api = InMemoryApi::new();
        let cluster = cluster(&api);
        let controller = PostgreSqlController::new(&cluster, InClusterDatabaseSpec::default(), true);

        let expected = controller.expected("harbor-operator");
        assert_eq!(expected.name_any(), "harbor-sample");
        assert_eq!(expected.spec.team_id, "harbor");
        assert_eq!(expected.spec.number_of_instances, 1);
        assert_eq!(expected.spec.volume.size, "1Gi");
        assert_eq!(expected.spec.databases.len(), 4);
        assert!(expected.spec.databases.values().all(|owner| owner == "harbor"));
        assert_eq!(controller.credentials_secret(), "harbor.harbor-sample.credentials");
        assert_eq!(controller.password_secret(), "sample-database-password");
    }

    #[tokio::test]
    async fn test_apply_creates_once_with_owner() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);
        let controller = PostgreSqlController::new(&cluster, InClusterDatabaseSpec::default(), true);

        let status = controller.apply(&resources).await.expect("apply");
        assert_eq!(status.state, LifecycleState::Creating);

        let ar = ApiResource::erase::<Postgresql>(&());
        let stored = api
            .object(&ar, NAMESPACE, "harbor-sample")
            .expect("postgresql created");
        let owners = stored.metadata.owner_references.unwrap_or_default();
        assert_eq!(owners.len(), 1);
        assert_eq!(Some(owners[0].uid.clone()), cluster.metadata.uid);

        api.reset_writes();
        let status = controller.apply(&resources).await.expect("apply");
        assert_eq!(status.state, LifecycleState::Unknown);
        assert_eq!(api.writes(), 0);
    }
}
