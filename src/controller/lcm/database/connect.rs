//! How to reach the database once it runs.

use super::{CORE_DATABASE, PORT, SSL_MODE, USER};
use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Connection to the database, rebuilt on every readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub database: String,
    /// Secret holding the password under the `password` key
    pub password_ref: String,
}

/// Value of the `database` status property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperties {
    pub username: String,
    pub password_ref: String,
    pub hosts: Vec<DatabaseHost>,
    pub ssl_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseHost {
    pub host: String,
    pub port: u16,
}

impl Connect {
    pub(super) fn harbor(host: String, password_ref: String) -> Self {
        Self {
            host,
            port: PORT,
            username: USER.to_string(),
            database: CORE_DATABASE.to_string(),
            password_ref,
        }
    }

    pub fn properties(&self) -> DatabaseProperties {
        DatabaseProperties {
            username: self.username.clone(),
            password_ref: self.password_ref.clone(),
            hosts: vec![DatabaseHost {
                host: self.host.clone(),
                port: self.port,
            }],
            ssl_mode: SSL_MODE.to_string(),
        }
    }
}

impl fmt::Display for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgres://{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

/// Labels the database operator puts on the leader pod of a cluster
pub(super) fn master_selector(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("application".to_string(), "spilo".to_string()),
        ("cluster-name".to_string(), cluster.to_string()),
        ("spilo-role".to_string(), "master".to_string()),
    ])
}

/// IP of the leader pod of `cluster`
///
/// Pods being deleted are ignored. `None` while no leader is elected or the
/// leader has no IP yet; more than one leader is a consistency violation.
pub(super) async fn master_pod_ip(
    resources: &ResourceManager,
    cluster: &str,
) -> Result<Option<String>, ReconcilerError> {
    let pods: Vec<Pod> = resources.list(&master_selector(cluster)).await?;
    let masters: Vec<&Pod> = pods
        .iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .collect();

    match masters.as_slice() {
        [] => Ok(None),
        [master] => Ok(master.status.as_ref().and_then(|s| s.pod_ip.clone())),
        _ => Err(ReconcilerError::Consistency(format!(
            "postgresql {cluster} has {} master pods: {}",
            masters.len(),
            masters
                .iter()
                .map(|pod| pod.name_any())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::lcm::database::fixtures::*;
    use crate::controller::resources::InMemoryApi;
    use std::sync::Arc;

    #[test]
    fn test_properties_shape() {
        let connect = Connect::harbor("10.0.0.3".to_string(), "sample-database-password".to_string());
        let value = serde_json::to_value(connect.properties()).expect("serializable");
        assert_eq!(
            value,
            serde_json::json!({
                "username": "harbor",
                "passwordRef": "sample-database-password",
                "hosts": [{"host": "10.0.0.3", "port": 5432}],
                "sslMode": "disable",
            })
        );
        assert_eq!(connect.to_string(), "postgres://harbor@10.0.0.3:5432/core");
    }

    #[tokio::test]
    async fn test_no_master_is_not_an_error() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);

        let ip = master_pod_ip(&resources, "harbor-sample").await.expect("lookup");
        assert_eq!(ip, None);
    }

    #[tokio::test]
    async fn test_single_master_ignores_terminating_pods() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);
        seed_master(&api, "harbor-sample-0", "10.0.0.1", true);
        seed_master(&api, "harbor-sample-1", "10.0.0.2", false);

        let ip = master_pod_ip(&resources, "harbor-sample").await.expect("lookup");
        assert_eq!(ip.as_deref(), Some("10.0.0.2"));
    }

    #[tokio::test]
    async fn test_two_masters_is_a_consistency_violation() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);
        seed_master(&api, "harbor-sample-0", "10.0.0.1", false);
        seed_master(&api, "harbor-sample-1", "10.0.0.2", false);

        let err = master_pod_ip(&resources, "harbor-sample")
            .await
            .expect_err("two leaders");
        assert!(matches!(err, ReconcilerError::Consistency(_)));
    }
}
