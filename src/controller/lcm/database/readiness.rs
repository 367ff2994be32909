use super::connect::{master_pod_ip, Connect};
use super::{PostgreSqlController, PASSWORD_KEY};
use crate::constants::DATABASE_PROPERTY;
use crate::controller::lcm::{CrStatus, LifecycleState, Properties};
use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use crate::crd::Postgresql;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl PostgreSqlController {
    fn not_ready(&self, reason: &str, message: String) -> CrStatus {
        self.status()
            .with_state(LifecycleState::NotReady)
            .with_reason(reason)
            .with_message(message)
    }

    pub(super) async fn check_readiness(
        &self,
        resources: &ResourceManager,
    ) -> Result<CrStatus, ReconcilerError> {
        let name = self.resource_name();

        let Some(postgresql) = resources.get::<Postgresql>(&name).await? else {
            return Ok(self.not_ready("NotReady", format!("postgresql {name} does not exist")));
        };
        if !postgresql.is_running() {
            let phase = postgresql
                .status
                .map(|s| s.postgres_cluster_status)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Pending".to_string());
            debug!(postgresql = %name, phase = %phase, "database not running yet");
            return Ok(self.not_ready("NotReady", format!("postgresql {name} is {phase}")));
        }

        let host = if self.in_cluster {
            format!("{name}.{}.svc", resources.namespace())
        } else {
            match master_pod_ip(resources, &name).await {
                Ok(Some(ip)) => ip,
                Ok(None) => {
                    return Ok(self.not_ready(
                        "LeaderNotElected",
                        format!("postgresql {name} has no reachable master pod"),
                    ))
                }
                // Nothing to export until the database operator settles on one leader
                Err(ReconcilerError::Consistency(message)) => {
                    warn!(postgresql = %name, "{}", message);
                    return Ok(self
                        .status()
                        .with_state(LifecycleState::Error)
                        .with_reason("ConsistencyViolation")
                        .with_message(message));
                }
                Err(e) => return Err(e),
            }
        };

        let password_ref = self.password_secret();
        if resources.get::<Secret>(&password_ref).await?.is_none() {
            let Some(password) = self.source_password(resources).await? else {
                return Ok(self.not_ready(
                    "CredentialsNotFound",
                    format!("secret {} does not exist yet", self.credentials_secret()),
                ));
            };
            let metadata = ObjectMeta {
                name: Some(password_ref.clone()),
                labels: self.expected(resources.operator_name()).metadata.labels,
                ..Default::default()
            };
            resources
                .ensure_secret(metadata, move || {
                    Ok(BTreeMap::from([(PASSWORD_KEY.to_string(), password)]))
                })
                .await?;
        }

        let connect = Connect::harbor(host, password_ref);
        let mut properties = Properties::default();
        properties
            .add(DATABASE_PROPERTY, &connect.properties())
            .map_err(|source| ReconcilerError::Serialization {
                kind: "postgresql".to_string(),
                source,
            })?;

        info!(postgresql = %name, connect = %connect, "database ready");
        Ok(self
            .status()
            .with_state(LifecycleState::Ready)
            .with_reason("DatabaseReady")
            .with_message(format!("database reachable at {connect}"))
            .with_properties(properties))
    }

    /// Role password generated by the database operator, `None` until it exists
    async fn source_password(
        &self,
        resources: &ResourceManager,
    ) -> Result<Option<String>, ReconcilerError> {
        let name = self.credentials_secret();
        let Some(secret) = resources.get::<Secret>(&name).await? else {
            return Ok(None);
        };

        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(PASSWORD_KEY))
            .ok_or_else(|| {
                ReconcilerError::Consistency(format!("secret {name} has no {PASSWORD_KEY} key"))
            })?;
        String::from_utf8(bytes.0.clone())
            .map(Some)
            .map_err(|_| ReconcilerError::Consistency(format!("secret {name} holds a non UTF-8 password")))
    }
}
