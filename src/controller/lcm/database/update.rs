use super::{PostgreSqlController, DATABASE_UPDATING};
use crate::controller::lcm::CrStatus;
use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use crate::crd::Postgresql;
use tracing::{debug, info};

impl PostgreSqlController {
    /// Replace the spec of the live resource when it drifted from the expected one
    ///
    /// Only the modelled spec fields are compared. The replace carries the
    /// live resource version, so a concurrent writer makes it fail and the
    /// pass is retried. The state stays `Unknown` until readiness runs again.
    pub(super) async fn update_spec(
        &self,
        resources: &ResourceManager,
    ) -> Result<CrStatus, ReconcilerError> {
        let name = self.resource_name();
        let Some(mut actual) = resources.get::<Postgresql>(&name).await? else {
            return Ok(self
                .status()
                .with_reason("DatabaseNotFound")
                .with_message(format!("postgresql {name} does not exist")));
        };

        let expected = self.expected(resources.operator_name());
        if actual.spec == expected.spec {
            debug!(postgresql = %name, "database spec up to date");
            return Ok(self.status().with_reason("DatabaseUpToDate"));
        }

        actual.spec = expected.spec;
        resources.replace(&actual).await?;
        info!(postgresql = %name, namespace = %resources.namespace(), "updated database spec");
        Ok(self
            .status()
            .with_reason(DATABASE_UPDATING)
            .with_message(format!("postgresql {name} spec updated")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::controller::lcm::{Lifecycle, LifecycleState};
    use crate::controller::resources::{from_dynamic, InMemoryApi};
    use crate::crd::InClusterDatabaseSpec;
    use kube::core::ApiResource;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unchanged_spec_is_not_written() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);
        let controller = PostgreSqlController::new(&cluster, InClusterDatabaseSpec::default(), true);
        seed_postgresql(&api, &controller, "Running");

        let status = controller.update(&resources).await.expect("update");
        assert_eq!(status.state, LifecycleState::Unknown);
        assert_eq!(status.condition.reason.as_deref(), Some("DatabaseUpToDate"));
        assert_eq!(api.writes(), 0);
    }

    #[tokio::test]
    async fn test_drift_is_replaced_on_live_version() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);
        let ar = ApiResource::erase::<Postgresql>(&());

        let initial = PostgreSqlController::new(&cluster, InClusterDatabaseSpec::default(), true);
        seed_postgresql(&api, &initial, "Running");
        let before = api.object(&ar, NAMESPACE, "harbor-sample").expect("seeded");

        let scaled = PostgreSqlController::new(
            &cluster,
            InClusterDatabaseSpec {
                instances: 3,
                ..InClusterDatabaseSpec::default()
            },
            true,
        );
        let status = scaled.update(&resources).await.expect("update");
        assert_eq!(status.state, LifecycleState::Unknown);
        assert_eq!(status.condition.reason.as_deref(), Some("DatabaseUpdating"));
        assert_eq!(api.writes(), 1);

        let after = api.object(&ar, NAMESPACE, "harbor-sample").expect("stored");
        assert_eq!(after.metadata.uid, before.metadata.uid);
        assert_ne!(after.metadata.resource_version, before.metadata.resource_version);
        let after: Postgresql = from_dynamic(after).expect("decode");
        assert_eq!(after.spec.number_of_instances, 3);
        assert!(after.is_running());
    }
}
