use super::PostgreSqlController;
use crate::controller::lcm::{CrStatus, LifecycleState};
use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use crate::crd::Postgresql;
use tracing::info;

impl PostgreSqlController {
    pub(super) async fn delete_cluster(
        &self,
        resources: &ResourceManager,
    ) -> Result<CrStatus, ReconcilerError> {
        let name = self.resource_name();
        if resources.delete::<Postgresql>(&name).await? {
            info!(postgresql = %name, namespace = %resources.namespace(), "deleting database cluster");
            return Ok(self
                .status()
                .with_state(LifecycleState::Deleting)
                .with_reason("DatabaseDeleting")
                .with_message(format!("postgresql {name} deleted")));
        }
        Ok(self
            .status()
            .with_state(LifecycleState::Gone)
            .with_reason("DatabaseGone")
            .with_message(format!("postgresql {name} does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::controller::lcm::Lifecycle;
    use crate::controller::resources::InMemoryApi;
    use crate::crd::InClusterDatabaseSpec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_delete_is_safe_to_repeat() {
        let api = Arc::new(InMemoryApi::new());
        let cluster = cluster(&api);
        let resources = manager(&api, &cluster);
        let controller = PostgreSqlController::new(&cluster, InClusterDatabaseSpec::default(), true);
        seed_postgresql(&api, &controller, "Running");

        let first = controller.delete(&resources).await.expect("delete");
        assert_eq!(first.state, LifecycleState::Deleting);

        let second = controller.delete(&resources).await.expect("delete");
        assert_eq!(second.state, LifecycleState::Gone);
        assert!(first.state.can_transition_to(second.state));
    }
}
