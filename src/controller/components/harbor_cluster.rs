//! `HarborCluster`: in-cluster dependencies of a Harbor deployment.
//!
//! Each pass requests the database, corrects spec drift and checks
//! readiness. The database is polled until it is ready since nothing watched
//! by the operator changes when its pods come up. A pass that rewrote the spec
//! reports `Unknown` and polls, leaving readiness to the next pass. An `Error`
//! state is parked until the resource or one of its children changes.

use crate::constants::DATABASE_PROPERTY;
use crate::controller::lcm::database::{PostgreSqlController, DATABASE_UPDATING};
use crate::controller::lcm::{Lifecycle, LifecycleState};
use crate::controller::reconciler::{ChildComposer, ComposeOutcome, ReconcilerError};
use crate::controller::resources::ResourceManager;
use crate::crd::{ChildKind, HarborCluster};
use crate::observability::metrics;
use async_trait::async_trait;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HarborClusterComposer {
    in_cluster: bool,
    poll_interval: Duration,
}

impl HarborClusterComposer {
    pub fn new(in_cluster: bool, poll_interval: Duration) -> Self {
        Self {
            in_cluster,
            poll_interval,
        }
    }
}

#[async_trait]
impl ChildComposer<HarborCluster> for HarborClusterComposer {
    fn owned_kinds(&self) -> &'static [ChildKind] {
        &[ChildKind::Postgresql, ChildKind::Secret]
    }

    async fn compose(
        &self,
        cluster: &HarborCluster,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError> {
        let Some(database) = &cluster.spec.database else {
            debug!(cluster = %cluster.name_any(), "no in-cluster database requested");
            return Ok(ComposeOutcome::default());
        };

        let postgresql = PostgreSqlController::new(cluster, database.clone(), self.in_cluster);
        let mut status = postgresql.apply(resources).await?;
        // A cluster requested in this pass has nothing to correct yet
        if status.state != LifecycleState::Creating {
            status = status.transition(postgresql.update(resources).await?)?;
        }
        if !status.has_reason(DATABASE_UPDATING) {
            status = status.transition(postgresql.readiness(resources).await?)?;
        }

        metrics::set_dependent_ready(
            "postgresql",
            resources.namespace(),
            &postgresql.resource_name(),
            status.is_ready(),
        );

        let state = status.state;
        let mut outcome = ComposeOutcome::default().with_condition(status.condition);
        if let Some(database) = status.properties.get(DATABASE_PROPERTY) {
            outcome = outcome.with_property(DATABASE_PROPERTY, database.clone());
        }
        match state {
            LifecycleState::Ready => {}
            LifecycleState::Error => {
                warn!(
                    postgresql = %postgresql.resource_name(),
                    "database in error state, waiting for a change"
                );
            }
            _ => outcome = outcome.requeue_after(self.poll_interval),
        }
        Ok(outcome)
    }
}
