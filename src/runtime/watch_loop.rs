//! # Watch Loop
//!
//! One `kube_runtime` controller per managed resource kind. Each controller
//! watches its resources and the child kinds its composer owns, so a change
//! to either triggers a reconcile of the owner. All controllers share one
//! cancellation token and stop together on SIGINT/SIGTERM.

use crate::config::ControllerConfig;
use crate::controller::components::{
    ChartMuseumComposer, CoreComposer, HarborClusterComposer, HarborComposer, JobServiceComposer,
    NotaryServerComposer, PortalComposer, RegistryComposer, RegistryControllerComposer,
};
use crate::controller::reconciler::{reconcile, ChildComposer, Reconciler};
use crate::controller::server::ServerState;
use crate::controller::resources::{KubeApi, ObjectApi};
use crate::crd::{
    ChartMuseum, Core, Harbor, HarborCluster, JobService, ManagedResource, NotaryServer, Portal,
    Registry, RegistryController,
};
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::runtime::initialization::InitializationResult;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::api::Api;
use kube::core::DynamicObject;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run every controller until shutdown
pub async fn run_watch_loop(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        client,
        config,
        templates,
        server_state,
        cancel,
    } = init;

    tokio::spawn(shut_down_on(
        shutdown_signal(),
        server_state.clone(),
        cancel.clone(),
    ));

    let api: Arc<dyn ObjectApi> = Arc::new(KubeApi::new(client.clone()));
    let cluster_config = config.for_component(HarborCluster::COMPONENT);

    let controllers = vec![
        run_controller::<Harbor>(&client, &api, Arc::new(HarborComposer), &config, &cancel),
        run_controller::<Core>(
            &client,
            &api,
            Arc::new(CoreComposer::new(templates.clone())),
            &config,
            &cancel,
        ),
        run_controller::<Registry>(
            &client,
            &api,
            Arc::new(RegistryComposer::new(templates.clone())),
            &config,
            &cancel,
        ),
        run_controller::<RegistryController>(
            &client,
            &api,
            Arc::new(RegistryControllerComposer::new(templates.clone())),
            &config,
            &cancel,
        ),
        run_controller::<JobService>(
            &client,
            &api,
            Arc::new(JobServiceComposer::new(templates.clone())),
            &config,
            &cancel,
        ),
        run_controller::<NotaryServer>(
            &client,
            &api,
            Arc::new(NotaryServerComposer::new(templates)),
            &config,
            &cancel,
        ),
        run_controller::<Portal>(&client, &api, Arc::new(PortalComposer), &config, &cancel),
        run_controller::<ChartMuseum>(&client, &api, Arc::new(ChartMuseumComposer), &config, &cancel),
        run_controller::<HarborCluster>(
            &client,
            &api,
            Arc::new(HarborClusterComposer::new(
                cluster_config.in_cluster,
                cluster_config.database_poll_interval(),
            )),
            &config,
            &cancel,
        ),
    ];

    info!("Starting {} controllers...", controllers.len());
    futures::future::join_all(controllers).await;

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler, only SIGINT stops the operator: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, initiating graceful shutdown..."),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// Once `signal` resolves, mark the server not ready and stop in-flight
/// reconciles between children
async fn shut_down_on(
    signal: impl Future<Output = ()>,
    server_state: Arc<ServerState>,
    cancel: CancellationToken,
) {
    signal.await;
    server_state.set_ready(false);
    cancel.cancel();
}

/// Controller for one managed kind, resolving once it shut down
fn run_controller<K>(
    client: &Client,
    api: &Arc<dyn ObjectApi>,
    composer: Arc<dyn ChildComposer<K>>,
    config: &ControllerConfig,
    cancel: &CancellationToken,
) -> BoxFuture<'static, ()>
where
    K: ManagedResource,
{
    let config = config.for_component(K::COMPONENT);
    info!(
        component = K::COMPONENT,
        class = %config.class_name,
        concurrency = config.max_concurrent_reconciles,
        "Starting controller"
    );

    let resources: Api<K> = Api::all(client.clone());
    let mut controller = Controller::new(resources, watcher::Config::default().any_semantic())
        .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciles));
    for kind in composer.owned_kinds() {
        let ar = kind.api_resource();
        let children: Api<DynamicObject> = Api::all_with(client.clone(), &ar);
        controller = controller.owns_with(children, ar, watcher::Config::default());
    }

    let ctx = Arc::new(Reconciler::new(api.clone(), composer, config, cancel.clone()));
    controller
        .shutdown_on_signal()
        .run(reconcile::<K>, handle_reconciliation_error::<K>, ctx)
        .for_each(|result| {
            match result {
                Ok((obj, action)) => {
                    debug!(resource = %obj.name, action = ?action, "watch.event.reconciled");
                }
                Err(e) => {
                    warn!(component = K::COMPONENT, error = %e, "Controller stream error");
                }
            }
            futures::future::ready(())
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_marks_not_ready_and_cancels() {
        let server_state = Arc::new(ServerState::default());
        server_state.set_ready(true);
        let cancel = CancellationToken::new();

        shut_down_on(std::future::ready(()), server_state.clone(), cancel.clone()).await;

        assert!(!server_state.is_ready());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_nothing_happens_before_the_signal() {
        let server_state = Arc::new(ServerState::default());
        server_state.set_ready(true);
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(shut_down_on(
            async {
                let _ = rx.await;
            },
            server_state.clone(),
            cancel.clone(),
        ));
        tokio::task::yield_now().await;
        assert!(server_state.is_ready());
        assert!(!cancel.is_cancelled());

        let _ = tx.send(());
        task.await.expect("shutdown task");
        assert!(!server_state.is_ready());
        assert!(cancel.is_cancelled());
    }
}
