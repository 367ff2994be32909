//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup,
//! configuration, templates and Kubernetes client.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::server::{start_server, ServerState};
use crate::controller::templates::TemplateCache;
use crate::crd::{Harbor, HarborCluster, ManagedResource};
use crate::observability;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub config: ControllerConfig,
    /// Read-only for the lifetime of the process
    pub templates: Arc<TemplateCache>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Cancelled once shutdown starts
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything builds a TLS client
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harbor_operator=info".into()),
        )
        .init();

    info!("Starting Harbor Operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let config = ControllerConfig::from_env();
    info!(
        operator = %config.operator_name,
        class = %config.class_name,
        in_cluster = config.in_cluster,
        "Loaded configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let templates = Arc::new(
        TemplateCache::load(config.templates_dir.as_deref())
            .context("Failed to load configuration templates")?,
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    log_existing_resources::<Harbor>(&client).await;
    log_existing_resources::<HarborCluster>(&client).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        config,
        templates,
        server_state,
        cancel: CancellationToken::new(),
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Startup summary; a missing CRD is logged, the controller retries on its own
async fn log_existing_resources<K: ManagedResource>(client: &Client) {
    let api: Api<K> = Api::all(client.clone());
    let kind = K::kind(&());
    match api.list(&ListParams::default()).await {
        Ok(list) => {
            info!("CRD {} is queryable, found {} existing resources", kind, list.items.len());
        }
        Err(e) => {
            error!("CRD {} is not queryable; {:?}. Is the CRD installed?", kind, e);
            warn!("Installation: crdgen | kubectl apply -f -");
        }
    }
}
