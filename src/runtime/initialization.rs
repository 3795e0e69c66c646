//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::server::{start_server, ServerState};
use crate::kinds::{ConnectContext, KindContext, KindRegistry};
use crate::managed::{ConnectionPublisher, PublisherChain, SecretPublisher};
use crate::observability;
use crate::provider::secrets_manager::{SdkSecretsManager, SecretsManagerPublisher};
use crate::provider::SdkServiceFactory;
use crate::store::{KubeObjectStore, KubeSecretStore, ObjectStore, SecretStore};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Everything `main` needs to start the watch loops
pub struct InitializationResult {
    /// Shared dependencies of every watch loop
    pub kind_context: Arc<KindContext>,
    /// Kinds left after `ENABLED_KINDS` filtering
    pub registry: KindRegistry,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("registry", &self.registry)
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Object stores, connection publishers and the AWS service factory
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    let config = Arc::new(ControllerConfig::from_env());
    observability::logging::init(&config);

    info!("Starting AWS Resource Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let objects: Arc<dyn ObjectStore> = Arc::new(KubeObjectStore::new(client.clone()));
    let secrets: Arc<dyn SecretStore> = Arc::new(KubeSecretStore::new(client.clone()));

    let publisher = connection_publisher(&config, Arc::clone(&secrets)).await;

    let connect = Arc::new(ConnectContext {
        services: Arc::new(SdkServiceFactory::new(
            Arc::clone(&objects),
            Arc::clone(&secrets),
        )),
        secrets,
        controller_namespace: config.controller_namespace.clone(),
    });

    let mut registry = KindRegistry::builtin();
    registry.retain_enabled(&config);
    if registry.is_empty() {
        warn!(
            "ENABLED_KINDS {:?} matches no known kind, no watch loop will run",
            config.enabled_kinds
        );
    } else {
        info!(
            "Serving {} kinds: {}",
            registry.len(),
            registry.kinds().collect::<Vec<_>>().join(", ")
        );
    }

    let kind_context = Arc::new(KindContext {
        client,
        objects,
        publisher,
        connect,
        config,
        server_state: Arc::clone(&server_state),
    });

    info!("Controller initialized, starting watch loops...");

    Ok(InitializationResult {
        kind_context,
        registry,
        server_state,
    })
}

/// Secret publisher, plus the Secrets Manager mirror when a region is configured
async fn connection_publisher(
    config: &ControllerConfig,
    secrets: Arc<dyn SecretStore>,
) -> Arc<dyn ConnectionPublisher> {
    let chain = PublisherChain::new(vec![Arc::new(SecretPublisher::new(secrets))]);
    match &config.secrets_manager_mirror_region {
        Some(region) => {
            info!(
                "Mirroring connection details to Secrets Manager in {} under prefix '{}'",
                region, config.secrets_manager_prefix
            );
            let api = Arc::new(SdkSecretsManager::new(region).await);
            Arc::new(chain.with(Arc::new(SecretsManagerPublisher::new(
                api,
                config.secrets_manager_prefix.clone(),
            ))))
        }
        None => Arc::new(chain),
    }
}

/// Wait for the HTTP server to bind
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

        if server_state.is_listening() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_server_ready_returns_once_listening() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(std::future::pending::<()>());
        state
            .is_listening
            .store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(wait_for_server_ready(&state, &handle).await.is_ok());
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_fails_when_server_exits() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(wait_for_server_ready(&state, &handle).await.is_err());
    }
}
