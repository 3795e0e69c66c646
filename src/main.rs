//! # AWS Resource Controller
//!
//! A Kubernetes controller that reconciles cluster-scoped custom resources
//! describing AWS infrastructure with the resources that actually exist.
//!
//! ## Features
//!
//! - **RDS**: DBInstance, DBCluster and their parameter groups, with generated master passwords
//! - **Batch**: compute environments, job queues, job definitions and jobs
//! - **DynamoDB**: tables, on-demand backups and global tables
//! - **Lambda**: resource-based permissions
//! - **Connection details**: published to Kubernetes secrets, optionally mirrored to Secrets Manager
//! - **Prometheus metrics** and health probes on `METRICS_PORT`
//!
//! Which kinds are watched is controlled by `ENABLED_KINDS`.

use anyhow::Result;
use aws_resource_controller::runtime::initialization::initialize;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let shutdown_state = Arc::clone(&init.server_state);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping watch loops");
                shutdown_state.begin_shutdown();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let handles = init.registry.spawn_all(&init.kind_context);
    init.server_state.set_ready(true);
    info!("Controller ready with {} watch loops", handles.len());

    for (kind, handle) in handles {
        match handle.await {
            Ok(Ok(())) => info!("{} watch loop finished", kind),
            Ok(Err(e)) => error!("{} watch loop failed: {:#}", kind, e),
            Err(e) => error!("{} watch loop panicked: {}", kind, e),
        }
    }

    info!("Controller stopped");
    Ok(())
}
