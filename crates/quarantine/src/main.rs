//! node-quarantine - cordons the most underutilized long-standing node
//!
//! Periodically computes the request-based utilization of every selected
//! node, tracks nodes that stay below the threshold, and cordons the
//! emptiest one once it has been underutilized for long enough. Draining
//! and deleting the node is left to a separate scale-down process.

use anyhow::{Context, Result};
use clap::Parser;
use quarantine_lib::{
    api,
    cluster::KubeNodeClient,
    controller::EvaluationLoop,
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, StructuredLogger},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let config = config::ControllerConfig::load(&cli)?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json())
        .init();

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(
        CONTROLLER_VERSION,
        &config.node_labels,
        config.threshold,
        config.dry_run,
    );

    let client = kube_client(config.kubeconfig.as_deref()).await?;
    let node_client = Arc::new(KubeNodeClient::new(client, config.node_labels.clone()));

    let health_registry = HealthRegistry::new().with_stale_after(config.stale_after());
    health_registry.register(components::EVALUATOR).await;
    health_registry.register(components::CLUSTER_API).await;

    let metrics = ControllerMetrics::new();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let evaluation_loop = EvaluationLoop::new(
        node_client,
        config.settings(),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
    );
    let loop_handle = tokio::spawn(evaluation_loop.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(health_registry, metrics));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.health_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    let reason = shutdown_signal().await;
    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Evaluation loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "Health server failed"),
        Err(e) => error!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Build a Kubernetes client from an explicit kubeconfig, or infer one
/// (in-cluster service account, then the default kubeconfig)
async fn kube_client(kubeconfig: Option<&Path>) -> Result<kube::Client> {
    let client_config = match kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &kube::config::KubeConfigOptions::default(),
            )
            .await
            .context("Invalid kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    kube::Client::try_from(client_config).context("Failed to create Kubernetes client")
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
