//! Chaos operator - reconciles ChaosEngine resources

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chaos_operator::config::OperatorConfig;
use chaos_operator::controller::{error_policy, reconcile, Context};
use chaos_operator::crd::{ChaosEngine, ChaosExperiment, ChaosResult};

/// Chaos operator - drives ChaosEngines from initialization to cleanup
#[derive(Parser, Debug)]
#[command(name = "chaos-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        for crd in [ChaosEngine::crd(), ChaosExperiment::crd(), ChaosResult::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    run_controller(cli.config).await
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let (engines, pods): (Api<ChaosEngine>, Api<Pod>) = match config.watch_namespace.as_deref() {
        Some(ns) if !ns.is_empty() => {
            tracing::info!(namespace = ns, "watching a single namespace");
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            )
        }
        _ => {
            tracing::info!("watching all namespaces");
            (Api::all(client.clone()), Api::all(client.clone()))
        }
    };

    let cancel = CancellationToken::new();
    let ctx = Arc::new(
        Context::builder(client)
            .config(config)
            .cancel_token(cancel.clone())
            .build(),
    );
    tracing::info!(
        runner_image = %ctx.runner_image,
        client_uuid = %ctx.client_uuid,
        "starting ChaosEngine controller"
    );

    // Cancel in-flight termination waits before the controller drains
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
        let _ = shutdown_tx.send(());
    });

    Controller::new(engines, WatcherConfig::default())
        .owns(pods, WatcherConfig::default())
        .graceful_shutdown_on(async move {
            let _ = shutdown_rx.await;
        })
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "ChaosEngine reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "ChaosEngine reconciliation error");
                }
            }
        })
        .await;

    cancel.cancel();
    tracing::info!("ChaosEngine controller stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on Unix (sent by the kubelet on pod deletion)
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
