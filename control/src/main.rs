use anyhow::{Context as _, Result};
use ingress_control::apis::cluster::KubeCluster;
use ingress_control::metrics_server::serve_metrics;
use ingress_control::proxy::reload::ShellReloader;
use ingress_control::{Context, Controller, ControllerConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// nginx Ingress controller
///
/// Observer and driver loop run until Ctrl-C or until the optional
/// reload-failure budget is exhausted.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ControllerConfig::from_env().context("Invalid configuration")?;
    info!(
        config = %serde_json::to_string(&config).unwrap_or_default(),
        "Starting nginx ingress controller"
    );

    let client = build_client(&config).await?;
    let reloader = ShellReloader::new(config.reload_command.clone());

    let metrics_handle = match &config.metrics_addr {
        Some(addr) => {
            let (_, handle) = serve_metrics(addr)
                .await
                .with_context(|| format!("Failed to start metrics listener on {}", addr))?;
            Some(handle)
        }
        None => None,
    };

    let ctx = Context::new(Arc::new(KubeCluster::new(client)), config);

    let watcher = ctx.service_watcher();
    let observer_handle = tokio::spawn(watcher.run());

    let controller = Controller::new(ctx, reloader);

    let result = tokio::select! {
        result = controller.run() => {
            if let Err(e) = &result {
                error!("Controller stopped: {}", e);
            }
            result.map_err(anyhow::Error::from)
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    observer_handle.abort();
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    result
}

/// Client for `api_url` if configured, else in-cluster/kubeconfig inference
async fn build_client(config: &ControllerConfig) -> Result<kube::Client> {
    match &config.api_url {
        Some(url) => {
            let uri = url
                .parse::<hyper::Uri>()
                .with_context(|| format!("Invalid Kubernetes API URL {}", url))?;
            let client = kube::Client::try_from(kube::Config::new(uri))
                .context("Failed to create Kubernetes client")?;
            info!("Using Kubernetes API at {}", url);
            Ok(client)
        }
        None => kube::Client::try_default()
            .await
            .context("Failed to create Kubernetes client"),
    }
}
