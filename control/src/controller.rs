//! Main driver loop
//!
//! Each admitted cycle lists Ingresses, translates them against the latest
//! observer snapshot and hands the result to the reconciler. Every failure is
//! logged and retried on the next cycle; the only exit is the optional
//! reload-failure policy.

use crate::apis::cluster::ClusterApi;
use crate::apis::ingress::{matches_class, translate};
use crate::apis::services::{ServiceWatcher, UpstreamSnapshot};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::proxy::rate_limiter::TokenBucket;
use crate::proxy::reconciler::{ConfigReconciler, ReconcileOutcome};
use crate::proxy::reload::Reloader;
use k8s_openapi::api::networking::v1::Ingress;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collaborators shared by the observer and the driver loop
#[derive(Clone)]
pub struct Context {
    pub cluster: Arc<dyn ClusterApi>,
    pub snapshot: UpstreamSnapshot,
    pub config: Arc<ControllerConfig>,
}

impl Context {
    pub fn new(cluster: Arc<dyn ClusterApi>, config: ControllerConfig) -> Self {
        Self {
            cluster,
            snapshot: UpstreamSnapshot::new(),
            config: Arc::new(config),
        }
    }

    /// Observer publishing into this context's snapshot
    pub fn service_watcher(&self) -> ServiceWatcher {
        ServiceWatcher::new(
            self.cluster.clone(),
            self.snapshot.clone(),
            self.rate_limiter("observer"),
        )
    }

    fn rate_limiter(&self, name: &str) -> TokenBucket {
        TokenBucket::named(name, self.config.rate_limit.qps, self.config.rate_limit.burst)
    }
}

/// What one driver cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No Ingresses to translate
    Idle,
    /// Listing Ingresses failed
    DiscoveryFailed,
    /// Reconciler finished without error
    Reconciled(ReconcileOutcome),
    /// Render or reload failed; applied configuration kept
    ApplyFailed,
}

/// Translator + reconciler loop
pub struct Controller<R: Reloader> {
    ctx: Context,
    reconciler: ConfigReconciler<R>,
    limiter: TokenBucket,
}

impl<R: Reloader> Controller<R> {
    pub fn new(ctx: Context, reloader: R) -> Self {
        let reconciler = ConfigReconciler::new(
            ctx.config.config_path.clone(),
            ctx.config.listen_port,
            reloader,
        );
        let limiter = ctx.rate_limiter("controller");

        Self {
            ctx,
            reconciler,
            limiter,
        }
    }

    pub fn reconciler(&self) -> &ConfigReconciler<R> {
        &self.reconciler
    }

    /// Run until the reload-failure policy trips
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!(
            config = %self.reconciler.config_path().display(),
            port = self.ctx.config.listen_port,
            "Starting ingress controller loop"
        );

        loop {
            self.limiter.accept().await;
            self.tick().await?;
        }
    }

    /// One cycle; errors only when the process should stop
    pub async fn tick(&mut self) -> Result<CycleOutcome, ControllerError> {
        let ingresses = match self.ctx.cluster.list_ingresses().await {
            Ok(ingresses) => ingresses,
            Err(e) => {
                warn!(error = %e, "Error retrieving ingresses");
                return Ok(CycleOutcome::DiscoveryFailed);
            }
        };

        let class = self.ctx.config.ingress_class.as_deref();
        let ingresses: Vec<Ingress> = ingresses
            .into_iter()
            .filter(|ingress| matches_class(ingress, class))
            .collect();

        if ingresses.is_empty() {
            info!("No ingresses were found");
            return Ok(CycleOutcome::Idle);
        }

        let upstreams = self.ctx.snapshot.load();
        let desired = translate(&ingresses, &upstreams);
        debug!(
            ingresses = ingresses.len(),
            servers = desired.servers().len(),
            upstreams = desired.upstreams().len(),
            "Translated ingresses"
        );

        match self.reconciler.reconcile(desired).await {
            Ok(outcome) => Ok(CycleOutcome::Reconciled(outcome)),
            Err(_) => {
                let failures = self.reconciler.consecutive_failures();
                match self.ctx.config.max_reload_failures {
                    Some(max) if failures >= max => {
                        error!(failures, "Reload failure budget exhausted");
                        Err(ControllerError::ReloadPolicy { failures })
                    }
                    _ => Ok(CycleOutcome::ApplyFailed),
                }
            }
        }
    }
}
