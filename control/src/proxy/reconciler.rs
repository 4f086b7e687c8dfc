//! nginx config reconciler
//!
//! Holds the `desired` and `applied` snapshots and moves between them:
//!
//! 1. Compare: equal snapshots end the cycle with no I/O
//! 2. Render: write `desired` to the config path
//! 3. Reload: run the reload command
//! 4. Commit: copy `desired` into `applied`
//!
//! A failure at 2 or 3 leaves `applied` untouched, so the next cycle sees the
//! same drift and tries again. It also marks the file on disk as dirty: until a
//! reload succeeds, a cycle whose `desired` equals `applied` still re-renders,
//! so the file never keeps a configuration nginx rejected.

use crate::apis::metrics::{record_reconcile, set_reload_failures};
use crate::error::ControllerError;
use crate::proxy::backend::Backend;
use crate::proxy::reload::Reloader;
use crate::proxy::template::render;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a cycle that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Desired matches applied; nothing was written or reloaded
    Unchanged,
    /// Config rendered, proxy reloaded, snapshot committed
    Reloaded,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Reloaded => "reloaded",
        }
    }
}

/// Applies desired configuration to nginx
pub struct ConfigReconciler<R: Reloader> {
    config_path: PathBuf,
    listen_port: u16,
    reloader: R,
    desired: Backend,
    applied: Backend,
    consecutive_failures: u32,
    dirty: bool,
}

impl<R: Reloader> ConfigReconciler<R> {
    /// Start from an empty `applied` snapshot
    pub fn new(config_path: impl Into<PathBuf>, listen_port: u16, reloader: R) -> Self {
        Self {
            config_path: config_path.into(),
            listen_port,
            reloader,
            desired: Backend::default(),
            applied: Backend::default(),
            consecutive_failures: 0,
            dirty: false,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Configuration the proxy is known to be running
    pub fn applied(&self) -> &Backend {
        &self.applied
    }

    /// Configuration most recently requested
    pub fn desired(&self) -> &Backend {
        &self.desired
    }

    /// Failed render/reload attempts since the last successful reload
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one cycle against `desired`
    pub async fn reconcile(&mut self, desired: Backend) -> Result<ReconcileOutcome, ControllerError> {
        let start = Instant::now();
        self.desired = desired;

        if !self.dirty && !self.desired.differs_from(&self.applied) {
            debug!("Configuration has not changed, not reloading nginx");
            record_reconcile(
                ReconcileOutcome::Unchanged.as_str(),
                start.elapsed().as_secs_f64(),
            );
            return Ok(ReconcileOutcome::Unchanged);
        }

        match self.apply().await {
            Ok(output) => {
                // Commit strictly after the reload succeeded
                self.applied = self.desired.clone();
                self.consecutive_failures = 0;
                self.dirty = false;
                set_reload_failures(0);
                record_reconcile(
                    ReconcileOutcome::Reloaded.as_str(),
                    start.elapsed().as_secs_f64(),
                );

                info!(
                    servers = self.applied.servers().len(),
                    upstreams = self.applied.upstreams().len(),
                    output = %output,
                    "Successfully reloaded nginx with updated ingresses"
                );
                Ok(ReconcileOutcome::Reloaded)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.dirty = true;
                set_reload_failures(self.consecutive_failures);
                record_reconcile(e.kind(), start.elapsed().as_secs_f64());

                warn!(
                    error = %e,
                    failures = self.consecutive_failures,
                    "Failed to apply nginx configuration, will retry"
                );
                Err(e)
            }
        }
    }

    /// Render then reload; returns the reload output
    async fn apply(&self) -> Result<String, ControllerError> {
        let rendered = render(&self.desired, self.listen_port);

        tokio::fs::write(&self.config_path, rendered)
            .await
            .map_err(|source| ControllerError::Render {
                path: self.config_path.clone(),
                source,
            })?;
        debug!(path = %self.config_path.display(), "Rendered nginx configuration");

        self.reloader.reload().await
    }
}
