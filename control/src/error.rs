use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors raised by the ingress controller
///
/// Everything except `Config` and `ReloadPolicy` is transient: the loop that
/// hit it logs the cause and retries on its next admitted cycle.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Kubernetes API error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("Failed to list pods for service {service}: {source}")]
    PodListing {
        service: String,
        #[source]
        source: Box<ControllerError>,
    },

    #[error("Failed to write nginx config {}: {source}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to execute reload command `{command}`: {source}")]
    ReloadSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Reload command `{command}` failed ({status}): {output}")]
    ReloadFailed {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Giving up after {failures} consecutive failed reloads")]
    ReloadPolicy { failures: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::Kubernetes(_) => "kubernetes",
            ControllerError::PodListing { source, .. } => source.kind(),
            ControllerError::Render { .. } => "render_failed",
            ControllerError::ReloadSpawn { .. } | ControllerError::ReloadFailed { .. } => {
                "reload_failed"
            }
            ControllerError::Config(_) => "config",
            ControllerError::ReloadPolicy { .. } => "reload_policy",
            ControllerError::Io(_) => "io",
        }
    }
}
