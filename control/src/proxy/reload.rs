//! nginx reload
//!
//! The reload is whatever shell command makes the running proxy adopt the
//! freshly rendered file (`nginx -s reload` by default).

use crate::error::ControllerError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Makes the proxy process adopt the rendered configuration
#[async_trait]
pub trait Reloader: Send + Sync {
    /// Returns the command's combined output on success
    async fn reload(&self) -> Result<String, ControllerError>;
}

/// Runs a reload command through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellReloader {
    command: String,
}

impl ShellReloader {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Reloader for ShellReloader {
    async fn reload(&self) -> Result<String, ControllerError> {
        debug!(command = %self.command, "Running reload command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|source| ControllerError::ReloadSpawn {
                command: self.command.clone(),
                source,
            })?;

        let combined = combine_output(&output.stdout, &output.stderr);

        if !output.status.success() {
            return Err(ControllerError::ReloadFailed {
                command: self.command.clone(),
                status: output.status,
                output: combined,
            });
        }

        Ok(combined)
    }
}

/// stdout then stderr, trimmed, newline-separated when both are present
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
