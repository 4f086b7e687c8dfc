//! Configuration for the ingress controller
//!
//! Defaults can be overridden through `KUBE_NGINX_*` environment variables.

use crate::error::ControllerError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Kubernetes API URL (default: in-cluster or kubeconfig inference)
    #[serde(default)]
    pub api_url: Option<String>,

    /// Port every nginx server block listens on (default: 80)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Path of the rendered nginx configuration
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Shell command that makes nginx adopt the rendered file
    #[serde(default = "default_reload_command")]
    pub reload_command: String,

    /// Only translate Ingresses with this `ingressClassName` (default: all)
    #[serde(default)]
    pub ingress_class: Option<String>,

    /// Bind address for the `/metrics` listener (default: disabled)
    #[serde(default)]
    pub metrics_addr: Option<String>,

    /// Exit after this many consecutive failed reloads (default: never)
    #[serde(default)]
    pub max_reload_failures: Option<u32>,

    /// API polling admission for each loop
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Token bucket settings shared by the observer and the driver loop
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Admissions per second (default: 0.1, one cycle every 10s)
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Bucket capacity (default: 1)
    #[serde(default = "default_burst")]
    pub burst: u64,
}

fn default_listen_port() -> u16 {
    80
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/nginx.conf")
}

fn default_reload_command() -> String {
    "nginx -s reload".to_string()
}

fn default_qps() -> f64 {
    0.1
}

fn default_burst() -> u64 {
    1
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            listen_port: default_listen_port(),
            config_path: default_config_path(),
            reload_command: default_reload_command(),
            ingress_class: None,
            metrics_addr: None,
            max_reload_failures: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("KUBE_NGINX_API") {
            config.api_url = Some(val);
        }
        if let Some(val) = lookup("KUBE_NGINX_PORT") {
            config.listen_port = parse_var("KUBE_NGINX_PORT", &val)?;
        }
        if let Some(val) = lookup("KUBE_NGINX_CFG") {
            config.config_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("KUBE_NGINX_RELOAD_CMD") {
            config.reload_command = val;
        }
        if let Some(val) = lookup("KUBE_NGINX_INGRESS_CLASS") {
            config.ingress_class = Some(val);
        }
        if let Some(val) = lookup("KUBE_NGINX_METRICS_ADDR") {
            config.metrics_addr = Some(val);
        }
        if let Some(val) = lookup("KUBE_NGINX_MAX_RELOAD_FAILURES") {
            config.max_reload_failures = Some(parse_var("KUBE_NGINX_MAX_RELOAD_FAILURES", &val)?);
        }
        if let Some(val) = lookup("KUBE_NGINX_QPS") {
            config.rate_limit.qps = parse_var("KUBE_NGINX_QPS", &val)?;
        }
        if let Some(val) = lookup("KUBE_NGINX_BURST") {
            config.rate_limit.burst = parse_var("KUBE_NGINX_BURST", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loops cannot run with
    pub fn validate(&self) -> Result<(), ControllerError> {
        if !(self.rate_limit.qps.is_finite() && self.rate_limit.qps > 0.0) {
            return Err(ControllerError::Config(format!(
                "rate limit qps must be positive, got {}",
                self.rate_limit.qps
            )));
        }
        if self.rate_limit.burst == 0 {
            return Err(ControllerError::Config(
                "rate limit burst must be at least 1".to_string(),
            ));
        }
        if self.reload_command.trim().is_empty() {
            return Err(ControllerError::Config(
                "reload command cannot be empty".to_string(),
            ));
        }
        if self.max_reload_failures == Some(0) {
            return Err(ControllerError::Config(
                "max reload failures must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, val: &str) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    val.trim()
        .parse()
        .map_err(|e| ControllerError::Config(format!("{}={:?}: {}", key, val, e)))
}
