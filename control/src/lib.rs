//! Kubernetes Ingress controller for nginx
//!
//! Keeps an nginx configuration file in sync with the cluster: a background
//! observer resolves Services to running Pods, and the driver loop translates
//! Ingresses against that snapshot, rendering and reloading nginx only when
//! the configuration actually changed.

pub mod apis;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics_server;
pub mod proxy;

pub use config::ControllerConfig;
pub use controller::{Context, Controller, CycleOutcome};
pub use error::ControllerError;
