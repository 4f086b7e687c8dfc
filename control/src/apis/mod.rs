//! Kubernetes API integrations
//!
//! Read-only access to Services, Pods and Ingresses, the observer built on
//! them, and the Ingress translator.

pub mod cluster;
pub mod ingress;
pub mod metrics;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
